//! Debounced watch over the schedule file.
//!
//! The parent directory is watched rather than the file itself so that
//! editors which replace the file through a rename are still seen. Events for
//! other files in the directory are dropped.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::store::is_well_formed_json;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("schedule path {0} has no file name")]
    NoFileName(PathBuf),
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Notification that the schedule file settled with well-formed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleFileChanged {
    pub path: PathBuf,
}

pub struct FileWatch {
    path: PathBuf,
    debounce: Duration,
}

impl FileWatch {
    pub fn new(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            path: path.into(),
            debounce,
        }
    }

    /// Watch until `cancel` fires, sending one [`ScheduleFileChanged`] per
    /// burst of writes once the file has been quiet for the debounce period.
    /// Bursts that leave malformed JSON behind are logged and skipped.
    pub async fn run(
        self,
        changes: mpsc::Sender<ScheduleFileChanged>,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        let file_name = self
            .path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| WatchError::NoFileName(self.path.clone()))?;
        let directory = watch_directory(&self.path);

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            let _ = raw_tx.send(event);
        })
        .map_err(|source| WatchError::Watch {
            path: directory.clone(),
            source,
        })?;
        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: directory.clone(),
                source,
            })?;
        info!(
            path = %self.path.display(),
            debounce_ms = self.debounce.as_millis() as u64,
            "watching schedule file"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                raw = raw_rx.recv() => {
                    let event = match raw {
                        Some(Ok(event)) => event,
                        Some(Err(e)) => {
                            error!(error = %e, "schedule watcher error");
                            continue;
                        }
                        None => {
                            warn!("schedule watcher channel closed");
                            break;
                        }
                    };
                    if !is_relevant(&event, &file_name) {
                        continue;
                    }
                    debug!(kind = ?event.kind, "schedule file event, debouncing");
                    if !self.settle(&mut raw_rx, &cancel).await {
                        break;
                    }
                    self.forward(&changes).await;
                }
            }
        }

        debug!(path = %self.path.display(), "schedule watcher stopped");
        Ok(())
    }

    /// Swallow events until the directory has been quiet for the debounce
    /// period. Returns false if cancelled meanwhile.
    async fn settle(
        &self,
        raw_rx: &mut mpsc::UnboundedReceiver<notify::Result<Event>>,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.debounce) => return true,
                more = raw_rx.recv() => {
                    if more.is_none() {
                        return true;
                    }
                }
            }
        }
    }

    async fn forward(&self, changes: &mpsc::Sender<ScheduleFileChanged>) {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "schedule file unreadable after change"
                );
                return;
            }
        };
        if !is_well_formed_json(&bytes) {
            warn!(path = %self.path.display(), "schedule file is not valid JSON, ignoring change");
            return;
        }
        let change = ScheduleFileChanged {
            path: self.path.clone(),
        };
        if changes.send(change).await.is_err() {
            debug!("schedule change receiver dropped");
        }
    }
}

fn watch_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    let kind_matches = match event.kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        _ => false,
    };
    kind_matches
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name.as_os_str()))
}
