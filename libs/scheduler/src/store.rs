//! Reading and replacing the schedule document on disk.

use std::path::{Path, PathBuf};

use serde::de::IgnoredAny;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::Schedule;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read schedule file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse schedule file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a commit was rejected. Nothing is written unless the commit succeeds.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Invalid JSON format: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Failed to format schedule: {0}")]
    Format(#[source] serde_json::Error),
    #[error("Failed to write file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CommitError {
    /// Short message safe to hand back to the requesting client.
    pub fn client_message(&self) -> &'static str {
        match self {
            CommitError::InvalidJson(_) => "Invalid JSON format",
            CommitError::Format(_) => "Failed to format schedule",
            CommitError::Write { .. } => "Failed to write file",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Schedule, StoreError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| StoreError::Read {
                path: self.path.clone(),
                source,
            })?;
        let schedule = parse_schedule(&bytes).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        debug!(
            path = %self.path.display(),
            programs = schedule.programs.len(),
            "schedule parsed"
        );
        Ok(schedule)
    }

    /// Validate `payload` as JSON, pretty-print it and overwrite the file.
    ///
    /// The in-memory schedule is left alone: the file watcher picks the new
    /// content up like any other edit.
    pub async fn commit(&self, payload: &str) -> Result<(), CommitError> {
        let document: serde_json::Value =
            serde_json::from_str(payload).map_err(CommitError::InvalidJson)?;
        let mut pretty = serde_json::to_string_pretty(&document).map_err(CommitError::Format)?;
        pretty.push('\n');

        tokio::fs::write(&self.path, pretty)
            .await
            .map_err(|source| CommitError::Write {
                path: self.path.clone(),
                source,
            })?;
        info!(path = %self.path.display(), "schedule file committed");
        Ok(())
    }
}

pub fn parse_schedule(bytes: &[u8]) -> Result<Schedule, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Syntax-only check used to skip half-written files.
pub fn is_well_formed_json(bytes: &[u8]) -> bool {
    serde_json::from_slice::<IgnoredAny>(bytes).is_ok()
}
