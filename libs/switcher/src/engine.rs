//! Convergence engine: drives the remote tool from the last-applied program
//! to the declared target.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use scenesched_shared::events::{ProgramChanged, TargetProgramState};
use scenesched_shared::{Program, display_title, is_same_program};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SceneLayout;
use crate::remote::{NewInput, ProductionApi, RemoteError, SceneItemId};
use crate::saga::{Compensation, Saga};
use crate::staging::{input_settings, stretch_transform};

/// Why a switch was abandoned. The last-applied program is unchanged and the
/// next divergent declaration retries from scratch.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("could not fetch supported input kinds: {0}")]
    InputKinds(#[source] RemoteError),
    #[error("input kind {kind:?} is not supported by the remote")]
    UnsupportedKind { kind: String },
    #[error("failed to stage {name} in {scene}: {source}")]
    Stage {
        name: String,
        scene: String,
        #[source]
        source: RemoteError,
    },
    #[error("failed to apply transform to {name}: {source}")]
    Transform {
        name: String,
        #[source]
        source: RemoteError,
    },
    #[error("failed to duplicate {name} into {scene}: {source}")]
    Duplicate {
        name: String,
        scene: String,
        #[source]
        source: RemoteError,
    },
    #[error("failed to enable {name} in {scene}: {source}")]
    Enable {
        name: String,
        scene: String,
        #[source]
        source: RemoteError,
    },
}

/// A switch that was applied on the remote side.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchOutcome {
    pub previous: Option<Program>,
    pub current: Option<Program>,
    pub seek_offset: Duration,
    pub timestamp: DateTime<Utc>,
}

impl SwitchOutcome {
    pub fn to_event(&self) -> ProgramChanged {
        ProgramChanged {
            timestamp: self.timestamp,
            previous: self.previous.clone(),
            current: self.current.clone(),
            seek_offset_ms: i64::try_from(self.seek_offset.as_millis()).unwrap_or(i64::MAX),
        }
    }
}

pub struct Switcher {
    layout: SceneLayout,
    active: RwLock<Option<Program>>,
    switch_lock: Mutex<()>,
}

impl Switcher {
    pub fn new(layout: SceneLayout) -> Self {
        Self {
            layout,
            active: RwLock::new(None),
            switch_lock: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &SceneLayout {
        &self.layout
    }

    /// Last program applied on the remote side. Never blocks on a switch.
    pub fn active_program(&self) -> Option<Program> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget the last-applied program, e.g. after the scenes were cleared.
    pub async fn reset(&self) {
        let _switching = self.switch_lock.lock().await;
        self.set_active(None);
    }

    fn set_active(&self, program: Option<Program>) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = program;
    }

    /// Bring the remote side in line with `declaration`.
    ///
    /// Returns `Ok(None)` when the target is already applied; no remote call
    /// is made in that case.
    pub async fn converge(
        &self,
        api: &dyn ProductionApi,
        declaration: &TargetProgramState,
    ) -> Result<Option<SwitchOutcome>, SwitchError> {
        let _switching = self.switch_lock.lock().await;

        let previous = self.active_program();
        let target = declaration.target.as_ref();
        if is_same_program(previous.as_ref(), target) {
            return Ok(None);
        }

        debug!(
            current = %display_title(previous.as_ref()),
            target = %display_title(target),
            "state divergence detected, switching program"
        );

        match target {
            Some(target) => self.switch_to(api, previous.as_ref(), target).await?,
            None => self.clear(api, previous.as_ref()).await,
        }

        self.set_active(target.cloned());
        info!(
            previous = %display_title(previous.as_ref()),
            current = %display_title(target),
            "program switched"
        );

        Ok(Some(SwitchOutcome {
            previous,
            current: target.cloned(),
            seek_offset: declaration.seek_offset,
            timestamp: Utc::now(),
        }))
    }

    async fn switch_to(
        &self,
        api: &dyn ProductionApi,
        outgoing: Option<&Program>,
        target: &Program,
    ) -> Result<(), SwitchError> {
        let name = self.layout.managed_name(&target.source_name);

        self.ensure_kind_supported(api, target).await?;
        self.remove_stale_input(api, &name).await;

        let mut saga = Saga::new();
        saga.record(Compensation::RemoveInput { name: name.clone() });
        let staged = match self.stage(api, target, &name).await {
            Ok(staged) => staged,
            Err(e) => {
                saga.abort(api).await;
                return Err(e);
            }
        };

        if let Err(e) = self.go_live(api, &mut saga, target, &name, staged).await {
            saga.abort(api).await;
            self.remove_staged(api, staged).await;
            return Err(e);
        }
        saga.complete();

        let outgoing_name = outgoing.map(|program| self.layout.managed_name(&program.source_name));
        if let Some(outgoing) = outgoing
            && outgoing_name.as_deref() != Some(name.as_str())
        {
            self.cleanup_program(api, outgoing).await;
        }

        let mut protected = vec![name];
        protected.extend(outgoing_name);
        self.sweep_orphans(api, &protected).await;
        self.remove_staged(api, staged).await;
        Ok(())
    }

    /// Take the outgoing program off air when nothing is declared.
    async fn clear(&self, api: &dyn ProductionApi, outgoing: Option<&Program>) {
        if let Some(outgoing) = outgoing {
            self.cleanup_program(api, outgoing).await;
        }
        self.sweep_orphans(api, &[]).await;
    }

    async fn ensure_kind_supported(
        &self,
        api: &dyn ProductionApi,
        target: &Program,
    ) -> Result<(), SwitchError> {
        let kinds = api.input_kinds().await.map_err(SwitchError::InputKinds)?;
        if kinds.iter().any(|kind| kind == &target.input_kind) {
            return Ok(());
        }
        warn!(
            requested = %target.input_kind,
            supported = ?kinds,
            "input kind not supported by remote"
        );
        Err(SwitchError::UnsupportedKind {
            kind: target.input_kind.clone(),
        })
    }

    async fn remove_stale_input(&self, api: &dyn ProductionApi, name: &str) {
        match api.remove_input(name).await {
            Ok(()) => debug!(input = %name, "removed stale input"),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(input = %name, error = %e, "failed to remove stale input, continuing"),
        }
    }

    /// Create the input hidden in the staging scene and give it its final
    /// transform there.
    async fn stage(
        &self,
        api: &dyn ProductionApi,
        target: &Program,
        name: &str,
    ) -> Result<SceneItemId, SwitchError> {
        let scene = &self.layout.staging;
        let stage_error = |source| SwitchError::Stage {
            name: name.to_string(),
            scene: scene.clone(),
            source,
        };

        let defaults = api
            .input_default_settings(&target.input_kind)
            .await
            .map_err(stage_error)?;
        let input = NewInput {
            scene: scene.clone(),
            name: name.to_string(),
            kind: target.input_kind.clone(),
            settings: input_settings(defaults, target),
            enabled: false,
        };
        let staged = api.create_input(&input).await.map_err(stage_error)?;
        debug!(input = %name, item = staged, scene = %scene, "input staged");

        self.apply_transform(api, target, name, staged).await?;
        Ok(staged)
    }

    /// Stretch to canvas, then patch the program's overrides over whatever
    /// the remote reports.
    async fn apply_transform(
        &self,
        api: &dyn ProductionApi,
        target: &Program,
        name: &str,
        item: SceneItemId,
    ) -> Result<(), SwitchError> {
        let scene = &self.layout.staging;
        match api.canvas_size().await {
            Ok(canvas) => {
                let stretch = stretch_transform(canvas);
                if let Err(e) = api.set_scene_item_transform(scene, item, &stretch).await {
                    warn!(input = %name, error = %e, "failed to apply default transform");
                }
            }
            Err(e) => warn!(error = %e, "could not read canvas size, skipping default transform"),
        }

        if target.transform.is_empty() {
            return Ok(());
        }

        let transform_error = |source| SwitchError::Transform {
            name: name.to_string(),
            source,
        };
        let current = api
            .scene_item_transform(scene, item)
            .await
            .map_err(transform_error)?;
        api.set_scene_item_transform(scene, item, &current.patched(&target.transform))
            .await
            .map_err(transform_error)
    }

    /// Duplicate the staged item into the main scene and show it.
    async fn go_live(
        &self,
        api: &dyn ProductionApi,
        saga: &mut Saga,
        target: &Program,
        name: &str,
        staged: SceneItemId,
    ) -> Result<(), SwitchError> {
        let main = &self.layout.main;
        let live = api
            .duplicate_scene_item(&self.layout.staging, staged, main)
            .await
            .map_err(|source| SwitchError::Duplicate {
                name: name.to_string(),
                scene: main.clone(),
                source,
            })?;
        saga.record(Compensation::RemoveSceneItem {
            scene: main.clone(),
            item: live,
        });

        api.set_scene_item_enabled(main, live, true)
            .await
            .map_err(|source| SwitchError::Enable {
                name: name.to_string(),
                scene: main.clone(),
                source,
            })?;
        debug!(
            program = %target.display_title(),
            item = live,
            scene = %main,
            "program is live"
        );
        Ok(())
    }

    /// Hide and remove `program`'s item from the main scene, then its input.
    /// Anything already gone is fine.
    async fn cleanup_program(&self, api: &dyn ProductionApi, program: &Program) {
        let main = &self.layout.main;
        let name = self.layout.managed_name(&program.source_name);

        match api.scene_item_id(main, &name).await {
            Ok(item) => {
                if let Err(e) = api.set_scene_item_enabled(main, item, false).await {
                    debug!(input = %name, error = %e, "could not hide outgoing item");
                }
                if let Err(e) = api.remove_scene_item(main, item).await {
                    debug!(input = %name, error = %e, "could not remove outgoing item");
                }
            }
            Err(e) => debug!(input = %name, error = %e, "outgoing item already gone"),
        }

        if let Err(e) = api.remove_input(&name).await
            && !e.is_not_found()
        {
            warn!(input = %name, error = %e, "could not remove outgoing input");
        }
    }

    /// Remove every managed item in the main scene that is not protected.
    /// Items without the managed prefix are never touched.
    async fn sweep_orphans(&self, api: &dyn ProductionApi, protected: &[String]) {
        let main = &self.layout.main;
        let items = match api.scene_items(main).await {
            Ok(items) => items,
            Err(e) => {
                warn!(scene = %main, error = %e, "could not list items for orphan sweep");
                return;
            }
        };

        let orphans: Vec<_> = items
            .into_iter()
            .filter(|item| self.layout.is_managed(&item.source_name))
            .filter(|item| !protected.contains(&item.source_name))
            .collect();
        if orphans.is_empty() {
            return;
        }

        for orphan in &orphans {
            info!(source = %orphan.source_name, "removing orphaned managed source");
            let _ = api.set_scene_item_enabled(main, orphan.id, false).await;
            if let Err(e) = api.remove_scene_item(main, orphan.id).await
                && !e.is_not_found()
            {
                warn!(source = %orphan.source_name, error = %e, "could not remove orphaned item");
            }
            if let Err(e) = api.remove_input(&orphan.source_name).await
                && !e.is_not_found()
            {
                debug!(source = %orphan.source_name, error = %e, "could not remove orphaned input");
            }
        }
        info!(count = orphans.len(), "cleaned up orphaned sources");
    }

    async fn remove_staged(&self, api: &dyn ProductionApi, staged: SceneItemId) {
        if let Err(e) = api.remove_scene_item(&self.layout.staging, staged).await
            && !e.is_not_found()
        {
            warn!(item = staged, error = %e, "could not remove staged item");
        }
    }
}
