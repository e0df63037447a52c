//! Compensation log for the multi-step switch.
//!
//! Each forward step that creates something on the remote side records how to
//! undo it. Aborting runs the recorded compensations newest first; completing
//! forgets them.

use tracing::{debug, warn};

use crate::remote::{ProductionApi, RemoteError, SceneItemId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    RemoveInput { name: String },
    RemoveSceneItem { scene: String, item: SceneItemId },
}

impl Compensation {
    async fn run(&self, api: &dyn ProductionApi) -> Result<(), RemoteError> {
        match self {
            Compensation::RemoveInput { name } => api.remove_input(name).await,
            Compensation::RemoveSceneItem { scene, item } => {
                api.remove_scene_item(scene, *item).await
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Saga {
    compensations: Vec<Compensation>,
}

impl Saga {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, compensation: Compensation) {
        self.compensations.push(compensation);
    }

    /// Undo everything recorded so far. Failures are logged and skipped;
    /// missing resources count as already undone.
    pub async fn abort(mut self, api: &dyn ProductionApi) {
        while let Some(compensation) = self.compensations.pop() {
            match compensation.run(api).await {
                Ok(()) => debug!(?compensation, "compensation applied"),
                Err(e) if e.is_not_found() => debug!(?compensation, "nothing to compensate"),
                Err(e) => warn!(?compensation, error = %e, "compensation failed"),
            }
        }
    }

    pub fn complete(self) {
        debug!(discarded = self.compensations.len(), "switch committed");
    }
}
