//! Capability surface of the remote production tool.
//!
//! The core never speaks the tool's wire protocol. A [`Connector`] opens a
//! session and hands back a [`ProductionApi`] plus the inbound event stream;
//! everything the switcher and the supervisor do goes through those.

use std::sync::Arc;

use async_trait::async_trait;
use scenesched_shared::Settings;
use thiserror::Error;
use tokio::sync::mpsc;

pub type SceneItemId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneItem {
    pub id: SceneItemId,
    pub source_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

/// Everything needed to create an input together with its scene item.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInput {
    pub scene: String,
    pub name: String,
    pub kind: String,
    pub settings: Settings,
    pub enabled: bool,
}

/// Where to reach the remote tool and how to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl Endpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Notifications pushed by the remote tool while a session is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// The dependent output (virtual camera) started or stopped.
    OutputStateChanged { active: bool },
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("connection to {address} failed: {message}")]
    Connect { address: String, message: String },
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("{request} failed: {message}")]
    Request {
        request: &'static str,
        message: String,
    },
    #[error("session closed")]
    Closed,
}

impl RemoteError {
    pub fn request(request: &'static str, message: impl Into<String>) -> Self {
        RemoteError::Request {
            request,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// Requests the core issues against an open session.
#[async_trait]
pub trait ProductionApi: Send + Sync {
    async fn version(&self) -> Result<String, RemoteError>;

    /// Registry of input kinds this instance can create.
    async fn input_kinds(&self) -> Result<Vec<String>, RemoteError>;

    async fn scene_names(&self) -> Result<Vec<String>, RemoteError>;
    async fn create_scene(&self, scene: &str) -> Result<(), RemoteError>;

    async fn scene_items(&self, scene: &str) -> Result<Vec<SceneItem>, RemoteError>;
    async fn scene_item_id(
        &self,
        scene: &str,
        source_name: &str,
    ) -> Result<SceneItemId, RemoteError>;
    async fn remove_scene_item(&self, scene: &str, item: SceneItemId) -> Result<(), RemoteError>;
    async fn set_scene_item_enabled(
        &self,
        scene: &str,
        item: SceneItemId,
        enabled: bool,
    ) -> Result<(), RemoteError>;
    async fn scene_item_transform(
        &self,
        scene: &str,
        item: SceneItemId,
    ) -> Result<Settings, RemoteError>;
    async fn set_scene_item_transform(
        &self,
        scene: &str,
        item: SceneItemId,
        transform: &Settings,
    ) -> Result<(), RemoteError>;

    /// Copy `item` from `from_scene` into `to_scene`, returning the new id.
    async fn duplicate_scene_item(
        &self,
        from_scene: &str,
        item: SceneItemId,
        to_scene: &str,
    ) -> Result<SceneItemId, RemoteError>;

    /// Create an input and its scene item, returning the item id.
    async fn create_input(&self, input: &NewInput) -> Result<SceneItemId, RemoteError>;
    /// Remove an input and every scene item that shows it.
    async fn remove_input(&self, name: &str) -> Result<(), RemoteError>;
    async fn input_default_settings(&self, kind: &str) -> Result<Settings, RemoteError>;

    async fn canvas_size(&self) -> Result<CanvasSize, RemoteError>;

    /// Liveness check used by the keepalive.
    async fn ping(&self) -> Result<(), RemoteError>;
    async fn output_active(&self) -> Result<bool, RemoteError>;

    async fn disconnect(&self);
}

pub struct RemoteConnection {
    pub api: Arc<dyn ProductionApi>,
    pub events: mpsc::Receiver<RemoteEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open and authenticate a session.
    async fn connect(&self, endpoint: &Endpoint) -> Result<RemoteConnection, RemoteError>;
}
