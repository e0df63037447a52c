//! Keeps the remote production tool in line with the scheduler's
//! declarations: a connection supervisor owns the session, and a
//! convergence engine applies each divergent target as a rollback-safe
//! sequence of remote operations.

pub mod config;
pub mod engine;
pub mod remote;
pub mod saga;
pub mod staging;
pub mod supervisor;

pub use config::{RemoteConfig, SceneLayout};
pub use engine::{SwitchError, SwitchOutcome, Switcher};
pub use remote::{
    CanvasSize, Connector, Endpoint, NewInput, ProductionApi, RemoteConnection, RemoteError,
    RemoteEvent, SceneItem, SceneItemId,
};
pub use supervisor::{ConnectionState, Session, SessionStatus, Supervisor};
