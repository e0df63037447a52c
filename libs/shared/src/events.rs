//! Bus events exchanged between the evaluator, the connection supervisor and
//! outside observers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::Event;
use crate::program::Program;

// Scheduler

/// Declaration of the program that should be on air right now.
///
/// Published on every evaluation tick, whether or not anything changed.
/// Consumers decide for themselves whether to act.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetProgramState {
    pub timestamp: DateTime<Utc>,
    pub target: Option<Program>,
    pub next: Option<Program>,
    pub seek_offset: Duration,
}

impl Event for TargetProgramState {
    const TOPIC: &'static str = "scheduler.state.targetProgram";
}

/// A new schedule document was loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleReloaded {
    pub program_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl Event for ScheduleReloaded {
    const TOPIC: &'static str = "scheduler.schedule.reloaded";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetScheduleRequested {
    pub client_id: String,
}

impl Event for GetScheduleRequested {
    const TOPIC: &'static str = "scheduler.command.getSchedule";
}

/// A client wants to replace the schedule document. `payload` is the raw
/// JSON text as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitScheduleRequested {
    pub client_id: String,
    pub payload: String,
}

impl Event for CommitScheduleRequested {
    const TOPIC: &'static str = "scheduler.command.commitSchedule";
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentScheduleReply {
    pub client_id: String,
    pub schedule: serde_json::Value,
}

impl Event for CurrentScheduleReply {
    const TOPIC: &'static str = "scheduler.reply.currentSchedule";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    pub client_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Event for CommitResult {
    const TOPIC: &'static str = "scheduler.reply.commitResult";
}

// Remote production tool

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConnected {
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl Event for RemoteConnected {
    const TOPIC: &'static str = "obs.system.connected";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDisconnected {
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl Event for RemoteDisconnected {
    const TOPIC: &'static str = "obs.system.disconnected";
}

/// The dependent output (virtual camera) started or stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputStateChanged {
    pub active: bool,
    pub timestamp: DateTime<Utc>,
}

impl Event for OutputStateChanged {
    const TOPIC: &'static str = "obs.output.stateChanged";
}

/// Emitted after a switch has been applied on the remote side. Never emitted
/// for a no-op convergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramChanged {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Program>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Program>,
    pub seek_offset_ms: i64,
}

impl Event for ProgramChanged {
    const TOPIC: &'static str = "obs.program.changed";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequested {
    pub client_id: String,
}

impl Event for StatusRequested {
    const TOPIC: &'static str = "obs.command.getStatus";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub client_id: String,
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub output_active: bool,
}

impl Event for StatusReply {
    const TOPIC: &'static str = "obs.reply.status";
}
