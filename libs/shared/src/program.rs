use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// Reserved identity of the program synthesized from the configured default
/// source. No schedule entry may use it.
pub const DEFAULT_PROGRAM_ID: &str = "default-source";

/// Placeholder used in logs when there is no program.
pub const NO_PROGRAM_TITLE: &str = "<none>";

/// Executable view of a scheduled program, as carried by declarations and
/// program-changed notifications.
///
/// This is the contract between the evaluator and the convergence engine;
/// schedule-only fields (display metadata, recurrence rules) are not part of
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub input_kind: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub input_settings: Settings,
    #[serde(default)]
    pub transform: Settings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<FixedOffset>>,
}

impl Program {
    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_PROGRAM_ID
    }

    /// Title for logs and status displays.
    pub fn display_title(&self) -> String {
        if self.title.is_empty() {
            format!("Untitled ({})", self.id)
        } else {
            self.title.clone()
        }
    }
}

pub fn display_title(program: Option<&Program>) -> String {
    program
        .map(Program::display_title)
        .unwrap_or_else(|| NO_PROGRAM_TITLE.to_string())
}

/// Identity comparison used for divergence checks. Two "no program" values
/// are the same; otherwise only the ids are compared.
pub fn is_same_program(a: Option<&Program>, b: Option<&Program>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.id == b.id,
        _ => false,
    }
}
