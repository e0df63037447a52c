use std::time::Duration;

use scenesched_shared::{DEFAULT_PROGRAM_ID, Program, Settings};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 250;

/// Title given to the program synthesized from [`DefaultSource`].
pub const DEFAULT_SOURCE_TITLE: &str = "Default Source";

/// `[scheduler]` section of the daemon config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    pub watch_debounce_ms: u64,
    /// Fallback played whenever no scheduled program is active.
    pub default_source: Option<DefaultSource>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            watch_debounce_ms: DEFAULT_WATCH_DEBOUNCE_MS,
            default_source: None,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// The default-source program, when one is configured with a name.
    pub fn default_program(&self) -> Option<Program> {
        self.default_source
            .as_ref()
            .filter(|source| !source.name.trim().is_empty())
            .map(DefaultSource::to_program)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultSource {
    pub name: String,
    pub input_kind: String,
    pub uri: String,
    pub input_settings: Settings,
    pub transform: Settings,
}

impl DefaultSource {
    pub fn to_program(&self) -> Program {
        Program {
            id: DEFAULT_PROGRAM_ID.to_string(),
            title: DEFAULT_SOURCE_TITLE.to_string(),
            source_name: self.name.clone(),
            input_kind: self.input_kind.clone(),
            uri: self.uri.clone(),
            input_settings: self.input_settings.clone(),
            transform: self.transform.clone(),
            start: None,
            end: None,
        }
    }
}
