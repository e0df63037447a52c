//! Daemon configuration: one TOML file, then environment variables, then
//! command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use scenesched_scheduler::SchedulerConfig;
use scenesched_switcher::RemoteConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_SCHEDULE_PATH: &str = "schedule.json";
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const ENV_REMOTE_HOST: &str = "SCENESCHED_REMOTE_HOST";
pub const ENV_REMOTE_PORT: &str = "SCENESCHED_REMOTE_PORT";
pub const ENV_REMOTE_PASSWORD: &str = "SCENESCHED_REMOTE_PASSWORD";
pub const ENV_SCHEDULE_PATH: &str = "SCENESCHED_SCHEDULE_PATH";
pub const ENV_LOG_LEVEL: &str = "SCENESCHED_LOG_LEVEL";

#[derive(Debug, Clone, Default)]
pub struct CliFlags {
    pub schedule: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub paths: PathsConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub schedule: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            schedule: PathBuf::from(DEFAULT_SCHEDULE_PATH),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("remote.schedule_scene cannot be empty")]
    EmptyScheduleScene,
    #[error("remote.schedule_scene_aux cannot be empty")]
    EmptyStagingScene,
    #[error("remote.schedule_scene and remote.schedule_scene_aux must differ (both are {0:?})")]
    SameScenes(String),
    #[error("remote.source_name_prefix cannot be empty")]
    EmptySourcePrefix,
    #[error("remote.reconnect_interval_secs must be greater than zero")]
    ZeroReconnectInterval,
    #[error("remote.keepalive_interval_secs must be greater than zero")]
    ZeroKeepaliveInterval,
    #[error("scheduler.tick_interval_ms must be greater than zero")]
    ZeroTickInterval,
}

impl AppConfig {
    /// Load for running against the remote tool: every section must be valid.
    pub fn load(config_path: &Path, cli: &CliFlags) -> Result<Self> {
        let config = Self::load_unvalidated(config_path, cli)?;
        config.validate()?;
        Ok(config)
    }

    /// Load for the offline commands, which never read `[remote]`.
    pub fn load_offline(config_path: &Path, cli: &CliFlags) -> Result<Self> {
        let config = Self::load_unvalidated(config_path, cli)?;
        config.validate_scheduler_with_error()?;
        Ok(config)
    }

    /// Read the file if it exists (defaults otherwise) and apply overrides.
    pub fn load_unvalidated(config_path: &Path, cli: &CliFlags) -> Result<Self> {
        let mut config = if config_path.exists() {
            let text = std::fs::read_to_string(config_path).map_err(|error| {
                anyhow!("failed to read config {}: {error}", config_path.display())
            })?;
            toml::from_str::<AppConfig>(&text).map_err(|error| {
                anyhow!("failed to parse config {}: {error}", config_path.display())
            })?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.apply_cli_overrides(cli);
        config.normalize_paths();

        Ok(config)
    }

    pub fn validate_with_error(&self) -> std::result::Result<(), ConfigValidationError> {
        self.validate_remote_with_error()?;
        self.validate_scheduler_with_error()
    }

    fn validate_remote_with_error(&self) -> std::result::Result<(), ConfigValidationError> {
        let remote = &self.remote;
        if remote.schedule_scene.trim().is_empty() {
            return Err(ConfigValidationError::EmptyScheduleScene);
        }
        if remote.schedule_scene_aux.trim().is_empty() {
            return Err(ConfigValidationError::EmptyStagingScene);
        }
        if remote.schedule_scene == remote.schedule_scene_aux {
            return Err(ConfigValidationError::SameScenes(remote.schedule_scene.clone()));
        }
        if remote.source_name_prefix.is_empty() {
            return Err(ConfigValidationError::EmptySourcePrefix);
        }
        if remote.reconnect_interval_secs == 0 {
            return Err(ConfigValidationError::ZeroReconnectInterval);
        }
        if remote.keepalive_interval_secs == 0 {
            return Err(ConfigValidationError::ZeroKeepaliveInterval);
        }
        Ok(())
    }

    pub fn validate_scheduler_with_error(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(ConfigValidationError::ZeroTickInterval);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_with_error().map_err(anyhow::Error::new)
    }

    /// Problems worth logging that do not stop the daemon.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.remote.password.is_empty() {
            warnings.push(
                "remote.password is empty, connecting without authentication".to_string(),
            );
        }
        warnings.extend(self.scheduler_warnings());
        warnings
    }

    /// The subset of [`Self::warnings`] that matters without a remote session.
    pub fn scheduler_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self
            .scheduler
            .default_source
            .as_ref()
            .is_some_and(|source| source.name.trim().is_empty())
        {
            warnings.push("scheduler.default_source has no name and will be ignored".to_string());
        }
        warnings
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = var(ENV_REMOTE_HOST) {
            self.remote.host = host;
        }
        if let Some(port) = var(ENV_REMOTE_PORT) {
            self.remote.port = port
                .trim()
                .parse()
                .map_err(|error| anyhow!("invalid {ENV_REMOTE_PORT} value {port:?}: {error}"))?;
        }
        if let Some(password) = var(ENV_REMOTE_PASSWORD) {
            self.remote.password = password;
        }
        if let Some(path) = var(ENV_SCHEDULE_PATH) {
            self.paths.schedule = PathBuf::from(path);
        }
        if let Some(level) = var(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        Ok(())
    }

    fn apply_cli_overrides(&mut self, cli: &CliFlags) {
        if let Some(path) = &cli.schedule {
            self.paths.schedule = path.clone();
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
    }

    fn normalize_paths(&mut self) {
        self.paths.schedule = expand_tilde_path(&self.paths.schedule);
        self.paths.log_file = self.paths.log_file.as_deref().map(expand_tilde_path);
    }
}

fn expand_tilde_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if let Some(stripped) = path_str.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }

    if path_str == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }

    path.to_path_buf()
}
