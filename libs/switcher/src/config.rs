use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::remote::Endpoint;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4455;
pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_SOURCE_NAME_PREFIX: &str = "_sched_";

/// `[remote]` section of the daemon config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub reconnect_interval_secs: u64,
    pub keepalive_interval_secs: u64,
    /// Main on-air scene.
    pub schedule_scene: String,
    /// Hidden scene used to stage inputs before they go on air.
    pub schedule_scene_aux: String,
    /// Marks inputs owned by the switcher. Anything else is left alone.
    pub source_name_prefix: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: String::new(),
            reconnect_interval_secs: DEFAULT_RECONNECT_INTERVAL_SECS,
            keepalive_interval_secs: DEFAULT_KEEPALIVE_INTERVAL_SECS,
            schedule_scene: String::new(),
            schedule_scene_aux: String::new(),
            source_name_prefix: DEFAULT_SOURCE_NAME_PREFIX.to_string(),
        }
    }
}

impl RemoteConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn scenes(&self) -> SceneLayout {
        SceneLayout {
            main: self.schedule_scene.clone(),
            staging: self.schedule_scene_aux.clone(),
            prefix: self.source_name_prefix.clone(),
        }
    }
}

/// The two scenes the switcher works in plus the managed-name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneLayout {
    pub main: String,
    pub staging: String,
    pub prefix: String,
}

impl SceneLayout {
    /// Name under which the switcher creates the input for `source_name`.
    pub fn managed_name(&self, source_name: &str) -> String {
        format!("{}{}", self.prefix, source_name)
    }

    pub fn is_managed(&self, input_name: &str) -> bool {
        input_name.starts_with(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RemoteConfig::default();

        assert_eq!(config.endpoint().address(), "localhost:4455");
        assert_eq!(config.reconnect_interval(), Duration::from_secs(15));
        assert_eq!(config.keepalive_interval(), Duration::from_secs(10));
        assert_eq!(config.source_name_prefix, "_sched_");
    }

    #[test]
    fn managed_names_carry_prefix() {
        let layout = SceneLayout {
            main: "Main".to_string(),
            staging: "Main Aux".to_string(),
            prefix: "_sched_".to_string(),
        };

        assert_eq!(layout.managed_name("news"), "_sched_news");
        assert!(layout.is_managed("_sched_news"));
        assert!(!layout.is_managed("Webcam"));
    }
}
