//! Global configuration types for Stepwise.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls engine
//! defaults (retry policy, step timeout, state size limit) and the checkpoint
//! store location.

use serde::{Deserialize, Serialize};

use crate::workflow::RetryConfig;

/// Top-level configuration.
///
/// Loaded from `~/.stepwise/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// Engine-wide defaults applied to steps that do not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry policy for steps without their own.
    #[serde(default)]
    pub default_retry: RetryConfig,

    /// Per-attempt timeout in seconds (default 300).
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Maximum serialized workflow state size in bytes (default 10 MiB).
    #[serde(default = "default_max_state_bytes")]
    pub max_state_bytes: usize,

    /// Capacity of the lifecycle event channel (default 1024).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_max_state_bytes() -> usize {
    10_485_760
}

fn default_event_channel_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_retry: RetryConfig::default(),
            step_timeout_secs: default_step_timeout_secs(),
            max_state_bytes: default_max_state_bytes(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Checkpoint store settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite URL; derived from the data directory when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.engine.step_timeout_secs, 300);
        assert_eq!(config.engine.max_state_bytes, 10_485_760);
        assert_eq!(config.engine.default_retry.max_attempts, 3);
        assert!(config.store.database_url.is_none());
    }

    #[test]
    fn test_global_config_deserialize_empty() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config, GlobalConfig::default());
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
[engine]
step_timeout_secs = 30

[engine.default_retry]
max_attempts = 5
initial_delay_ms = 50
jitter = false

[store]
database_url = "sqlite:///tmp/stepwise.db"
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.step_timeout_secs, 30);
        assert_eq!(config.engine.max_state_bytes, 10_485_760);
        assert_eq!(config.engine.default_retry.max_attempts, 5);
        assert_eq!(config.engine.default_retry.initial_delay_ms, 50);
        assert_eq!(config.engine.default_retry.max_delay_ms, 800);
        assert!(!config.engine.default_retry.jitter);
        assert_eq!(
            config.store.database_url.as_deref(),
            Some("sqlite:///tmp/stepwise.db")
        );
    }
}
