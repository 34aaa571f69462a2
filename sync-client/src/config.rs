//! Configuration loading for convo-sync.
//!
//! Configuration is loaded from a TOML file (default: `convo-sync.toml`).
//! Every section and field is optional.

use crate::incremental::DEFAULT_OFFLINE_BUFFER_CAPACITY;
use crate::slow::SLOW_SYNC_VERSION;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use sync_core::{FreshnessPolicy, SlowSyncPlan};
use sync_types::{ConnectionPolicy, SlowSyncStep};

/// Root configuration for convo-sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Slow sync configuration.
    #[serde(default)]
    pub slow_sync: SlowSyncConfig,
    /// Incremental sync configuration.
    #[serde(default)]
    pub incremental: IncrementalConfig,
    /// Bookkeeping store configuration.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Slow sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlowSyncConfig {
    /// Snapshots older than this are refreshed (default: 7 days).
    #[serde(default = "default_max_snapshot_age_secs")]
    pub max_snapshot_age_secs: u64,
    /// Data steps to run (default: all). Always executed in canonical order.
    #[serde(default)]
    pub steps: Option<Vec<SlowSyncStep>>,
}

/// Incremental sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IncrementalConfig {
    /// What to do once pending events are applied (default: keep_alive).
    #[serde(default)]
    pub connection_policy: ConnectionPolicy,
    /// Replayed event ids remembered for de-duplication (default: 1000).
    #[serde(default = "default_offline_buffer_capacity")]
    pub offline_buffer_capacity: usize,
}

/// Bookkeeping store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Path to the JSON state file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

// Default value functions
fn default_max_snapshot_age_secs() -> u64 {
    7 * 24 * 60 * 60 // 7 days in seconds
}

fn default_offline_buffer_capacity() -> usize {
    DEFAULT_OFFLINE_BUFFER_CAPACITY
}

fn default_store_path() -> PathBuf {
    PathBuf::from("convo-sync-state.json")
}

impl Default for SlowSyncConfig {
    fn default() -> Self {
        Self {
            max_snapshot_age_secs: default_max_snapshot_age_secs(),
            steps: None,
        }
    }
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            connection_policy: ConnectionPolicy::default(),
            offline_buffer_capacity: default_offline_buffer_capacity(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Freshness thresholds for reusing a local snapshot.
    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            max_age: Duration::from_secs(self.slow_sync.max_snapshot_age_secs),
            required_version: SLOW_SYNC_VERSION,
        }
    }

    /// The data steps slow sync runs.
    pub fn slow_sync_plan(&self) -> SlowSyncPlan {
        match &self.slow_sync.steps {
            Some(steps) => SlowSyncPlan::from_steps(steps.iter().copied()),
            None => SlowSyncPlan::full(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = SyncConfig::default();
        assert_eq!(config.slow_sync.max_snapshot_age_secs, 7 * 24 * 60 * 60);
        assert_eq!(config.incremental.connection_policy, ConnectionPolicy::KeepAlive);
        assert_eq!(config.incremental.offline_buffer_capacity, 1000);
        assert_eq!(config.slow_sync_plan(), SlowSyncPlan::full());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[slow_sync]
max_snapshot_age_secs = 3600
steps = ["members", "self_user", "conversations"]

[incremental]
connection_policy = "disconnect_after_pending_events"
offline_buffer_capacity = 50

[store]
path = "/data/sync.json"
"#;

        let config: SyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.freshness_policy().max_age, Duration::from_secs(3600));
        assert_eq!(
            config.slow_sync_plan().steps(),
            &[
                SlowSyncStep::SelfUser,
                SlowSyncStep::Conversations,
                SlowSyncStep::Members
            ]
        );
        assert_eq!(
            config.incremental.connection_policy,
            ConnectionPolicy::DisconnectAfterPendingEvents
        );
        assert_eq!(config.incremental.offline_buffer_capacity, 50);
        assert_eq!(config.store.path, PathBuf::from("/data/sync.json"));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: SyncConfig = toml::from_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn unknown_step_is_rejected() {
        let toml = r#"
[slow_sync]
steps = ["everything"]
"#;
        assert!(toml::from_str::<SyncConfig>(toml).is_err());
    }

    #[test]
    fn from_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[incremental]\noffline_buffer_capacity = \"lots\"").unwrap();

        let err = SyncConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = SyncConfig::from_file(std::path::Path::new("/nonexistent/convo-sync.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
