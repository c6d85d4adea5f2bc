//! Queue configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};

/// Configuration for a [`ProcessQueue`](crate::ProcessQueue)
///
/// Can be embedded in a larger TOML document:
///
/// ```toml
/// worker_name_prefix = "loader"
/// worker_stack_size = 4194304
/// reap_timeout_ms = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Prefix for the names of worker threads
    pub worker_name_prefix: String,
    /// Stack size for worker threads (None = platform default)
    pub worker_stack_size: Option<usize>,
    /// How long shutdown waits for cancelled workers before detaching them
    pub reap_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_name_prefix: "cadence-worker".to_string(),
            worker_stack_size: None,
            reap_timeout_ms: 250,
        }
    }
}

impl QueueConfig {
    /// Parse a configuration from TOML; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| ProcessError::Config(e.to_string()))
    }

    /// Shutdown wait as a duration
    pub fn reap_timeout(&self) -> Duration {
        Duration::from_millis(self.reap_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = QueueConfig::from_toml_str("reap_timeout_ms = 40").unwrap();
        assert_eq!(config.reap_timeout(), Duration::from_millis(40));
        assert_eq!(config.worker_name_prefix, "cadence-worker");
        assert_eq!(config.worker_stack_size, None);
    }

    #[test]
    fn test_invalid_toml() {
        let err = QueueConfig::from_toml_str("reap_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ProcessError::Config(_)));
    }
}
