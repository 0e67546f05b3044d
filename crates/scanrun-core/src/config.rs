//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a [`ScanEngine`](crate::run::ScanEngine).
///
/// Every field has a default, so a JSON config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock budget for the execution phase of a job, in milliseconds.
    pub timeout_ms: u64,

    /// Budget for loading a script (top-level statements included), in milliseconds.
    pub load_timeout_ms: u64,

    /// Number of items the per-symbol adapter processes between progress events.
    pub progress_batch_size: usize,

    /// Maximum number of script operations per unit (0 = unlimited).
    pub max_operations: u64,

    /// Maximum script call depth.
    pub max_call_levels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            load_timeout_ms: 30_000,
            progress_batch_size: 10,
            max_operations: 0,
            max_call_levels: 64,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be positive".to_string()));
        }
        if self.load_timeout_ms == 0 {
            return Err(Error::Config("load_timeout_ms must be positive".to_string()));
        }
        if self.progress_batch_size == 0 {
            return Err(Error::Config(
                "progress_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = (timeout.as_millis() as u64).max(1);
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout_ms = (timeout.as_millis() as u64).max(1);
        self
    }

    pub fn with_progress_batch_size(mut self, size: usize) -> Self {
        self.progress_batch_size = size.max(1);
        self
    }

    pub fn with_max_operations(mut self, max: u64) -> Self {
        self.max_operations = max;
        self
    }

    /// Execution timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load timeout as a [`Duration`].
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(300));
        assert_eq!(config.progress_batch_size, 10);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"timeout_ms": 5000}"#).unwrap();
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.load_timeout_ms, 30_000);
        assert_eq!(config.max_call_levels, 64);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = EngineConfig {
            progress_batch_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"progress_batch_size": 2, "max_operations": 1000}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.progress_batch_size, 2);
        assert_eq!(config.max_operations, 1000);
    }

    #[test]
    fn test_builder_clamps() {
        let config = EngineConfig::default()
            .with_timeout(Duration::from_micros(10))
            .with_progress_batch_size(0);
        assert_eq!(config.timeout_ms, 1);
        assert_eq!(config.progress_batch_size, 1);
    }
}
