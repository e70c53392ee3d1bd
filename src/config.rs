use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of frames waiting for the worker
    pub queue_capacity: usize,

    /// Only every Nth submitted frame is evaluated
    pub detection_interval: u32,

    /// Age in milliseconds after which a cached result counts as stale
    pub max_cache_age_ms: u64,

    /// How long the worker blocks on an empty queue before re-checking for shutdown
    pub dequeue_timeout_ms: u64,

    /// Consecutive detector failures before switching to synchronous fallback
    pub max_consecutive_errors: u32,

    /// Number of latency samples kept for rolling statistics
    pub latency_window: usize,

    /// Deadline used when a session guard or the detector itself is dropped
    pub stop_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 3,
            detection_interval: 3,
            max_cache_age_ms: 1000,
            dequeue_timeout_ms: 500,
            max_consecutive_errors: 5,
            latency_window: 100,
            stop_timeout_ms: 1000,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON document; missing fields fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(json).map_err(ConfigError::ParseFailed)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be >= 1".to_string(),
            ));
        }
        if self.dequeue_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "dequeue_timeout_ms must be >= 1".to_string(),
            ));
        }
        if self.max_consecutive_errors == 0 {
            return Err(ConfigError::Invalid(
                "max_consecutive_errors must be >= 1".to_string(),
            ));
        }
        if self.latency_window == 0 {
            return Err(ConfigError::Invalid(
                "latency_window must be >= 1".to_string(),
            ));
        }
        if self.stop_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "stop_timeout_ms must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Detection interval with 0 treated as "every frame"
    pub fn effective_interval(&self) -> u64 {
        u64::from(self.detection_interval.max(1))
    }

    pub fn max_cache_age(&self) -> Duration {
        Duration::from_millis(self.max_cache_age_ms)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
