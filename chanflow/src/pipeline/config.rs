//! Configuration for pipeline runs.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings applied to every run of a [`Pipeline`](super::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name used in logs and events.
    #[serde(default = "default_name")]
    pub name: String,
    /// Whether lifecycle events are sent to the event sink.
    #[serde(default = "default_emit_events")]
    pub emit_events: bool,
    /// Upper bound on joining workers once the final stream closed.
    #[serde(default)]
    pub join_timeout_ms: Option<u64>,
    /// Whether dropping an unjoined handle cancels its workers.
    #[serde(default = "default_cancel_on_drop")]
    pub cancel_on_drop: bool,
}

fn default_name() -> String {
    "pipeline".to_string()
}

fn default_emit_events() -> bool {
    true
}

fn default_cancel_on_drop() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            emit_events: default_emit_events(),
            join_timeout_ms: None,
            cancel_on_drop: default_cancel_on_drop(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables or disables lifecycle events.
    #[must_use]
    pub const fn with_events(mut self, emit_events: bool) -> Self {
        self.emit_events = emit_events;
        self
    }

    /// Bounds how long joining the workers may take.
    #[must_use]
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets whether dropping an unjoined handle cancels its workers.
    #[must_use]
    pub const fn with_cancel_on_drop(mut self, cancel_on_drop: bool) -> Self {
        self.cancel_on_drop = cancel_on_drop;
        self
    }

    /// Returns the join timeout as a duration.
    #[must_use]
    pub fn join_timeout(&self) -> Option<Duration> {
        self.join_timeout_ms.map(Duration::from_millis)
    }

    /// Checks the configuration for unusable values.
    ///
    /// # Errors
    ///
    /// Returns an error for a blank name or a zero join timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        if self.join_timeout_ms == Some(0) {
            return Err(ConfigError::invalid(
                "join_timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or invalid.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
