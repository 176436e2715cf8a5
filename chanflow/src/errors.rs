//! Error types for chanflow pipelines.
//!
//! Pure stages never fail. The variants here cover the stream primitives,
//! failable stages, cancellation and worker supervision.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage with a halting error policy failed on an element.
    #[error("{0}")]
    Transform(#[from] TransformError),

    /// The pipeline was cancelled before it drained.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// A stage worker panicked.
    #[error("Worker for stage '{stage}' panicked: {message}")]
    WorkerPanicked {
        /// The stage whose worker panicked.
        stage: String,
        /// The panic or join error message.
        message: String,
    },

    /// Workers did not finish within the configured join timeout.
    #[error("Timed out after {timeout_ms}ms waiting for {pending} worker(s)")]
    JoinTimeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
        /// Workers still running when the timeout fired.
        pending: usize,
    },

    /// Invalid or unreadable configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Creates a worker panicked error.
    #[must_use]
    pub fn worker_panicked(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WorkerPanicked {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error was caused by cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Errors raised by the stream primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The sender was already closed.
    #[error("Stream is closed")]
    Closed,

    /// The consumer dropped its end before taking the element.
    #[error("Stream consumer disconnected")]
    Disconnected,
}

/// A single element failed its transformation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Transform failed in stage '{stage}': {message}")]
pub struct TransformError {
    /// The stage that failed. Filled in by the worker when empty.
    pub stage: String,
    /// What went wrong.
    pub message: String,
}

impl TransformError {
    /// Creates a transform error not yet attributed to a stage.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            stage: String::new(),
            message: message.into(),
        }
    }

    /// Attributes the error to a stage unless it already names one.
    #[must_use]
    pub fn in_stage(mut self, stage: &str) -> Self {
        if self.stage.is_empty() {
            self.stage = stage.to_string();
        }
        self
    }

    /// Converts to a JSON payload for event sinks.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "stage": self.stage,
            "message": self.message,
        })
    }
}

/// Errors raised while loading or validating a [`PipelineConfig`](crate::pipeline::PipelineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds an unusable value.
    #[error("Invalid config field '{field}': {message}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why it is invalid.
        message: String,
    },

    /// The config file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The config document is not valid JSON for the schema.
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates an invalid field error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_attribution() {
        let err = TransformError::new("negative input").in_stage("sqrt");
        assert_eq!(err.stage, "sqrt");
        assert_eq!(err.to_string(), "Transform failed in stage 'sqrt': negative input");

        // An explicit stage is not overwritten
        let err = err.in_stage("other");
        assert_eq!(err.stage, "sqrt");
    }

    #[test]
    fn test_transform_error_to_json() {
        let err = TransformError::new("boom").in_stage("parse");
        let json = err.to_json();
        assert_eq!(json["stage"], "parse");
        assert_eq!(json["message"], "boom");
    }

    #[test]
    fn test_pipeline_error_from_transform() {
        let err: PipelineError = TransformError::new("bad").in_stage("s").into();
        assert!(matches!(err, PipelineError::Transform(_)));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_error() {
        let err = PipelineError::Cancelled("shutdown".to_string());
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Pipeline cancelled: shutdown");
    }

    #[test]
    fn test_config_error_invalid() {
        let err = ConfigError::invalid("name", "must not be empty");
        assert_eq!(err.to_string(), "Invalid config field 'name': must not be empty");
    }

    #[test]
    fn test_stream_error_display() {
        assert_eq!(StreamError::Closed.to_string(), "Stream is closed");
        assert_eq!(StreamError::Disconnected.to_string(), "Stream consumer disconnected");
    }
}
