//! Pipeline lifecycle events.

use crate::errors::TransformError;
use crate::pipeline::StageReport;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// An event emitted while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// The event type (e.g., "stage.started", "stage.closed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl PipelineEvent {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string(),
            data: serde_json::Map::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Flattens the event into the payload handed to an [`EventSink`](super::EventSink).
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let mut map = self.data.clone();
        map.insert("timestamp".to_string(), serde_json::json!(self.timestamp));
        serde_json::Value::Object(map)
    }

    /// Creates a "pipeline.started" event.
    #[must_use]
    pub fn pipeline_started(pipeline: &str, stages: &[String]) -> Self {
        Self::new("pipeline.started")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("stages", serde_json::json!(stages))
    }

    /// Creates a "stage.started" event.
    #[must_use]
    pub fn stage_started(stage: &str, position: usize) -> Self {
        Self::new("stage.started")
            .add_data("stage", serde_json::json!(stage))
            .add_data("position", serde_json::json!(position))
    }

    /// Creates a "stage.closed" event carrying the worker's final counters.
    #[must_use]
    pub fn stage_closed(report: &StageReport) -> Self {
        Self::new("stage.closed")
            .add_data("stage", serde_json::json!(report.stage))
            .add_data("position", serde_json::json!(report.position))
            .add_data("received", serde_json::json!(report.received))
            .add_data("emitted", serde_json::json!(report.emitted))
            .add_data("skipped", serde_json::json!(report.skipped))
            .add_data("outcome", serde_json::json!(report.outcome))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn stage_failed(error: &TransformError) -> Self {
        Self::new("stage.failed").add_data("error", error.to_json())
    }

    /// Creates an "element.skipped" event.
    #[must_use]
    pub fn element_skipped(error: &TransformError) -> Self {
        Self::new("element.skipped").add_data("error", error.to_json())
    }

    /// Creates a "pipeline.completed" event.
    #[must_use]
    pub fn pipeline_completed(pipeline: &str, elements_in: u64, elements_out: u64, duration_ms: f64) -> Self {
        Self::new("pipeline.completed")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("elements_in", serde_json::json!(elements_in))
            .add_data("elements_out", serde_json::json!(elements_out))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "pipeline.cancelled" event.
    #[must_use]
    pub fn pipeline_cancelled(pipeline: &str, reason: &str) -> Self {
        Self::new("pipeline.cancelled")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("reason", serde_json::json!(reason))
    }
}
