//! Where pipeline events go.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn, Level};

/// Event types that report a run or stage going wrong.
const FAILURE_EVENTS: &[&str] = &["stage.failed", "element.skipped", "pipeline.cancelled"];

/// Receives the lifecycle events of pipeline runs.
///
/// Payloads are JSON objects tagged with the `run_id` of the run that
/// produced them, so one sink can serve many runs.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Records an event without waiting.
    ///
    /// Called from inside stage workers; must not block or panic.
    fn try_emit(&self, event_type: &str, data: Option<Value>);

    /// Records an event, waiting until the sink has accepted it.
    ///
    /// The driver awaits this for `pipeline.completed`. Sinks that deliver
    /// over I/O override it; the default forwards to
    /// [`try_emit`](Self::try_emit).
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.try_emit(event_type, data);
    }
}

/// Discards every event. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to `tracing`, with the run and stage as fields.
///
/// Failure events are always logged at WARN.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Logs ordinary events at DEBUG if `level` is DEBUG or TRACE, else at INFO.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Logs ordinary events at DEBUG.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        let field = |key: &str| {
            data.as_ref()
                .and_then(|payload| payload.get(key))
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string()
        };
        let run_id = field("run_id");
        let stage = field("stage");

        if FAILURE_EVENTS.contains(&event_type) {
            warn!(event_type, run_id = %run_id, stage = %stage, payload = ?data, "Pipeline event");
        } else if self.level > Level::INFO {
            debug!(event_type, run_id = %run_id, stage = %stage, payload = ?data, "Pipeline event");
        } else {
            info!(event_type, run_id = %run_id, stage = %stage, "Pipeline event");
        }
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event received so far.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.read().clone()
    }

    /// Number of events received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Events whose type starts with `type_prefix`, e.g. `"stage."`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<(String, Option<Value>)> {
        self.events
            .read()
            .iter()
            .filter(|(event_type, _)| event_type.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Distinct run ids seen in payloads.
    #[must_use]
    pub fn run_ids(&self) -> BTreeSet<String> {
        self.events
            .read()
            .iter()
            .filter_map(|(_, data)| data.as_ref()?.get("run_id")?.as_str().map(str::to_string))
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}
