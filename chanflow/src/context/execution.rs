//! Execution contexts shared by the workers of a pipeline run.

use crate::cancellation::CancellationToken;
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::observability::stage_span;
use crate::pipeline::{StageReport, WorkerSet, WorkerStatus};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// State shared by every worker of one pipeline run.
pub struct PipelineContext {
    /// Pipeline name used in logs and events.
    pipeline: String,
    /// Unique id of this run.
    run_id: Uuid,
    /// Cancellation shared by every worker.
    cancel_token: Arc<CancellationToken>,
    /// Event sink for lifecycle events.
    event_sink: Arc<dyn EventSink>,
    /// Whether lifecycle events are emitted at all.
    emit_events: bool,
    /// Join handles of the spawned workers.
    workers: WorkerSet,
}

impl PipelineContext {
    /// Creates a context for a new run.
    #[must_use]
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            run_id: Uuid::new_v4(),
            cancel_token: Arc::new(CancellationToken::new()),
            event_sink: Arc::new(NoOpEventSink),
            emit_events: true,
            workers: WorkerSet::new(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Shares an externally owned cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel_token = token;
        self
    }

    /// Enables or disables lifecycle events.
    #[must_use]
    pub const fn with_events(mut self, emit_events: bool) -> Self {
        self.emit_events = emit_events;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    /// Returns the run id.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel_token
    }

    /// Returns the workers spawned so far.
    #[must_use]
    pub const fn workers(&self) -> &WorkerSet {
        &self.workers
    }

    /// Sends an event to the sink without waiting, tagged with the run id.
    pub fn emit(&self, event: &PipelineEvent) {
        if let Some(payload) = self.tagged_payload(event) {
            self.event_sink.try_emit(&event.event_type, Some(payload));
        }
    }

    /// Sends an event to the sink and waits until the sink has taken it.
    ///
    /// Used for terminal events, which must reach the sink before the run
    /// is reported as finished.
    pub async fn emit_async(&self, event: &PipelineEvent) {
        if let Some(payload) = self.tagged_payload(event) {
            self.event_sink.emit(&event.event_type, Some(payload)).await;
        }
    }

    fn tagged_payload(&self, event: &PipelineEvent) -> Option<serde_json::Value> {
        if !self.emit_events {
            return None;
        }
        let mut payload = event.payload();
        if let serde_json::Value::Object(ref mut map) = payload {
            map.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
        }
        Some(payload)
    }

    /// Returns the context seen by the worker at `position`.
    #[must_use]
    pub fn stage(self: &Arc<Self>, position: usize) -> StageContext {
        StageContext {
            pipeline: Arc::clone(self),
            position,
        }
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("pipeline", &self.pipeline)
            .field("run_id", &self.run_id)
            .field("cancelled", &self.cancel_token.is_cancelled())
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

/// The context handed to a stage when it is spawned.
///
/// Cheap to clone; every clone refers to the same run.
#[derive(Debug, Clone)]
pub struct StageContext {
    pipeline: Arc<PipelineContext>,
    position: usize,
}

impl StageContext {
    /// A context for stages composed outside a named pipeline.
    #[must_use]
    pub fn detached() -> Self {
        Arc::new(PipelineContext::new("detached")).stage(0)
    }

    /// Returns the run this context belongs to.
    #[must_use]
    pub const fn pipeline(&self) -> &Arc<PipelineContext> {
        &self.pipeline
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        self.pipeline.pipeline_name()
    }

    /// Position in the chain; the source feeder is 0, stages start at 1.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        self.pipeline.cancel_token()
    }

    /// Returns whether the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.pipeline.cancel_token().is_cancelled()
    }

    /// The same run seen from another position.
    #[must_use]
    pub fn at(&self, position: usize) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            position,
        }
    }

    /// Sends an event to the run's sink.
    pub fn emit(&self, event: &PipelineEvent) {
        self.pipeline.emit(event);
    }

    /// Spawns a worker for `stage` at this position and tracks it in the run.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn_worker<F, Fut>(&self, stage: &str, task: F)
    where
        F: FnOnce(Arc<WorkerStatus>) -> Fut,
        Fut: Future<Output = StageReport> + Send + 'static,
    {
        let span = stage_span(self.pipeline_name(), stage, self.position);
        self.pipeline
            .workers()
            .spawn(stage, self.position, |status| task(status).instrument(span));
    }
}
