//! Handles to running pipelines.

use super::{PipelineConfig, StageReport, WorkerState};
use crate::cancellation::{CallbackId, CancellationToken};
use crate::context::PipelineContext;
use crate::errors::PipelineResult;
use crate::stream::Stream;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// A composed pipeline whose workers are already running.
#[derive(Debug)]
pub struct RunningPipeline<O> {
    /// The final stream. Read it until it closes.
    pub output: Stream<O>,
    /// Join, cancel and inspect the run.
    pub handle: PipelineHandle,
}

impl<O> RunningPipeline<O> {
    /// Splits into the output stream and the handle.
    #[must_use]
    pub fn into_parts(self) -> (Stream<O>, PipelineHandle) {
        (self.output, self.handle)
    }
}

/// Control over the workers of one run.
///
/// Joining is only meaningful once the output has been drained or dropped:
/// until then the last stage waits for its consumer. Dropping an unjoined
/// handle cancels the run unless `cancel_on_drop` is off. Dropping any
/// handle, joined or not, unregisters the run's hook from the token.
pub struct PipelineHandle {
    run: Arc<PipelineContext>,
    config: PipelineConfig,
    cancel_hook: CallbackId,
    joined: bool,
}

impl PipelineHandle {
    pub(crate) fn new(
        run: Arc<PipelineContext>,
        config: PipelineConfig,
        cancel_hook: CallbackId,
    ) -> Self {
        Self {
            run,
            config,
            cancel_hook,
            joined: false,
        }
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run.run_id()
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        self.run.pipeline_name()
    }

    /// Returns the shared run context.
    #[must_use]
    pub const fn context(&self) -> &Arc<PipelineContext> {
        &self.run
    }

    /// Returns the cancellation token shared by every worker.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        self.run.cancel_token()
    }

    /// Requests cancellation; every worker stops at its next suspension point.
    ///
    /// Returns `true` if this call performed the cancellation.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.run.cancel_token().cancel(reason)
    }

    /// Returns whether the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.run.cancel_token().is_cancelled()
    }

    /// Current state of every worker, source first.
    #[must_use]
    pub fn worker_states(&self) -> Vec<(String, WorkerState)> {
        self.run.workers().states()
    }

    /// Waits for every worker and returns their reports in position order.
    ///
    /// # Errors
    ///
    /// Returns the first halting transform error, a worker panic,
    /// [`Cancelled`](crate::errors::PipelineError::Cancelled) if the run was
    /// cancelled, or a join timeout.
    pub async fn join(mut self) -> PipelineResult<Vec<StageReport>> {
        self.joined = true;
        debug!(
            pipeline = %self.run.pipeline_name(),
            workers = self.run.workers().len(),
            "Joining workers"
        );
        self.run
            .workers()
            .join_all(self.run.cancel_token(), self.config.join_timeout())
            .await
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        let token = self.run.cancel_token();
        let abandoned =
            !self.joined && self.config.cancel_on_drop && !self.run.workers().is_empty();
        if abandoned && token.cancel("pipeline handle dropped") {
            info!(pipeline = %self.run.pipeline_name(), "Handle dropped before join, cancelling");
        }
        token.remove_callback(self.cancel_hook);
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("pipeline", &self.run.pipeline_name())
            .field("run_id", &self.run.run_id())
            .field("joined", &self.joined)
            .finish()
    }
}
