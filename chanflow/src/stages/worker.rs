//! The receive/transform/emit loop shared by every stage kind.

use super::ErrorPolicy;
use crate::context::StageContext;
use crate::errors::TransformError;
use crate::events::PipelineEvent;
use crate::pipeline::{StageOutcome, StageReport, WorkerState, WorkerStatus};
use crate::stream::{channel, Stream, StreamSender};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// What one input element turned into.
///
/// Iterating an `Emit` yields its outputs in order. `Many` is drained one
/// output per rendezvous, so an expansion is never materialized up front.
pub enum Emit<O> {
    /// The element was filtered out.
    Nothing,
    /// Exactly one output.
    One(O),
    /// Any number of outputs, produced on demand.
    Many(Box<dyn Iterator<Item = O> + Send>),
}

impl<O> Emit<O> {
    /// Wraps any sendable sequence as [`Emit::Many`].
    pub fn many<It>(values: It) -> Self
    where
        It: IntoIterator<Item = O>,
        It::IntoIter: Send + 'static,
    {
        Self::Many(Box::new(values.into_iter()))
    }
}

impl<O> Iterator for Emit<O> {
    type Item = O;

    fn next(&mut self) -> Option<O> {
        match self {
            Self::Nothing => None,
            Self::One(_) => match std::mem::replace(self, Self::Nothing) {
                Self::One(value) => Some(value),
                _ => None,
            },
            Self::Many(values) => values.next(),
        }
    }
}

impl<O> fmt::Debug for Emit<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => f.write_str("Nothing"),
            Self::One(_) => f.write_str("One(..)"),
            Self::Many(_) => f.write_str("Many(..)"),
        }
    }
}

/// Spawns a stage worker driving `step` over `input` and returns its output.
///
/// The worker owns the output sender: it is the only writer and closes the
/// stream exactly once, whichever way the loop ends.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn spawn_stage<I, O, F, Fut>(
    stage: &str,
    input: Stream<I>,
    ctx: &StageContext,
    policy: ErrorPolicy,
    step: F,
) -> Stream<O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Emit<O>, TransformError>> + Send + 'static,
{
    let (output, stream) = channel();
    let worker = StageLoop {
        name: stage.to_string(),
        input,
        output,
        ctx: ctx.clone(),
        policy,
    };
    ctx.spawn_worker(stage, move |status| worker.run(status, step));
    stream
}

struct StageLoop<I, O> {
    name: String,
    input: Stream<I>,
    output: StreamSender<O>,
    ctx: StageContext,
    policy: ErrorPolicy,
}

impl<I: Send, O: Send> StageLoop<I, O> {
    async fn run<F, Fut>(mut self, status: Arc<WorkerStatus>, mut step: F) -> StageReport
    where
        F: FnMut(I) -> Fut + Send,
        Fut: Future<Output = Result<Emit<O>, TransformError>> + Send,
    {
        let started = Instant::now();
        let token = Arc::clone(self.ctx.cancel_token());
        let mut report = StageReport::new(&self.name, self.ctx.position());

        self.ctx
            .emit(&PipelineEvent::stage_started(&self.name, self.ctx.position()));
        debug!("Stage worker started");

        let outcome = 'work: loop {
            status.transition(WorkerState::Receiving);
            let next = tokio::select! {
                biased;
                () = token.cancelled() => break 'work StageOutcome::Cancelled,
                next = self.input.recv() => next,
            };
            let Some(item) = next else {
                break 'work StageOutcome::Drained;
            };
            report.received += 1;

            status.transition(WorkerState::Transforming);
            let outputs = match step(item).await {
                Ok(outputs) => outputs,
                Err(err) => {
                    let err = err.in_stage(&self.name);
                    match self.policy {
                        ErrorPolicy::Skip => {
                            warn!(error = %err.message, "Skipping element");
                            report.skipped += 1;
                            self.ctx.emit(&PipelineEvent::element_skipped(&err));
                            continue 'work;
                        }
                        ErrorPolicy::Halt => {
                            error!(error = %err.message, "Stage halted");
                            self.ctx.emit(&PipelineEvent::stage_failed(&err));
                            report.error = Some(err);
                            break 'work StageOutcome::Halted;
                        }
                    }
                }
            };

            status.transition(WorkerState::Emitting);
            for value in outputs {
                let sent = tokio::select! {
                    biased;
                    () = token.cancelled() => break 'work StageOutcome::Cancelled,
                    sent = self.output.send(value) => sent,
                };
                if sent.is_err() {
                    break 'work StageOutcome::Disconnected;
                }
                report.emitted += 1;
            }
        };

        status.transition(WorkerState::Draining);
        self.output.close();
        drop(self.input);
        status.transition(WorkerState::Closed);

        report.outcome = outcome;
        report.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            received = report.received,
            emitted = report.emitted,
            skipped = report.skipped,
            outcome = ?report.outcome,
            "Stage worker closed"
        );
        self.ctx.emit(&PipelineEvent::stage_closed(&report));
        report
    }
}
