//! Source feeders: the producers of the first stream in a chain.

use super::{StageOutcome, StageReport, WorkerState};
use crate::context::StageContext;
use crate::events::PipelineEvent;
use crate::stream::{channel, Stream};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Stage name reported for source feeders.
pub const SOURCE_STAGE: &str = "source";

/// Creates a stream yielding `values` in order, then closing.
///
/// A feeder worker is spawned in `ctx`'s run; it stops early if the stream
/// is dropped or the run is cancelled. An empty `values` yields a stream
/// that closes straight away.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn source_from_iter<T, It>(values: It, ctx: &StageContext) -> Stream<T>
where
    T: Send + 'static,
    It: IntoIterator<Item = T>,
    It::IntoIter: Send + 'static,
{
    source_from_stream(futures::stream::iter(values), ctx)
}

/// Creates a stream forwarding every item of `values`, then closing.
///
/// `values` may be infinite; such a source only stops when the consumer goes
/// away or the run is cancelled.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn source_from_stream<T, S>(values: S, ctx: &StageContext) -> Stream<T>
where
    T: Send + 'static,
    S: futures::Stream<Item = T> + Send + 'static,
{
    let (mut tx, stream) = channel();
    let feeder = ctx.clone();

    ctx.spawn_worker(SOURCE_STAGE, move |status| async move {
        let started = Instant::now();
        let token = Arc::clone(feeder.cancel_token());
        let mut report = StageReport::new(SOURCE_STAGE, feeder.position());
        let mut values = std::pin::pin!(values);

        feeder.emit(&PipelineEvent::stage_started(SOURCE_STAGE, feeder.position()));

        let outcome = 'feed: loop {
            status.transition(WorkerState::Receiving);
            let next = tokio::select! {
                biased;
                () = token.cancelled() => break 'feed StageOutcome::Cancelled,
                next = values.next() => next,
            };
            let Some(value) = next else {
                break 'feed StageOutcome::Drained;
            };
            report.received += 1;

            status.transition(WorkerState::Emitting);
            let sent = tokio::select! {
                biased;
                () = token.cancelled() => break 'feed StageOutcome::Cancelled,
                sent = tx.send(value) => sent,
            };
            if sent.is_err() {
                break 'feed StageOutcome::Disconnected;
            }
            report.emitted += 1;
        };

        status.transition(WorkerState::Draining);
        tx.close();
        status.transition(WorkerState::Closed);

        report.outcome = outcome;
        report.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(fed = report.emitted, outcome = ?report.outcome, "Source closed");
        feeder.emit(&PipelineEvent::stage_closed(&report));
        report
    });

    stream
}
