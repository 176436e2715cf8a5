//! Threading a stream through a sequence of stages.

use crate::context::StageContext;
use crate::stages::Stage;
use crate::stream::Stream;
use std::sync::Arc;

/// Applies `stages` to `source` in sequence order.
///
/// Returns `stages[n-1](… stages[0](source))`. With no stages the source is
/// returned unchanged. Every stage's worker is running by the time this
/// returns; the workers belong to a fresh detached run.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn compose<T>(source: Stream<T>, stages: &[Arc<dyn Stage<T>>]) -> Stream<T>
where
    T: Send + 'static,
{
    compose_in(source, stages, &StageContext::detached())
}

/// Like [`compose`], spawning the workers in `ctx`'s run.
///
/// The stage at index `i` runs at position `i + 1`.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn compose_in<T>(source: Stream<T>, stages: &[Arc<dyn Stage<T>>], ctx: &StageContext) -> Stream<T>
where
    T: Send + 'static,
{
    stages
        .iter()
        .enumerate()
        .fold(source, |stream, (index, stage)| {
            stage.spawn(stream, &ctx.at(index + 1))
        })
}
