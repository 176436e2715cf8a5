//! Stage trait and implementations.
//!
//! A stage turns one [`Stream`] into another. Spawning a stage starts exactly
//! one worker that reads the input, transforms each element and writes the
//! output, then closes the output once the input is exhausted.

mod flat_map;
mod map;
mod ops;
mod worker;

pub use flat_map::{FilterStage, FlatMapStage};
pub use map::{AsyncMapStage, MapStage, TryMapStage};
pub use ops::{add, identity, multiply_by, Arithmetic};
pub use worker::{spawn_stage, Emit};

use crate::context::StageContext;
use crate::stream::Stream;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline stages.
///
/// `spawn` must return immediately: the work happens in the worker it
/// starts, which is tracked by the run behind `ctx`. The returned stream
/// closes once the worker has forwarded everything it will ever forward.
pub trait Stage<I, O = I>: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Starts the stage's worker over `input` and returns its output.
    fn spawn(&self, input: Stream<I>, ctx: &StageContext) -> Stream<O>;
}

impl<I, O, S> Stage<I, O> for Arc<S>
where
    S: Stage<I, O> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn spawn(&self, input: Stream<I>, ctx: &StageContext) -> Stream<O> {
        (**self).spawn(input, ctx)
    }
}

/// What a failable stage does with an element whose transformation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Drop the element, report it and keep going.
    Skip,
    /// Stop the stage and close its output.
    #[default]
    Halt,
}
