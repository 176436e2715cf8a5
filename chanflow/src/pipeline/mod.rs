//! Pipeline composition and execution.
//!
//! This module provides:
//! - [`compose`]: thread a stream through a list of same-typed stages
//! - [`Pipeline`]: a typed, reusable chain of stages
//! - [`Driver`]: feed a source, drain the output, join every worker
//! - Worker supervision ([`WorkerSet`], [`StageReport`])

mod builder;
mod compose;
mod config;
mod driver;
mod handle;
mod source;
mod workers;

#[cfg(test)]
mod integration_tests;

pub use builder::Pipeline;
pub use compose::{compose, compose_in};
pub use config::PipelineConfig;
pub use driver::{Driver, RunReport, RunSummary};
pub use handle::{PipelineHandle, RunningPipeline};
pub use source::{source_from_iter, source_from_stream, SOURCE_STAGE};
pub use workers::{StageOutcome, StageReport, WorkerSet, WorkerState, WorkerStatus};
