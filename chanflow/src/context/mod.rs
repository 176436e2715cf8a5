//! Context management for pipeline runs.
//!
//! A [`PipelineContext`] holds what every worker of one run shares (name,
//! run id, cancellation, event sink, worker handles). A [`StageContext`] is
//! that run seen from one position in the chain.

mod execution;

pub use execution::{PipelineContext, StageContext};
