//! Cooperative cancellation for running pipelines.
//!
//! A single [`CancellationToken`] is shared by every worker of a pipeline
//! run. Cancelling it unblocks workers parked on a receive or an emit.

mod token;

pub use token::{CallbackId, CancelCallback, CancellationToken};
