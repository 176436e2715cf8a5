//! Testing utilities for chanflow pipelines.
//!
//! This module provides:
//! - Stream assertions with a bounded wait
//! - Mock stages (delayed, recording, panicking)

mod assertions;
mod mocks;

pub use assertions::{assert_stream_yields, collect_within};
pub use mocks::{DelayStage, PanickingStage, RecordingStage};
