//! # Chanflow
//!
//! Composable concurrent stream pipelines.
//!
//! A pipeline is an ordered list of stages. Each stage turns one stream into
//! another and runs as its own Tokio task; adjacent stages are linked by
//! rendezvous channels, so a producer is never more than one element ahead
//! of its consumer. Chanflow provides:
//!
//! - **Streams**: single-producer, single-consumer links with idempotent close
//! - **Stages**: map, flat-map, filter, async and failable transformations
//! - **Composition**: a left fold of stages over a source stream
//! - **Driver**: feed a source, drain the output, join every worker
//! - **Cancellation and supervision**: no worker outlives its run
//! - **Event-driven observability**: lifecycle events and tracing spans
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chanflow::prelude::*;
//!
//! let pipeline = Pipeline::<i64>::new("numbers")
//!     .stage(multiply_by(2))
//!     .stage(add(5));
//!
//! let report = Driver::new(pipeline).run(vec![1, 2, 3]).await?;
//! assert_eq!(report.outputs, vec![7, 9, 11]);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod stream;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{PipelineContext, StageContext};
    pub use crate::errors::{PipelineError, PipelineResult, StreamError, TransformError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        compose, source_from_iter, source_from_stream, Driver, Pipeline, PipelineConfig,
        PipelineHandle, RunReport, RunningPipeline, StageOutcome, StageReport,
    };
    pub use crate::stages::{
        add, identity, multiply_by, Arithmetic, AsyncMapStage, ErrorPolicy, FilterStage,
        FlatMapStage, MapStage, Stage, TryMapStage,
    };
    pub use crate::stream::{channel, Stream, StreamSender};
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[tokio::test]
    async fn quick_start_runs() {
        let pipeline = Pipeline::<i64>::new("numbers")
            .stage(multiply_by(2))
            .stage(add(5));

        let report = Driver::new(pipeline).run(vec![1, 2, 3]).await.unwrap();
        assert_eq!(report.outputs, vec![7, 9, 11]);
    }
}
