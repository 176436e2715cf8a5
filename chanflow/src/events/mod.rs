//! Event sink system for observability.
//!
//! Workers report their lifecycle (`stage.started`, `stage.closed`, ...)
//! to the [`EventSink`] carried by their [`StageContext`](crate::context::StageContext).

mod event;
mod sink;

pub use event::PipelineEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
