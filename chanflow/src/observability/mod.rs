//! Observability utilities.

mod logging;

pub use logging::{init_tracing, stage_span, LogFormat};
