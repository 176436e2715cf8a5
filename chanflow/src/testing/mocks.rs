//! Mock stages for testing.

use parking_lot::Mutex;
use std::fmt::{self, Debug};
use std::future;
use std::sync::Arc;
use std::time::Duration;

use crate::context::StageContext;
use crate::errors::TransformError;
use crate::stages::{spawn_stage, Emit, ErrorPolicy, Stage};
use crate::stream::Stream;

/// A stage that forwards every element after a fixed delay.
#[derive(Debug, Clone)]
pub struct DelayStage {
    name: String,
    delay: Duration,
}

impl DelayStage {
    /// Creates a new delay stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }

    /// Creates a delay stage with the delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self::new(name, Duration::from_millis(ms))
    }

    /// Returns the per-element delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl<T: Send + 'static> Stage<T> for DelayStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, input: Stream<T>, ctx: &StageContext) -> Stream<T> {
        let delay = self.delay;
        spawn_stage(&self.name, input, ctx, ErrorPolicy::Halt, move |item| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, TransformError>(Emit::One(item))
        })
    }
}

/// A stage that forwards elements unchanged and records each one it saw.
pub struct RecordingStage<T> {
    name: String,
    seen: Arc<Mutex<Vec<T>>>,
}

impl<T> RecordingStage<T> {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of elements seen so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }
}

impl<T: Clone> RecordingStage<T> {
    /// Elements seen so far, in arrival order.
    #[must_use]
    pub fn seen(&self) -> Vec<T> {
        self.seen.lock().clone()
    }
}

impl<T> Debug for RecordingStage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingStage")
            .field("name", &self.name)
            .field("seen", &self.count())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Stage<T> for RecordingStage<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, input: Stream<T>, ctx: &StageContext) -> Stream<T> {
        let seen = Arc::clone(&self.seen);
        spawn_stage(&self.name, input, ctx, ErrorPolicy::Halt, move |item: T| {
            seen.lock().push(item.clone());
            future::ready(Ok::<_, TransformError>(Emit::One(item)))
        })
    }
}

/// A stage whose worker panics on the element at `index` (0-based).
#[derive(Debug, Clone)]
pub struct PanickingStage {
    name: String,
    index: u64,
}

impl PanickingStage {
    /// Creates a stage panicking on the `index`-th element.
    #[must_use]
    pub fn new(name: impl Into<String>, index: u64) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl<T: Send + 'static> Stage<T> for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, input: Stream<T>, ctx: &StageContext) -> Stream<T> {
        let index = self.index;
        let mut count: u64 = 0;
        spawn_stage(&self.name, input, ctx, ErrorPolicy::Halt, move |item| {
            assert!(count != index, "element {index} is poisoned");
            count += 1;
            future::ready(Ok::<_, TransformError>(Emit::One(item)))
        })
    }
}
