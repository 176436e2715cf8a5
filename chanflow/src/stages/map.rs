//! One-in, one-out stages.

use super::worker::{spawn_stage, Emit};
use super::{ErrorPolicy, Stage};
use crate::context::StageContext;
use crate::errors::TransformError;
use crate::stream::Stream;
use std::fmt::{self, Debug};
use std::future::{self, Future};
use std::marker::PhantomData;
use std::sync::Arc;

/// Applies a pure function to every element.
pub struct MapStage<I, O, F> {
    name: String,
    func: Arc<F>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, F> MapStage<I, O, F>
where
    F: Fn(I) -> O + Send + Sync + 'static,
{
    /// Creates a new map stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
            _types: PhantomData,
        }
    }
}

impl<I, O, F> Debug for MapStage<I, O, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapStage").field("name", &self.name).finish()
    }
}

impl<I, O, F> Stage<I, O> for MapStage<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, input: Stream<I>, ctx: &StageContext) -> Stream<O> {
        let func = Arc::clone(&self.func);
        spawn_stage(&self.name, input, ctx, ErrorPolicy::Halt, move |item| {
            future::ready(Ok(Emit::One(func(item))))
        })
    }
}

/// Awaits an async function for every element.
///
/// Elements are still processed one at a time, so order is preserved.
pub struct AsyncMapStage<I, O, F> {
    name: String,
    func: Arc<F>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, F, Fut> AsyncMapStage<I, O, F>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    /// Creates a new async map stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
            _types: PhantomData,
        }
    }
}

impl<I, O, F> Debug for AsyncMapStage<I, O, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncMapStage").field("name", &self.name).finish()
    }
}

impl<I, O, F, Fut> Stage<I, O> for AsyncMapStage<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, input: Stream<I>, ctx: &StageContext) -> Stream<O> {
        let func = Arc::clone(&self.func);
        spawn_stage(&self.name, input, ctx, ErrorPolicy::Halt, move |item| {
            let pending = func(item);
            async move { Ok::<_, TransformError>(Emit::One(pending.await)) }
        })
    }
}

/// Applies a failable function; failures are handled by an [`ErrorPolicy`].
pub struct TryMapStage<I, O, F> {
    name: String,
    func: Arc<F>,
    policy: ErrorPolicy,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, F> TryMapStage<I, O, F>
where
    F: Fn(I) -> Result<O, TransformError> + Send + Sync + 'static,
{
    /// Creates a new failable stage that halts on the first error.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
            policy: ErrorPolicy::default(),
            _types: PhantomData,
        }
    }

    /// Sets the error policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the error policy.
    #[must_use]
    pub const fn policy(&self) -> ErrorPolicy {
        self.policy
    }
}

impl<I, O, F> Debug for TryMapStage<I, O, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryMapStage")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<I, O, F> Stage<I, O> for TryMapStage<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<O, TransformError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, input: Stream<I>, ctx: &StageContext) -> Stream<O> {
        let func = Arc::clone(&self.func);
        spawn_stage(&self.name, input, ctx, self.policy, move |item| {
            future::ready(func(item).map(Emit::One))
        })
    }
}
