//! Stages that emit zero or more outputs per input.

use super::worker::{spawn_stage, Emit};
use super::{ErrorPolicy, Stage};
use crate::context::StageContext;
use crate::errors::TransformError;
use crate::stream::Stream;
use std::fmt::{self, Debug};
use std::future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Expands every element into a sequence of outputs.
///
/// Outputs of one element are emitted in order, before any output of the
/// next element. The expansion is pulled one output at a time, so it may be
/// endless; the stage then runs until its consumer goes away.
pub struct FlatMapStage<I, O, F> {
    name: String,
    func: Arc<F>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, F, It> FlatMapStage<I, O, F>
where
    F: Fn(I) -> It + Send + Sync + 'static,
    It: IntoIterator<Item = O>,
{
    /// Creates a new flat-map stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
            _types: PhantomData,
        }
    }
}

impl<I, O, F> Debug for FlatMapStage<I, O, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatMapStage").field("name", &self.name).finish()
    }
}

impl<I, O, F, It> Stage<I, O> for FlatMapStage<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> It + Send + Sync + 'static,
    It: IntoIterator<Item = O>,
    It::IntoIter: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, input: Stream<I>, ctx: &StageContext) -> Stream<O> {
        let func = Arc::clone(&self.func);
        spawn_stage(&self.name, input, ctx, ErrorPolicy::Halt, move |item| {
            future::ready(Ok::<_, TransformError>(Emit::many(func(item))))
        })
    }
}

/// Forwards only the elements matching a predicate.
pub struct FilterStage<T, F> {
    name: String,
    predicate: Arc<F>,
    _types: PhantomData<fn(T) -> T>,
}

impl<T, F> FilterStage<T, F>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    /// Creates a new filter stage.
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            _types: PhantomData,
        }
    }
}

impl<T, F> Debug for FilterStage<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterStage").field("name", &self.name).finish()
    }
}

impl<T, F> Stage<T> for FilterStage<T, F>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, input: Stream<T>, ctx: &StageContext) -> Stream<T> {
        let predicate = Arc::clone(&self.predicate);
        spawn_stage(&self.name, input, ctx, ErrorPolicy::Halt, move |item| {
            let emit = if predicate(&item) {
                Emit::One(item)
            } else {
                Emit::Nothing
            };
            future::ready(Ok::<_, TransformError>(emit))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageOutcome;
    use crate::stream::channel;
    use futures::StreamExt;

    fn feed(values: Vec<u32>) -> Stream<u32> {
        let (mut tx, rx) = channel();
        tokio::spawn(async move {
            for value in values {
                if tx.send(value).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    #[tokio::test]
    async fn test_flat_map_keeps_groups_in_order() {
        let stage = FlatMapStage::new("repeat", |n: u32| vec![n; n as usize]);
        let out = stage.spawn(feed(vec![1, 0, 3]), &StageContext::detached());

        let values: Vec<u32> = out.collect().await;
        assert_eq!(values, vec![1, 3, 3, 3]);
    }

    #[tokio::test]
    async fn test_flat_map_expansion_is_lazy() {
        let ctx = StageContext::detached().at(1);
        let stage = FlatMapStage::new("forever", |n: u32| std::iter::repeat(n));
        let out = stage.spawn(feed(vec![7]), &ctx);

        let values: Vec<u32> = out.take(3).collect().await;
        assert_eq!(values, vec![7, 7, 7]);

        let reports = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            ctx.pipeline().workers().join_all(ctx.cancel_token(), None),
        )
        .await
        .expect("worker should stop once its consumer is gone")
        .unwrap();
        assert_eq!(reports[0].emitted, 3);
        assert_eq!(reports[0].outcome, StageOutcome::Disconnected);
    }

    #[tokio::test]
    async fn test_filter_drops_non_matching() {
        let stage = FilterStage::new("even", |n: &u32| n % 2 == 0);
        assert_eq!(stage.name(), "even");

        let out = stage.spawn(feed((1..=6).collect()), &StageContext::detached());
        let values: Vec<u32> = out.collect().await;
        assert_eq!(values, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_filter_everything_still_closes() {
        let stage = FilterStage::new("none", |_: &u32| false);
        let out = stage.spawn(feed(vec![1, 2, 3]), &StageContext::detached());

        let values: Vec<u32> = out.collect().await;
        assert!(values.is_empty());
    }
}
