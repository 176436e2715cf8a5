//! Typed pipeline builder.

use super::source::{source_from_iter, source_from_stream};
use super::{PipelineConfig, PipelineHandle, RunningPipeline};
use crate::cancellation::{CallbackId, CancellationToken};
use crate::context::PipelineContext;
use crate::errors::ConfigError;
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::stages::Stage;
use crate::stream::Stream;
use std::sync::Arc;
use tracing::info;

type Link<I, O> = Box<dyn Fn(Stream<I>, &Arc<PipelineContext>) -> Stream<O> + Send + Sync>;

/// An ordered chain of stages from `I` to `O`.
///
/// Building is free of side effects; workers are only spawned by
/// [`compose`](Self::compose) and its variants, once per call.
///
/// ```ignore
/// let pipeline = Pipeline::<i64>::new("numbers")
///     .stage(multiply_by(2))
///     .stage(add(5));
/// ```
pub struct Pipeline<I, O = I> {
    config: PipelineConfig,
    event_sink: Arc<dyn EventSink>,
    stage_names: Vec<String>,
    link: Link<I, O>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Creates an empty pipeline, which forwards its source unchanged.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: PipelineConfig::new().with_name(name),
            event_sink: Arc::new(NoOpEventSink),
            stage_names: Vec::new(),
            link: Box::new(|input: Stream<T>, _: &Arc<PipelineContext>| input),
        }
    }

    /// Creates a pipeline running `stages` in order.
    #[must_use]
    pub fn from_stages(name: impl Into<String>, stages: Vec<Arc<dyn Stage<T>>>) -> Self {
        stages.into_iter().fold(Self::new(name), Self::stage)
    }
}

impl<I, O> Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Appends a stage that keeps the element type.
    #[must_use]
    pub fn stage<S>(self, stage: S) -> Self
    where
        S: Stage<O> + 'static,
    {
        self.then(stage)
    }

    /// Appends a stage, possibly changing the element type.
    #[must_use]
    pub fn then<P, S>(self, stage: S) -> Pipeline<I, P>
    where
        P: Send + 'static,
        S: Stage<O, P> + 'static,
    {
        let position = self.stage_names.len() + 1;
        let mut stage_names = self.stage_names;
        stage_names.push(stage.name().to_string());
        let upstream = self.link;

        Pipeline {
            config: self.config,
            event_sink: self.event_sink,
            stage_names,
            link: Box::new(move |input: Stream<I>, run: &Arc<PipelineContext>| {
                let intermediate = upstream(input, run);
                stage.spawn(intermediate, &run.stage(position))
            }),
        }
    }

    /// Replaces the configuration, keeping the current name if `config`
    /// uses the default one.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        let name = if config.name == PipelineConfig::default().name {
            std::mem::take(&mut self.config.name)
        } else {
            config.name.clone()
        };
        self.config = PipelineConfig { name, ..config };
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the stage names in application order.
    #[must_use]
    pub fn stage_names(&self) -> &[String] {
        &self.stage_names
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stage_names.len()
    }

    /// Returns true if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stage_names.is_empty()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    /// Spawns one worker per stage over `source` in a new run.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn compose(&self, source: Stream<I>) -> RunningPipeline<O> {
        self.compose_with_token(source, Arc::new(CancellationToken::new()))
    }

    /// Like [`compose`](Self::compose), sharing an external cancellation token.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn compose_with_token(
        &self,
        source: Stream<I>,
        token: Arc<CancellationToken>,
    ) -> RunningPipeline<O> {
        let (run, cancel_hook) = self.start_run(token);
        self.link_run(source, run, cancel_hook)
    }

    /// Feeds `values` through the pipeline in a new run.
    ///
    /// The source feeder is tracked by the run at position 0.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn compose_from_iter<It>(&self, values: It) -> RunningPipeline<O>
    where
        It: IntoIterator<Item = I>,
        It::IntoIter: Send + 'static,
    {
        let (run, cancel_hook) = self.start_run(Arc::new(CancellationToken::new()));
        let source = source_from_iter(values, &run.stage(0));
        self.link_run(source, run, cancel_hook)
    }

    /// Feeds an arbitrary, possibly infinite, stream through the pipeline.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn compose_from_stream<S>(&self, values: S, token: Arc<CancellationToken>) -> RunningPipeline<O>
    where
        S: futures::Stream<Item = I> + Send + 'static,
    {
        let (run, cancel_hook) = self.start_run(token);
        let source = source_from_stream(values, &run.stage(0));
        self.link_run(source, run, cancel_hook)
    }

    fn start_run(&self, token: Arc<CancellationToken>) -> (Arc<PipelineContext>, CallbackId) {
        let run = Arc::new(
            PipelineContext::new(self.config.name.clone())
                .with_event_sink(Arc::clone(&self.event_sink))
                .with_cancel_token(token)
                .with_events(self.config.emit_events),
        );

        let weak = Arc::downgrade(&run);
        let cancel_hook = run.cancel_token().on_cancel(move |reason| {
            if let Some(run) = weak.upgrade() {
                info!(pipeline = %run.pipeline_name(), reason, "Pipeline cancelled");
                run.emit(&PipelineEvent::pipeline_cancelled(run.pipeline_name(), reason));
            }
        });

        info!(
            pipeline = %self.config.name,
            run_id = %run.run_id(),
            stages = self.stage_names.len(),
            "Pipeline started"
        );
        run.emit(&PipelineEvent::pipeline_started(&self.config.name, &self.stage_names));
        (run, cancel_hook)
    }

    fn link_run(
        &self,
        source: Stream<I>,
        run: Arc<PipelineContext>,
        cancel_hook: CallbackId,
    ) -> RunningPipeline<O> {
        let output = (self.link)(source, &run);
        RunningPipeline {
            output,
            handle: PipelineHandle::new(run, self.config.clone(), cancel_hook),
        }
    }
}

impl<I, O> std::fmt::Debug for Pipeline<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.config.name)
            .field("stages", &self.stage_names)
            .finish_non_exhaustive()
    }
}
