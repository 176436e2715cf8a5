//! The driver: feeds a source, drains the final stream, joins the workers.

use super::{Pipeline, PipelineConfig, RunningPipeline, StageReport};
use crate::cancellation::CancellationToken;
use crate::errors::PipelineResult;
use crate::events::{EventSink, PipelineEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Counters of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// The pipeline name.
    pub pipeline: String,
    /// The run id.
    pub run_id: Uuid,
    /// Elements the source fed into the first stage.
    pub elements_in: u64,
    /// Elements read from the final stream.
    pub elements_out: u64,
    /// Wall time from compose to the last join.
    pub duration_ms: f64,
    /// One report per worker, source first.
    pub stages: Vec<StageReport>,
}

/// Outputs and counters of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport<O> {
    /// Everything the final stream yielded, in order.
    pub outputs: Vec<O>,
    /// The run's counters.
    pub summary: RunSummary,
}

/// Runs a [`Pipeline`] to completion.
///
/// Each `run*` call starts a fresh run. None of them returns before every
/// worker of that run has finished.
pub struct Driver<I, O = I> {
    pipeline: Pipeline<I, O>,
    cancel_token: Option<Arc<CancellationToken>>,
}

impl<I, O> Driver<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates a driver for `pipeline`.
    #[must_use]
    pub const fn new(pipeline: Pipeline<I, O>) -> Self {
        Self {
            pipeline,
            cancel_token: None,
        }
    }

    /// Replaces the pipeline configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline = self.pipeline.with_config(config);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.pipeline = self.pipeline.with_event_sink(sink);
        self
    }

    /// Shares a cancellation token with every run, so runs can be
    /// cancelled from outside.
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Returns the pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline<I, O> {
        &self.pipeline
    }

    /// Feeds `values`, collecting every output.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a stage halted or
    /// panicked, the run was cancelled, or joining timed out.
    pub async fn run<It>(&self, values: It) -> PipelineResult<RunReport<O>>
    where
        It: IntoIterator<Item = I>,
        It::IntoIter: Send + 'static,
    {
        let mut outputs = Vec::new();
        let summary = self.run_with(values, |value| outputs.push(value)).await?;
        Ok(RunReport { outputs, summary })
    }

    /// Feeds `values`, handing each output to `consumer` as it arrives.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_with<It, F>(&self, values: It, consumer: F) -> PipelineResult<RunSummary>
    where
        It: IntoIterator<Item = I>,
        It::IntoIter: Send + 'static,
        F: FnMut(O),
    {
        self.run_stream_with(futures::stream::iter(values), consumer).await
    }

    /// Feeds an arbitrary stream, collecting every output.
    ///
    /// An infinite source only ends through cancellation, so pair it with
    /// [`with_cancel_token`](Self::with_cancel_token).
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_stream<S>(&self, values: S) -> PipelineResult<RunReport<O>>
    where
        S: futures::Stream<Item = I> + Send + 'static,
    {
        let mut outputs = Vec::new();
        let summary = self
            .run_stream_with(values, |value| outputs.push(value))
            .await?;
        Ok(RunReport { outputs, summary })
    }

    async fn run_stream_with<S, F>(&self, values: S, consumer: F) -> PipelineResult<RunSummary>
    where
        S: futures::Stream<Item = I> + Send + 'static,
        F: FnMut(O),
    {
        self.pipeline.validate()?;
        let token = self
            .cancel_token
            .clone()
            .unwrap_or_else(|| Arc::new(CancellationToken::new()));
        let running = self.pipeline.compose_from_stream(values, token);
        drive(running, consumer).await
    }
}

impl<I, O> std::fmt::Debug for Driver<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("pipeline", &self.pipeline)
            .field("shared_token", &self.cancel_token.is_some())
            .finish()
    }
}

async fn drive<O, F>(running: RunningPipeline<O>, mut consumer: F) -> PipelineResult<RunSummary>
where
    F: FnMut(O),
{
    let started = Instant::now();
    let (mut output, handle) = running.into_parts();
    let run = Arc::clone(handle.context());

    let mut elements_out: u64 = 0;
    while let Some(value) = output.recv().await {
        consumer(value);
        elements_out += 1;
    }
    drop(output);

    let stages = match handle.join().await {
        Ok(stages) => stages,
        Err(err) => {
            warn!(pipeline = %run.pipeline_name(), error = %err, "Pipeline run failed");
            return Err(err);
        }
    };

    let elements_in = stages
        .first()
        .filter(|report| report.position == 0)
        .map_or(0, |report| report.emitted);
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    info!(
        pipeline = %run.pipeline_name(),
        elements_in,
        elements_out,
        duration_ms,
        "Pipeline completed"
    );
    run.emit_async(&PipelineEvent::pipeline_completed(
        run.pipeline_name(),
        elements_in,
        elements_out,
        duration_ms,
    ))
    .await;

    Ok(RunSummary {
        pipeline: run.pipeline_name().to_string(),
        run_id: run.run_id(),
        elements_in,
        elements_out,
        duration_ms,
        stages,
    })
}
