//! Supervision of the tasks backing a pipeline run.
//!
//! Every stage worker (and the source feeder) is spawned through a
//! [`WorkerSet`], which keeps its join handle and a live [`WorkerStatus`].
//! Joining the set waits for every worker, turns panics into errors and
//! cancels the remaining workers on the first failure.

use crate::cancellation::CancellationToken;
use crate::errors::{PipelineError, TransformError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifecycle state of a stage worker.
///
/// `Idle → Receiving → Transforming → Emitting → Receiving … → Draining → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    /// Spawned, not yet polled.
    Idle = 0,
    /// Waiting for the next input element.
    Receiving = 1,
    /// Applying the transformation to an accepted element.
    Transforming = 2,
    /// Handing outputs to the downstream consumer.
    Emitting = 3,
    /// Input finished; closing the output.
    Draining = 4,
    /// Output closed. Terminal.
    Closed = 5,
}

impl WorkerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Receiving,
            2 => Self::Transforming,
            3 => Self::Emitting,
            4 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// Live state of one worker, shared between the worker and its supervisor.
#[derive(Debug)]
pub struct WorkerStatus {
    stage: String,
    position: usize,
    state: AtomicU8,
}

impl WorkerStatus {
    /// Creates a status in the `Idle` state.
    #[must_use]
    pub fn new(stage: impl Into<String>, position: usize) -> Self {
        Self {
            stage: stage.into(),
            position,
            state: AtomicU8::new(WorkerState::Idle as u8),
        }
    }

    /// The stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Position in the chain; the source feeder is 0.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Moves to `next`.
    ///
    /// Returns `false` and leaves the state untouched once `Closed` has been
    /// reached, so `Closed` is entered exactly once.
    pub fn transition(&self, next: WorkerState) -> bool {
        let closed = WorkerState::Closed as u8;
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if current == closed {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                next as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Input closed and everything was forwarded.
    Drained,
    /// The downstream consumer went away.
    Disconnected,
    /// Cancellation was requested.
    Cancelled,
    /// A transform error stopped the stage.
    Halted,
}

/// Final counters of one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// The stage name.
    pub stage: String,
    /// Position in the chain; the source feeder is 0.
    pub position: usize,
    /// Elements taken from the input.
    pub received: u64,
    /// Elements handed downstream.
    pub emitted: u64,
    /// Elements dropped by a skip policy.
    pub skipped: u64,
    /// Why the worker stopped.
    pub outcome: StageOutcome,
    /// The error that halted the stage, if any.
    pub error: Option<TransformError>,
    /// Wall time the worker ran for.
    pub duration_ms: f64,
}

impl StageReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new(stage: impl Into<String>, position: usize) -> Self {
        Self {
            stage: stage.into(),
            position,
            received: 0,
            emitted: 0,
            skipped: 0,
            outcome: StageOutcome::Drained,
            error: None,
            duration_ms: 0.0,
        }
    }
}

struct WorkerEntry {
    status: Arc<WorkerStatus>,
    handle: JoinHandle<StageReport>,
}

/// The set of tasks spawned for one pipeline run.
#[derive(Default)]
pub struct WorkerSet {
    workers: Mutex<Vec<WorkerEntry>>,
    /// Every status ever spawned; outlives the join.
    statuses: Mutex<Vec<Arc<WorkerStatus>>>,
}

impl WorkerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a worker on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<F, Fut>(&self, stage: &str, position: usize, task: F)
    where
        F: FnOnce(Arc<WorkerStatus>) -> Fut,
        Fut: Future<Output = StageReport> + Send + 'static,
    {
        let status = Arc::new(WorkerStatus::new(stage, position));
        let handle = tokio::spawn(task(Arc::clone(&status)));
        self.statuses.lock().push(Arc::clone(&status));
        self.workers.lock().push(WorkerEntry { status, handle });
    }

    /// Number of workers not yet joined.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    /// Returns true if no workers are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }

    /// Current state of every worker spawned so far, ordered by position.
    ///
    /// Joined workers stay listed.
    #[must_use]
    pub fn states(&self) -> Vec<(String, WorkerState)> {
        let mut statuses = self.statuses.lock().clone();
        statuses.sort_by_key(|status| status.position());
        statuses
            .iter()
            .map(|status| (status.stage().to_string(), status.state()))
            .collect()
    }

    /// Waits for every worker to finish.
    ///
    /// Returns the reports ordered by position, or the first failure: a
    /// panicked worker, a halted stage, or cancellation. With a timeout,
    /// workers still running when it fires are cancelled and aborted.
    pub async fn join_all(
        &self,
        token: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<Vec<StageReport>, PipelineError> {
        let entries: Vec<WorkerEntry> = std::mem::take(&mut *self.workers.lock());
        let abort_handles: Vec<_> = entries.iter().map(|e| e.handle.abort_handle()).collect();

        let joined = join_entries(entries, token);
        let (mut reports, first_error) = match timeout {
            Some(limit) => {
                if let Ok(joined) = tokio::time::timeout(limit, joined).await {
                    joined
                } else {
                    let pending = abort_handles.iter().filter(|h| !h.is_finished()).count();
                    warn!(pending, "Worker join timed out, aborting");
                    token.cancel("join timeout");
                    for handle in &abort_handles {
                        handle.abort();
                    }
                    return Err(PipelineError::JoinTimeout {
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        pending,
                    });
                }
            }
            None => joined.await,
        };

        reports.sort_by_key(|report| report.position);

        if let Some(error) = first_error {
            return Err(error);
        }
        if reports.iter().any(|r| r.outcome == StageOutcome::Cancelled) {
            let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
            return Err(PipelineError::Cancelled(reason));
        }
        Ok(reports)
    }
}

impl std::fmt::Debug for WorkerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSet")
            .field("pending", &self.len())
            .finish()
    }
}

async fn join_entries(
    entries: Vec<WorkerEntry>,
    token: &CancellationToken,
) -> (Vec<StageReport>, Option<PipelineError>) {
    let mut reports = Vec::with_capacity(entries.len());
    let mut first_error: Option<PipelineError> = None;

    for WorkerEntry { status, handle } in entries {
        match handle.await {
            Ok(report) => {
                debug!(stage = %report.stage, outcome = ?report.outcome, "Worker joined");
                if first_error.is_none() && report.outcome == StageOutcome::Halted {
                    if let Some(ref error) = report.error {
                        first_error = Some(error.clone().into());
                    }
                }
                reports.push(report);
            }
            Err(join_error) => {
                status.transition(WorkerState::Closed);
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    join_error.to_string()
                };
                warn!(stage = %status.stage(), "Worker failed: {}", message);

                if first_error.is_none() {
                    token.cancel(format!("worker for stage '{}' failed", status.stage()));
                    first_error = Some(PipelineError::worker_panicked(status.stage(), message));
                }
            }
        }
    }

    (reports, first_error)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
