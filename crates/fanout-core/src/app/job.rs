//! Job - one bounded-parallel batch run.
//!
//! # Flow
//! 1. dispatcher pushes `TaskEnvelope`s in original order into a channel of
//!    capacity `parallelism`, then drops its sender (workers' stop signal)
//! 2. `parallelism` workers pull envelopes first-come-first-served, run them and
//!    send a `FailureRecord` for every error or panic
//! 3. the watcher joins every worker, then drops the last failure sender
//! 4. the caller drains the failure channel until it closes and aggregates
//!
//! Work that never ran (envelopes the dispatcher could not hand out, a task
//! lost with its worker) is reported as a failure too, so a run only succeeds
//! when every task ran and returned `Ok`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{BoxError, BoxTask, FailureRecord, TaskEnvelope};
use crate::error::{AggregateFailure, FanoutError, TaskLost, TaskPanicked};
use crate::observability::JobStats;

/// Marks a worker slot with no task running.
const IDLE: usize = usize::MAX;

/// Index of the task each worker is running, `IDLE` otherwise.
type InFlight = Arc<[AtomicUsize]>;

/// A named batch of tasks and the number of workers that will run it.
///
/// Built fresh by [`Runner`](super::Runner) for every call, run once and
/// dropped. Invariant: `1 <= parallelism <= tasks.len()`.
pub struct Job {
    name: String,
    tasks: Vec<BoxTask>,
    parallelism: usize,
}

impl Job {
    pub(crate) fn new(name: String, tasks: Vec<BoxTask>, parallelism: usize) -> Self {
        debug_assert!(!tasks.is_empty(), "a job needs at least one task");
        debug_assert!(
            (1..=tasks.len()).contains(&parallelism),
            "parallelism {parallelism} out of range for {} tasks",
            tasks.len()
        );
        Self {
            name,
            tasks,
            parallelism,
        }
    }

    /// Run every task and wait for all of them.
    ///
    /// A failing task never stops its siblings. Returns
    /// [`FanoutError::AggregateTaskFailure`] when at least one task failed.
    pub async fn run(self) -> Result<JobStats, FanoutError> {
        let start = Instant::now();
        let Job {
            name,
            tasks,
            parallelism,
        } = self;
        let total = tasks.len();
        info!(job = %name, tasks = total, workers = parallelism, "start parallel job");

        let (task_tx, task_rx) = async_channel::bounded::<TaskEnvelope>(parallelism);
        // one slot per task: every task reports at most one failure, so no sender blocks
        let (failure_tx, mut failure_rx) = mpsc::channel::<FailureRecord>(total);

        let dispatcher = tokio::spawn(dispatch(tasks, task_tx, failure_tx.clone()));

        let in_flight: InFlight = (0..parallelism).map(|_| AtomicUsize::new(IDLE)).collect();
        let workers: Vec<JoinHandle<usize>> = (0..parallelism)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    task_rx.clone(),
                    failure_tx.clone(),
                    Arc::clone(&in_flight),
                ))
            })
            .collect();
        drop(task_rx);

        let watcher = tokio::spawn(watch_completion(workers, in_flight, failure_tx));

        let mut failures = Vec::new();
        while let Some(record) = failure_rx.recv().await {
            failures.push(record.into_failure());
        }

        match watcher.await {
            Ok(executed) => debug!(job = %name, executed, "all workers finished"),
            Err(err) => error!(job = %name, error = %err, "completion watcher failed"),
        }
        if let Err(err) = dispatcher.await {
            error!(job = %name, error = %err, "dispatcher failed");
        }

        let elapsed = start.elapsed();
        if failures.is_empty() {
            info!(job = %name, ?elapsed, "parallel job finished");
            return Ok(JobStats {
                name,
                tasks: total,
                workers: parallelism,
                failed: 0,
                elapsed,
            });
        }

        warn!(job = %name, failed = failures.len(), ?elapsed, "parallel job failed");
        Err(AggregateFailure::new(name, total, parallelism, elapsed, failures).into())
    }
}

/// Feed envelopes in original order. Dropping `tx` on return closes the channel.
///
/// If every worker is gone before the last envelope is sent, each task that
/// was not handed out is reported as a failure.
async fn dispatch(
    tasks: Vec<BoxTask>,
    tx: async_channel::Sender<TaskEnvelope>,
    failures: mpsc::Sender<FailureRecord>,
) {
    let mut undispatched = Vec::new();
    let mut pending = tasks.into_iter().enumerate();
    while let Some((index, task)) = pending.next() {
        if let Err(err) = tx.send(TaskEnvelope::new(index, task)).await {
            warn!(index, "dispatch channel closed before all tasks were sent");
            undispatched.push(err.into_inner().index());
            undispatched.extend(pending.by_ref().map(|(index, _)| index));
            break;
        }
    }
    drop(tx);

    for index in undispatched {
        let record = FailureRecord::new(index, Box::new(TaskLost::NotDispatched));
        if failures.send(record).await.is_err() {
            error!(index, "failure channel closed, dropping failure");
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: async_channel::Receiver<TaskEnvelope>,
    failures: mpsc::Sender<FailureRecord>,
    in_flight: InFlight,
) -> usize {
    let mut executed = 0;
    while let Ok(envelope) = queue.recv().await {
        let (index, task) = envelope.into_parts();
        executed += 1;
        in_flight[worker_id].store(index, Ordering::Release);
        let result = execute(task).await;
        in_flight[worker_id].store(IDLE, Ordering::Release);

        if let Err(source) = result {
            debug!(worker_id, index, error = %source, "task failed");
            if failures.send(FailureRecord::new(index, source)).await.is_err() {
                error!(worker_id, index, "failure channel closed, dropping failure");
            }
        }
    }
    debug!(worker_id, executed, "worker drained dispatch channel");
    executed
}

/// Run one task, turning a panic into an error.
///
/// `call` itself runs inside the guarded future, so a task that panics before
/// returning its future is caught as well.
async fn execute(task: BoxTask) -> Result<(), BoxError> {
    match AssertUnwindSafe(async move { task.call().await })
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => Err(Box::new(TaskPanicked::from_payload(payload))),
    }
}

/// Wait for every worker, then drop the last failure sender so the collector
/// sees the channel close. A task that was running on a worker that died is
/// reported as failed. Returns how many tasks the surviving workers executed.
async fn watch_completion(
    workers: Vec<JoinHandle<usize>>,
    in_flight: InFlight,
    failures: mpsc::Sender<FailureRecord>,
) -> usize {
    let mut executed = 0;
    for (worker_id, worker) in workers.into_iter().enumerate() {
        match worker.await {
            Ok(n) => executed += n,
            Err(err) => {
                error!(worker_id, error = %err, "worker terminated abnormally");
                let index = in_flight[worker_id].load(Ordering::Acquire);
                if index == IDLE {
                    continue;
                }
                let source = Box::new(TaskLost::WorkerDied(err.to_string()));
                if failures.send(FailureRecord::new(index, source)).await.is_err() {
                    error!(worker_id, index, "failure channel closed, dropping failure");
                }
            }
        }
    }
    drop(failures);
    executed
}
