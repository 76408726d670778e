use std::any::Any;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::domain::BoxError;
use crate::observability::JobStats;

/// Errors returned by [`Runner::run`](crate::app::Runner::run) and the adapters.
#[derive(Debug, Error)]
pub enum FanoutError {
    /// Empty job name, empty task list or a zero worker count.
    /// Raised before any worker is spawned.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// One or more tasks failed. Every other task still ran to completion.
    #[error(transparent)]
    AggregateTaskFailure(#[from] AggregateFailure),

    /// The engine itself lost track of its own work (a helper task was cancelled).
    #[error("internal error: {0}")]
    Internal(String),
}

impl FanoutError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    pub fn as_aggregate(&self) -> Option<&AggregateFailure> {
        match self {
            Self::AggregateTaskFailure(agg) => Some(agg),
            Self::InvalidArgument(_) | Self::Internal(_) => None,
        }
    }
}

/// A single task's error, attributed to the task's original index.
#[derive(Debug, Error)]
#[error("task {index} execute failed: {source}")]
pub struct TaskFailure {
    index: usize,
    #[source]
    source: BoxError,
}

impl TaskFailure {
    pub fn new(index: usize, source: BoxError) -> Self {
        Self { index, source }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The error the task itself returned.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

/// Batch-level failure: every task failure of one run, in arrival order.
#[derive(Debug, Error)]
#[error(
    "parallel job {name} failed, time={elapsed:?}, err: {}",
    join_messages(.failures)
)]
pub struct AggregateFailure {
    name: String,
    tasks: usize,
    workers: usize,
    elapsed: Duration,
    failures: Vec<TaskFailure>,
}

impl AggregateFailure {
    pub(crate) fn new(
        name: String,
        tasks: usize,
        workers: usize,
        elapsed: Duration,
        failures: Vec<TaskFailure>,
    ) -> Self {
        Self {
            name,
            tasks,
            workers,
            elapsed,
            failures,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Failures in the order workers reported them. Not sorted by index.
    pub fn failures(&self) -> &[TaskFailure] {
        &self.failures
    }

    /// Indices of the failed tasks, sorted ascending.
    pub fn failed_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.failures.iter().map(TaskFailure::index).collect();
        indices.sort_unstable();
        indices
    }

    pub fn stats(&self) -> JobStats {
        JobStats {
            name: self.name.clone(),
            tasks: self.tasks,
            workers: self.workers,
            failed: self.failures.len(),
            elapsed: self.elapsed,
        }
    }
}

fn join_messages(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Source error of a [`TaskFailure`] for a task that never got to finish.
#[derive(Debug, Error)]
pub enum TaskLost {
    /// Every worker was gone before the dispatcher could hand the task out.
    #[error("task was never dispatched: no worker left to run it")]
    NotDispatched,

    /// The worker running the task terminated.
    #[error("worker terminated abnormally while running the task: {0}")]
    WorkerDied(String),
}

/// Source error of a [`TaskFailure`] when the task panicked instead of
/// returning an error.
#[derive(Debug, Error)]
#[error("task panicked: {message}")]
pub struct TaskPanicked {
    message: String,
}

impl TaskPanicked {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error of [`Runner::map`](crate::app::Runner::map).
///
/// Values of the items that succeeded are kept in `partial` (input order,
/// failed items omitted).
pub struct MapError<V> {
    partial: Vec<V>,
    source: FanoutError,
}

impl<V> MapError<V> {
    pub(crate) fn new(partial: Vec<V>, source: FanoutError) -> Self {
        Self { partial, source }
    }

    pub fn partial(&self) -> &[V] {
        &self.partial
    }

    pub fn error(&self) -> &FanoutError {
        &self.source
    }

    pub fn into_parts(self) -> (Vec<V>, FanoutError) {
        (self.partial, self.source)
    }
}

impl<V> fmt::Debug for MapError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapError")
            .field("partial_len", &self.partial.len())
            .field("source", &self.source)
            .finish()
    }
}

impl<V> fmt::Display for MapError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} partial results kept)",
            self.source,
            self.partial.len()
        )
    }
}

impl<V> std::error::Error for MapError<V> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl<V> From<MapError<V>> for FanoutError {
    fn from(err: MapError<V>) -> Self {
        err.source
    }
}
