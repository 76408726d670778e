//! Runner - validates a batch, sizes the worker pool and runs a [`Job`].

use crate::config::Config;
use crate::domain::BoxTask;
use crate::error::FanoutError;
use crate::observability::JobStats;

use super::job::Job;

/// Entry point for running batches.
///
/// Holds only the injected [`Config`]; every call builds and runs its own
/// [`Job`], so a `Runner` can be shared and reused freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Runner {
    config: Config,
}

impl Runner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runner backed by [`Config::global`].
    pub fn global() -> Self {
        Self::new(*Config::global())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Effective worker count:
    /// `min(default_concurrency, task_count, requested)`.
    ///
    /// `requested == Some(0)` is rejected. The result is always at least 1
    /// for a non-empty batch.
    pub fn parallelism(
        &self,
        task_count: usize,
        requested: Option<usize>,
    ) -> Result<usize, FanoutError> {
        if requested == Some(0) {
            return Err(FanoutError::invalid("parallelism must be at least 1"));
        }
        let n = self
            .config
            .default_concurrency()
            .min(task_count)
            .min(requested.unwrap_or(usize::MAX));
        Ok(n.max(1))
    }

    /// Run `tasks` with at most `parallelism` workers (default concurrency when
    /// `None`). Returns `Ok(())` only when every task succeeded.
    pub async fn run(
        &self,
        name: impl Into<String>,
        tasks: Vec<BoxTask>,
        parallelism: Option<usize>,
    ) -> Result<(), FanoutError> {
        self.run_with_stats(name, tasks, parallelism).await.map(|_| ())
    }

    /// Same as [`run`](Self::run), returning the run's statistics on success.
    pub async fn run_with_stats(
        &self,
        name: impl Into<String>,
        tasks: Vec<BoxTask>,
        parallelism: Option<usize>,
    ) -> Result<JobStats, FanoutError> {
        let name = name.into();
        if name.is_empty() {
            return Err(FanoutError::invalid("job name is empty"));
        }
        if tasks.is_empty() {
            return Err(FanoutError::invalid("task list is empty"));
        }
        let parallelism = self.parallelism(tasks.len(), parallelism)?;

        Job::new(name, tasks, parallelism).run().await
    }
}

/// [`Runner::run`] on the global runner.
pub async fn run(
    name: impl Into<String>,
    tasks: Vec<BoxTask>,
    parallelism: Option<usize>,
) -> Result<(), FanoutError> {
    Runner::global().run(name, tasks, parallelism).await
}
