use std::process::ExitCode;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::time::{Duration, sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fanout_core::{BoxError, BoxTask, FanoutError, JobStats, Runner, Task};

const DEFAULT_FILTER: &str = "fanout_core=info,fanout_cli=info";

/// Batch file: `{"name": "...", "parallelism": 4, "tasks": [{"label": "a", "sleep_ms": 10}]}`
#[derive(Debug, Deserialize)]
struct Batch {
    name: String,
    #[serde(default)]
    parallelism: Option<usize>,
    tasks: Vec<SimulatedSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct SimulatedSpec {
    label: String,
    #[serde(default)]
    sleep_ms: u64,
    #[serde(default)]
    fail: bool,
}

/// Sleeps, then succeeds or fails as configured.
struct SimulatedTask {
    spec: SimulatedSpec,
}

#[async_trait]
impl Task for SimulatedTask {
    async fn call(self: Box<Self>) -> Result<(), BoxError> {
        sleep(Duration::from_millis(self.spec.sleep_ms)).await;
        if self.spec.fail {
            return Err(format!("simulated failure: {}", self.spec.label).into());
        }
        info!(label = %self.spec.label, "task done");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    #[serde(flatten)]
    stats: JobStats,
    errors: Vec<String>,
}

async fn run_batch(runner: &Runner, batch: Batch) -> Result<Summary, FanoutError> {
    let tasks: Vec<BoxTask> = batch
        .tasks
        .into_iter()
        .map(|spec| Box::new(SimulatedTask { spec }) as BoxTask)
        .collect();

    match runner
        .run_with_stats(batch.name, tasks, batch.parallelism)
        .await
    {
        Ok(stats) => Ok(Summary {
            stats,
            errors: Vec::new(),
        }),
        Err(FanoutError::AggregateTaskFailure(agg)) => Ok(Summary {
            stats: agg.stats(),
            errors: agg.failures().iter().map(ToString::to_string).collect(),
        }),
        Err(err) => Err(err),
    }
}

async fn load_batch(path: Option<String>) -> Result<Batch, BoxError> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("read {path}: {e}"))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let batch = match load_batch(std::env::args().nth(1)).await {
        Ok(batch) => batch,
        Err(e) => {
            eprintln!("invalid batch: {e}");
            return ExitCode::from(2);
        }
    };

    let summary = match run_batch(&Runner::global(), batch).await {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("encode summary: {e}");
            return ExitCode::FAILURE;
        }
    }

    if summary.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::Config;

    fn batch(json: serde_json::Value) -> Batch {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn batch_defaults() {
        let b = batch(serde_json::json!({
            "name": "demo",
            "tasks": [{ "label": "a" }]
        }));
        assert_eq!(b.parallelism, None);
        assert_eq!(b.tasks[0].sleep_ms, 0);
        assert!(!b.tasks[0].fail);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn summary_lists_failures() {
        let runner = Runner::new(Config::with_default_concurrency(4));
        let b = batch(serde_json::json!({
            "name": "demo",
            "parallelism": 2,
            "tasks": [
                { "label": "a", "sleep_ms": 5 },
                { "label": "b", "fail": true },
                { "label": "c", "sleep_ms": 1 }
            ]
        }));

        let summary = run_batch(&runner, b).await.unwrap();

        assert_eq!(summary.stats.tasks, 3);
        assert_eq!(summary.stats.workers, 2);
        assert_eq!(summary.stats.failed, 1);
        assert_eq!(
            summary.errors,
            vec!["task 1 execute failed: simulated failure: b".to_string()]
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["name"], "demo");
        assert!(json.get("elapsed_ms").is_some());
    }

    #[tokio::test]
    async fn empty_batch_is_invalid() {
        let runner = Runner::new(Config::with_default_concurrency(4));
        let b = batch(serde_json::json!({ "name": "demo", "tasks": [] }));

        let err = run_batch(&runner, b).await.unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
