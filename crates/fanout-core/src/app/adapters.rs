//! `foreach` / `map`: run a function over every item of a sequence.
//!
//! Both build one task per item (the item is moved into its task) and run
//! them through [`Runner::run`] with the runner's default concurrency.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::domain::{BoxError, BoxTask, boxed};
use crate::error::{FanoutError, MapError};

use super::runner::Runner;

const FOREACH_NAME: &str = "foreach";

impl Runner {
    /// Call `f` on every item concurrently. Only errors are kept.
    pub async fn foreach<T, F, Fut, E>(
        &self,
        items: impl IntoIterator<Item = T>,
        f: F,
    ) -> Result<(), FanoutError>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.foreach_named(FOREACH_NAME, items, f).await
    }

    /// [`foreach`](Self::foreach) with a job name for the logs.
    pub async fn foreach_named<T, F, Fut, E>(
        &self,
        name: &str,
        items: impl IntoIterator<Item = T>,
        f: F,
    ) -> Result<(), FanoutError>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let f = Arc::new(f);
        let tasks: Vec<BoxTask> = items
            .into_iter()
            .map(|item| {
                let f = Arc::clone(&f);
                boxed(move || f(item))
            })
            .collect();

        self.run(name, tasks, Some(self.config().default_concurrency()))
            .await
    }

    /// Call `f` on every item concurrently and collect the values.
    ///
    /// Values come back in input order, regardless of completion order.
    /// When some items fail, the error keeps the values of the items that
    /// succeeded (see [`MapError::into_parts`]).
    pub async fn map<T, V, F, Fut, E>(
        &self,
        items: impl IntoIterator<Item = T>,
        f: F,
    ) -> Result<Vec<V>, MapError<V>>
    where
        T: Send + 'static,
        V: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.map_named(std::any::type_name::<F>(), items, f).await
    }

    /// [`map`](Self::map) with a job name for the logs.
    pub async fn map_named<T, V, F, Fut, E>(
        &self,
        name: &str,
        items: impl IntoIterator<Item = T>,
        f: F,
    ) -> Result<Vec<V>, MapError<V>>
    where
        T: Send + 'static,
        V: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return Err(MapError::new(
                Vec::new(),
                FanoutError::invalid("item list is empty"),
            ));
        }
        let total = items.len();

        // capacity covers every item, so a task never waits on the collector
        let (result_tx, mut result_rx) = mpsc::channel::<(usize, V)>(total);
        let f = Arc::new(f);
        let tasks: Vec<BoxTask> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let f = Arc::clone(&f);
                let results = result_tx.clone();
                boxed(move || async move {
                    let value = f(item).await.map_err(Into::<BoxError>::into)?;
                    results
                        .send((index, value))
                        .await
                        .map_err(|_| BoxError::from("map result collector is gone"))
                })
            })
            .collect();
        // only the tasks hold senders now: the channel closes once the last one is done
        drop(result_tx);

        let collector = tokio::spawn(async move {
            let mut slots: Vec<Option<V>> = (0..total).map(|_| None).collect();
            while let Some((index, value)) = result_rx.recv().await {
                slots[index] = Some(value);
            }
            slots.into_iter().flatten().collect::<Vec<V>>()
        });

        let outcome = self
            .run(
                format!("parallel map {name}"),
                tasks,
                Some(self.config().default_concurrency()),
            )
            .await;

        let values = match collected(collector.await) {
            Ok(values) => values,
            Err(err) => return Err(MapError::new(Vec::new(), err)),
        };

        match outcome {
            Ok(()) => Ok(values),
            Err(source) => Err(MapError::new(values, source)),
        }
    }
}

/// Result of joining the map collector. A collector panic is resumed here.
fn collected<V>(joined: Result<Vec<V>, JoinError>) -> Result<Vec<V>, FanoutError> {
    match joined {
        Ok(values) => Ok(values),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => Err(FanoutError::Internal(format!(
            "map result collector did not finish: {err}"
        ))),
    }
}

/// [`Runner::foreach`] on the global runner.
pub async fn foreach<T, F, Fut, E>(
    items: impl IntoIterator<Item = T>,
    f: F,
) -> Result<(), FanoutError>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    Runner::global().foreach(items, f).await
}

/// [`Runner::foreach_named`] on the global runner.
pub async fn foreach_named<T, F, Fut, E>(
    name: &str,
    items: impl IntoIterator<Item = T>,
    f: F,
) -> Result<(), FanoutError>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    Runner::global().foreach_named(name, items, f).await
}

/// [`Runner::map`] on the global runner.
pub async fn map<T, V, F, Fut, E>(
    items: impl IntoIterator<Item = T>,
    f: F,
) -> Result<Vec<V>, MapError<V>>
where
    T: Send + 'static,
    V: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    Runner::global().map(items, f).await
}

/// [`Runner::map_named`] on the global runner.
pub async fn map_named<T, V, F, Fut, E>(
    name: &str,
    items: impl IntoIterator<Item = T>,
    f: F,
) -> Result<Vec<V>, MapError<V>>
where
    T: Send + 'static,
    V: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    Runner::global().map_named(name, items, f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn runner() -> Runner {
        Runner::new(Config::with_default_concurrency(4))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn foreach_all_ok() {
        let result = runner()
            .foreach(vec!["a", "b", "c"], |_s| async { Ok::<(), BoxError>(()) })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn foreach_reports_failing_item_and_runs_the_rest() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let err = runner()
            .foreach(vec![1, 2, 3], move |x: i32| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if x == 2 {
                        return Err(format!("item {x} rejected"));
                    }
                    Ok(())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(err.as_aggregate().unwrap().failed_indices(), vec![1]);
        assert!(err.to_string().contains("task 1 execute failed: item 2 rejected"));
        assert!(err.to_string().contains("parallel job foreach failed"));
    }

    #[tokio::test]
    async fn foreach_rejects_empty_input() {
        let err = runner()
            .foreach(Vec::<u8>::new(), |_| async { Ok::<(), BoxError>(()) })
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn foreach_named_uses_name() {
        let err = runner()
            .foreach_named("uploads", vec![1], |_| async { Err::<(), _>("quota") })
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("parallel job uploads failed"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn map_doubles() {
        let values = runner()
            .map(vec![1, 2, 3], |x: i32| async move { Ok::<_, BoxError>(x * 2) })
            .await
            .unwrap();

        let set: HashSet<i32> = values.iter().copied().collect();
        assert_eq!(set, HashSet::from([2, 4, 6]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn map_keeps_input_order_when_completion_order_differs() {
        let items: Vec<u64> = (0..8).collect();

        let values = runner()
            .map(items.clone(), |x: u64| async move {
                // later items finish first
                tokio::time::sleep(Duration::from_millis((8 - x) * 15)).await;
                Ok::<_, BoxError>(format!("v{x}"))
            })
            .await
            .unwrap();

        let expected: Vec<String> = items.iter().map(|x| format!("v{x}")).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn map_keeps_partial_results_on_failure() {
        let err = runner()
            .map_named("halve", vec![2, 3, 6], |x: i32| async move {
                if x % 2 == 1 {
                    return Err(format!("{x} is odd"));
                }
                Ok(x / 2)
            })
            .await
            .unwrap_err();

        assert_eq!(err.partial(), &[1, 3]);
        let (partial, source) = err.into_parts();
        assert_eq!(partial, vec![1, 3]);
        assert_eq!(source.as_aggregate().unwrap().failed_indices(), vec![1]);
        assert!(source.to_string().contains("parallel job parallel map halve failed"));
    }

    #[tokio::test]
    async fn map_rejects_empty_input() {
        let err = runner()
            .map(Vec::<i32>::new(), |x| async move { Ok::<_, BoxError>(x) })
            .await
            .unwrap_err();

        assert!(err.partial().is_empty());
        assert!(err.error().is_invalid_argument());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn free_functions_use_global_runner() {
        foreach(vec![1, 2], |_| async { Ok::<(), BoxError>(()) })
            .await
            .unwrap();

        let values = map(vec!["x", "y"], |s: &'static str| async move {
            Ok::<_, BoxError>(s.to_uppercase())
        })
        .await
        .unwrap();
        assert_eq!(values, vec!["X".to_string(), "Y".to_string()]);

        foreach_named("named", vec![()], |_| async { Ok::<(), BoxError>(()) })
            .await
            .unwrap();
        let single = map_named("named", vec![5], |x: i32| async move { Ok::<_, BoxError>(x) })
            .await
            .unwrap();
        assert_eq!(single, vec![5]);
    }

    #[tokio::test]
    async fn cancelled_collector_is_an_error() {
        let handle = tokio::spawn(std::future::pending::<Vec<i32>>());
        handle.abort();

        let err = collected(handle.await).unwrap_err();

        assert!(matches!(err, FanoutError::Internal(_)));
        assert!(err.to_string().contains("map result collector did not finish"));
    }
}
