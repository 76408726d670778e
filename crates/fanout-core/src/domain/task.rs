//! Task - a zero-argument unit of work that either succeeds or fails.

use std::future::Future;

use async_trait::async_trait;

/// Error type returned by tasks. Anything convertible into it (`String`,
/// `&str`, any `std::error::Error + Send + Sync`) can be returned from a task.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Owned, type-erased task as stored in a job.
pub type BoxTask = Box<dyn Task>;

/// A unit of work scheduled by a [`Job`](crate::app::Job).
///
/// The engine never looks inside a task: it calls it exactly once and only
/// cares whether it returned an error.
///
/// Closures are tasks through a blanket impl, so the usual way to build one is
/// to move the task's payload into an `async move` block:
///
/// ```ignore
/// let url = url.clone();
/// let task = fanout_core::boxed(move || async move { fetch(&url).await });
/// ```
///
/// Types with more state can implement the trait directly.
#[async_trait]
pub trait Task: Send + 'static {
    async fn call(self: Box<Self>) -> Result<(), BoxError>;
}

#[async_trait]
impl<F, Fut, E> Task for F
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn call(self: Box<Self>) -> Result<(), BoxError> {
        (*self)().await.map_err(Into::into)
    }
}

/// Box a task for use in [`Runner::run`](crate::app::Runner::run).
pub fn boxed<T: Task>(task: T) -> BoxTask {
    Box::new(task)
}

/// Wrap a synchronous closure so it runs on tokio's blocking pool instead of
/// occupying a runtime worker thread.
///
/// A panic inside `f` is resumed on the calling task, so the engine reports it
/// like any other task panic.
pub fn blocking<F, E>(f: F) -> impl Task
where
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    move || async move {
        match tokio::task::spawn_blocking(f).await {
            Ok(result) => result.map_err(Into::into),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(BoxError::from(err.to_string())),
        }
    }
}
