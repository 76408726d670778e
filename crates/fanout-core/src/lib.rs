//! fanout-core
//!
//! Bounded-concurrency execution of a batch of independent tasks.
//!
//! # Modules
//! - **domain**: the `Task` trait and the records that travel through the engine
//!   (`TaskEnvelope`, `FailureRecord`)
//! - **app**: the `Job` engine, the `Runner` entry point and the `foreach` / `map` adapters
//! - **config**: process-wide default concurrency
//! - **error**: `FanoutError` and the per-task / aggregate failure types
//! - **observability**: `JobStats` describing a finished run
//!
//! # Example
//! ```ignore
//! let doubled = fanout_core::map(vec![1, 2, 3], |x: i32| async move {
//!     Ok::<_, fanout_core::BoxError>(x * 2)
//! })
//! .await?;
//! assert_eq!(doubled, vec![2, 4, 6]);
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod observability;

pub use app::{Job, Runner, foreach, foreach_named, map, map_named, run};
pub use config::Config;
pub use domain::{BoxError, BoxTask, FailureRecord, Task, TaskEnvelope, blocking, boxed};
pub use error::{AggregateFailure, FanoutError, MapError, TaskFailure, TaskLost, TaskPanicked};
pub use observability::JobStats;
