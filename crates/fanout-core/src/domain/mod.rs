//! Domain model: what a task is and what travels between the dispatcher,
//! the workers and the failure collector.

pub mod envelope;
pub mod task;

pub use self::envelope::{FailureRecord, TaskEnvelope};
pub use self::task::{BoxError, BoxTask, Task, blocking, boxed};
