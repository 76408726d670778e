//! Records passed through the engine's channels.

use super::task::{BoxError, BoxTask};
use crate::error::TaskFailure;

/// A task paired with its position in the original sequence.
///
/// The index is only used to attribute failures; it says nothing about the
/// order in which tasks run or finish.
pub struct TaskEnvelope {
    index: usize,
    task: BoxTask,
}

impl TaskEnvelope {
    pub fn new(index: usize, task: BoxTask) -> Self {
        Self { index, task }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn into_parts(self) -> (usize, BoxTask) {
        (self.index, self.task)
    }
}

impl std::fmt::Debug for TaskEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEnvelope")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Emitted by a worker when a task fails. Successful tasks produce nothing.
#[derive(Debug)]
pub struct FailureRecord {
    index: usize,
    error: TaskFailure,
}

impl FailureRecord {
    /// Wrap a task's error with the index it was dispatched under.
    pub fn new(index: usize, source: BoxError) -> Self {
        Self {
            index,
            error: TaskFailure::new(index, source),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn error(&self) -> &TaskFailure {
        &self.error
    }

    pub fn into_failure(self) -> TaskFailure {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::boxed;

    #[test]
    fn failure_record_attributes_error_to_index() {
        let record = FailureRecord::new(4, "connection reset".into());

        assert_eq!(record.index(), 4);
        assert_eq!(record.error().index(), 4);
        assert_eq!(
            record.into_failure().to_string(),
            "task 4 execute failed: connection reset"
        );
    }

    #[test]
    fn envelope_keeps_index() {
        let envelope = TaskEnvelope::new(2, boxed(|| async { Ok::<(), BoxError>(()) }));
        assert_eq!(envelope.index(), 2);
        assert!(format!("{envelope:?}").contains("index: 2"));

        let (index, _task) = envelope.into_parts();
        assert_eq!(index, 2);
    }
}
