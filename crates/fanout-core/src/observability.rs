use std::time::Duration;

use serde::{Serialize, Serializer};

/// Summary of one finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub name: String,
    pub tasks: usize,
    pub workers: usize,
    pub failed: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl JobStats {
    pub fn succeeded(&self) -> usize {
        self.tasks.saturating_sub(self.failed)
    }
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
}
