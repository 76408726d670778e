//! App - batch execution.
//!
//! # Components
//! - **Job**: the engine (dispatcher, bounded workers, completion watcher, failure aggregation)
//! - **Runner**: input validation and worker-pool sizing, then one `Job` per call
//! - **adapters**: `foreach` / `map` over a sequence of items

pub mod adapters;
pub mod job;
pub mod runner;

pub use self::adapters::{foreach, foreach_named, map, map_named};
pub use self::job::Job;
pub use self::runner::{Runner, run};
