//! Process-wide configuration.
//!
//! The default worker count is derived once per process and never changes.
//! Code that needs a different value builds its own [`Config`] and hands it to
//! a [`Runner`](crate::app::Runner).

use std::num::NonZeroUsize;
use std::sync::OnceLock;

/// Environment variable overriding the detected hardware concurrency.
pub const CONCURRENCY_ENV: &str = "FANOUT_DEFAULT_CONCURRENCY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    default_concurrency: usize,
}

impl Config {
    /// Explicit config. A zero concurrency is raised to 1.
    pub fn with_default_concurrency(n: usize) -> Self {
        Self {
            default_concurrency: n.max(1),
        }
    }

    /// `FANOUT_DEFAULT_CONCURRENCY` when it holds a positive integer,
    /// otherwise the number of available hardware threads.
    pub fn detect() -> Self {
        Self::from_override(std::env::var(CONCURRENCY_ENV).ok().as_deref())
    }

    fn from_override(raw: Option<&str>) -> Self {
        let n = raw
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or_else(hardware_concurrency);
        Self::with_default_concurrency(n)
    }

    /// The process-wide config, detected on first use.
    pub fn global() -> &'static Config {
        static GLOBAL: OnceLock<Config> = OnceLock::new();
        GLOBAL.get_or_init(Config::detect)
    }

    pub fn default_concurrency(&self) -> usize {
        self.default_concurrency
    }
}

impl Default for Config {
    fn default() -> Self {
        *Self::global()
    }
}

fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
