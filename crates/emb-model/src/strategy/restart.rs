use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Restart policy for a supervised worker or listener.
///
/// An exit that happens sooner than `min_healthy_runtime_ms` after start counts as a
/// fast failure and consumes one retry. Exits after a longer healthy run are
/// restarted without consuming budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestartStrategy {
    /// Fast failures tolerated before giving up.
    pub retries: u32,
    /// Runs shorter than this are fast failures.
    pub min_healthy_runtime_ms: u64,
    /// Pause between an abnormal exit and the next start.
    pub backoff_ms: u64,
}

impl RestartStrategy {
    pub const DEFAULT_RETRIES: u32 = 3;
    pub const DEFAULT_MIN_HEALTHY_MS: u64 = 5_000;

    #[inline]
    pub fn min_healthy_runtime(&self) -> Duration {
        Duration::from_millis(self.min_healthy_runtime_ms)
    }

    #[inline]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for RestartStrategy {
    fn default() -> Self {
        Self {
            retries: Self::DEFAULT_RETRIES,
            min_healthy_runtime_ms: Self::DEFAULT_MIN_HEALTHY_MS,
            backoff_ms: 0,
        }
    }
}
