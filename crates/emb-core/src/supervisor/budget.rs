use std::{fmt, time::Duration};

use emb_model::RestartStrategy;

/// Lifecycle state of a supervised target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// The target is (about to be) running.
    Running,
    /// The target exited abnormally and will be restarted.
    Backoff,
    /// The restart budget is spent; the host process must terminate.
    Exhausted,
}

/// Decision taken after an abnormal exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Restart,
    Exhausted,
}

/// Elapsed-time based restart budget.
///
/// Only fast failures (runs shorter than `min_healthy_runtime`) consume a retry.
/// A long healthy run does not refill the budget; it only avoids spending more of it.
/// With zero retries the target still runs once and its first abnormal exit is terminal.
#[derive(Debug, Clone)]
pub struct RestartBudget {
    retries_remaining: u32,
    min_healthy_runtime: Duration,
    attempts: u32,
    last_error: Option<String>,
    state: SupervisorState,
}

impl RestartBudget {
    pub fn new(strategy: &RestartStrategy) -> Self {
        Self {
            retries_remaining: strategy.retries,
            min_healthy_runtime: strategy.min_healthy_runtime(),
            attempts: 0,
            last_error: None,
            state: SupervisorState::Running,
        }
    }

    /// Mark the start of a new run.
    pub fn start(&mut self) {
        debug_assert_ne!(self.state, SupervisorState::Exhausted);
        self.state = SupervisorState::Running;
        self.attempts += 1;
    }

    /// Account for an abnormal exit after `elapsed` of runtime.
    pub fn record_exit(&mut self, elapsed: Duration, error: impl fmt::Display) -> Transition {
        self.last_error = Some(error.to_string());
        if elapsed < self.min_healthy_runtime {
            self.retries_remaining = self.retries_remaining.saturating_sub(1);
        }

        if self.retries_remaining == 0 {
            self.state = SupervisorState::Exhausted;
            Transition::Exhausted
        } else {
            self.state = SupervisorState::Backoff;
            Transition::Restart
        }
    }

    #[inline]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    #[inline]
    pub fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }

    #[inline]
    pub fn min_healthy_runtime(&self) -> Duration {
        self.min_healthy_runtime
    }

    /// Number of runs started so far.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
