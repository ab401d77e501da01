//! Bounded restart of long-running targets.
//!
//! A [`Supervised`] target runs on the calling thread until it returns. A return
//! after shutdown was requested is a clean stop; anything else (an error, an
//! unexpected `Ok`, a panic) is an abnormal exit accounted against the
//! [`RestartBudget`]. When the budget is spent the supervisor returns
//! [`CoreError::SupervisorExhausted`] and the host is expected to terminate.
mod budget;
pub use budget::{RestartBudget, SupervisorState, Transition};

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    thread,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use emb_model::RestartStrategy;

use crate::{
    error::CoreError,
    metrics::{MetricsHandle, noop_metrics},
};

const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// A blocking unit of work the [`Supervisor`] can restart.
pub trait Supervised: Send {
    /// Name used in logs, metrics and the exhaustion error.
    fn name(&self) -> &str;

    /// Run until shutdown (`Ok`) or an abnormal exit (`Err`).
    fn run(&mut self) -> Result<(), CoreError>;
}

pub struct Supervisor<S> {
    target: S,
    budget: RestartBudget,
    backoff: Duration,
    shutdown: CancellationToken,
    metrics: MetricsHandle,
}

impl<S: Supervised> Supervisor<S> {
    pub fn new(target: S, strategy: RestartStrategy, shutdown: CancellationToken) -> Self {
        Self {
            target,
            budget: RestartBudget::new(&strategy),
            backoff: strategy.backoff(),
            shutdown,
            metrics: noop_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn budget(&self) -> &RestartBudget {
        &self.budget
    }

    /// Drive the target until clean shutdown or budget exhaustion. Blocks the calling thread.
    pub fn run(mut self) -> Result<(), CoreError> {
        let name = self.target.name().to_string();

        while self.budget.state() != SupervisorState::Exhausted {
            self.budget.start();
            info!(
                supervised = %name,
                attempt = self.budget.attempts(),
                retries_remaining = self.budget.retries_remaining(),
                "starting"
            );

            let started = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(|| self.target.run()));
            let elapsed = started.elapsed();

            if self.shutdown.is_cancelled() {
                info!(supervised = %name, "stopped on shutdown");
                return Ok(());
            }

            let err = match result {
                Ok(Ok(())) => CoreError::WorkerFatal("returned while no shutdown was requested".into()),
                Ok(Err(e)) => e,
                Err(payload) => CoreError::WorkerFatal(format!("panicked: {}", panic_message(&*payload))),
            };

            match self.budget.record_exit(elapsed, &err) {
                Transition::Restart => {
                    warn!(
                        supervised = %name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        retries_remaining = self.budget.retries_remaining(),
                        error = %err,
                        "exited abnormally; restarting"
                    );
                    self.metrics.record_restart(&name);
                    if self.pause() {
                        info!(supervised = %name, "shutdown requested during backoff");
                        return Ok(());
                    }
                }
                Transition::Exhausted => {
                    error!(
                        supervised = %name,
                        attempts = self.budget.attempts(),
                        error = %err,
                        "restart budget exhausted"
                    );
                }
            }
        }

        Err(CoreError::SupervisorExhausted {
            name,
            attempts: self.budget.attempts(),
            last_error: self.budget.last_error().unwrap_or("none").to_string(),
        })
    }

    /// Sleep out the backoff in small slices. Returns `true` if shutdown was requested.
    ///
    /// A backoff too large to represent as a deadline waits for shutdown only.
    fn pause(&self) -> bool {
        let deadline = Instant::now().checked_add(self.backoff);
        loop {
            if self.shutdown.is_cancelled() {
                return true;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    PAUSE_SLICE.min(deadline - now)
                }
                None => PAUSE_SLICE,
            };
            thread::sleep(slice);
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
