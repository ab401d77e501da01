use thiserror::Error;

use emb_model::TaskKey;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("task key already in flight: {0}")]
    KeyInUse(TaskKey),

    #[error("worker exited abnormally: {0}")]
    WorkerFatal(String),

    #[error("supervisor for '{name}' exhausted its restart budget after {attempts} attempts; last error: {last_error}")]
    SupervisorExhausted {
        name: String,
        attempts: u32,
        last_error: String,
    },
}
