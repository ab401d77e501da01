use thiserror::Error;

use emb_model::{ErrorKind, ModelError, TaskKey};

use crate::error::CoreError;

/// What a producer sees when a submission does not yield an artifact.
///
/// Task failures carry only their [`ErrorKind`]; the diagnostic stays in the server log.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("task key already in flight: {0}")]
    KeyInUse(TaskKey),

    #[error(transparent)]
    InvalidKey(#[from] ModelError),

    #[error("task failed: {kind}")]
    Failed { kind: ErrorKind },

    #[error("scratch file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dispatch unavailable: {0}")]
    Unavailable(String),
}

impl From<CoreError> for DispatchError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::KeyInUse(key) => DispatchError::KeyInUse(key),
            other => DispatchError::Unavailable(other.to_string()),
        }
    }
}
