use thiserror::Error;

use emb_core::ComputeError;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid subprocess configuration: {0}")]
    InvalidSpec(String),

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExecError> for ComputeError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::InvalidSpec(_) => ComputeError::Init(e.to_string()),
            ExecError::Spawn { .. } | ExecError::Io(_) => ComputeError::Failed(e.to_string()),
        }
    }
}
