use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download failed: {0}")]
    Download(String),

    #[error("timed out after {waited:?}")]
    Timeout { waited: Duration },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("server did not advertise Content-Length")]
    MissingContentLength,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Download(e.to_string())
    }
}
