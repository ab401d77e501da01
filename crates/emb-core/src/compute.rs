use thiserror::Error;

use emb_model::{ErrorInfo, ErrorKind};

/// Failure of the external compute collaborator.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("compute failed: {0}")]
    Failed(String),

    #[error("compute initialization failed: {0}")]
    Init(String),
}

impl From<&ComputeError> for ErrorInfo {
    fn from(e: &ComputeError) -> Self {
        let kind = match e {
            ComputeError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ComputeError::Failed(_) | ComputeError::Init(_) => ErrorKind::Compute,
        };
        ErrorInfo::new(kind, e.to_string())
    }
}

/// The expensive, single-instance computation: image bytes in, serialized embedding out.
///
/// Only ever called from the worker thread, one task at a time.
pub trait Compute: Send {
    fn compute(&mut self, payload: &[u8]) -> Result<Vec<u8>, ComputeError>;
}

impl<C: Compute + ?Sized> Compute for Box<C> {
    fn compute(&mut self, payload: &[u8]) -> Result<Vec<u8>, ComputeError> {
        (**self).compute(payload)
    }
}

/// Builds a fresh [`Compute`] each time the worker (re)starts.
///
/// Implemented for any `FnMut() -> Result<C, ComputeError>`.
pub trait ComputeFactory: Send {
    type Output: Compute;

    fn build(&mut self) -> Result<Self::Output, ComputeError>;
}

impl<F, C> ComputeFactory for F
where
    F: FnMut() -> Result<C, ComputeError> + Send,
    C: Compute,
{
    type Output = C;

    fn build(&mut self) -> Result<C, ComputeError> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_maps_to_its_kind() {
        let info = ErrorInfo::from(&ComputeError::UnsupportedFormat("mode P".into()));
        assert_eq!(info.kind, ErrorKind::UnsupportedFormat);
        assert!(info.message.contains("mode P"));
    }

    #[test]
    fn other_failures_map_to_compute() {
        let info = ErrorInfo::from(&ComputeError::Failed("cuda oom".into()));
        assert_eq!(info.kind, ErrorKind::Compute);
    }
}
