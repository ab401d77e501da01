use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TaskKey;

/// Category of a per-task failure.
///
/// This is the only failure detail that crosses the dispatch boundary back to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Input could not be turned into a 3-channel color image.
    UnsupportedFormat,
    /// The compute collaborator failed.
    Compute,
    /// Reading the payload or persisting the artifact failed.
    Io,
    /// The compute collaborator panicked.
    Panicked,
}

impl ErrorKind {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::Compute => "compute",
            ErrorKind::Io => "io",
            ErrorKind::Panicked => "panicked",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Failure details recorded by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    /// Server-side diagnostic; never returned to callers.
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of processing one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    key: TaskKey,
    error: Option<ErrorInfo>,
}

impl Outcome {
    pub fn succeeded(key: TaskKey) -> Self {
        Self { key, error: None }
    }

    pub fn failed(key: TaskKey, error: ErrorInfo) -> Self {
        Self {
            key,
            error: Some(error),
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    #[inline]
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    /// Metrics label: `success` or the failure kind.
    pub fn as_label(&self) -> &'static str {
        match &self.error {
            None => "success",
            Some(e) => e.kind.as_label(),
        }
    }

    pub fn into_result(self) -> Result<TaskKey, (TaskKey, ErrorInfo)> {
        match self.error {
            None => Ok(self.key),
            Some(e) => Err((self.key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> TaskKey {
        TaskKey::new(s).unwrap()
    }

    #[test]
    fn succeeded_has_no_error() {
        let o = Outcome::succeeded(key("a"));
        assert!(o.success());
        assert!(o.error().is_none());
        assert_eq!(o.as_label(), "success");
    }

    #[test]
    fn failed_carries_kind_and_message() {
        let o = Outcome::failed(
            key("b"),
            ErrorInfo::new(ErrorKind::UnsupportedFormat, "mode CMYK"),
        );
        assert!(!o.success());
        assert_eq!(o.as_label(), "unsupported_format");

        let (k, info) = o.into_result().unwrap_err();
        assert_eq!(k.as_str(), "b");
        assert_eq!(info.to_string(), "unsupported_format: mode CMYK");
    }

    #[test]
    fn error_kind_serializes_camel_case() {
        let json = serde_json::to_string(&ErrorKind::UnsupportedFormat).unwrap();
        assert_eq!(json, r#""unsupportedFormat""#);
    }
}
