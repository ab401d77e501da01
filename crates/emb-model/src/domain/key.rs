use std::{borrow::Borrow, fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

const MAX_KEY_LEN: usize = 200;

/// Identifier correlating a submitted task with its outcome.
///
/// A key must be unique among in-flight requests. It also names the
/// per-request scratch files, so it is restricted to a filename-safe alphabet:
/// ASCII alphanumerics, `-`, `_` and `.` (not leading).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskKey(String);

impl TaskKey {
    /// Validate and wrap a caller-supplied key.
    pub fn new(s: impl Into<String>) -> ModelResult<Self> {
        let s = s.into();
        if let Err(reason) = check(&s) {
            return Err(ModelError::InvalidKey { key: s, reason });
        }
        Ok(Self(s))
    }

    /// Derive a key from an output path by taking its file stem.
    ///
    /// `/storage/embeddings/42.npy` becomes `42`.
    pub fn from_path(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ModelError::UnderivableKey(path.display().to_string()))?;
        Self::new(stem)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn check(s: &str) -> Result<(), &'static str> {
    if s.is_empty() {
        return Err("key is empty");
    }
    if s.len() > MAX_KEY_LEN {
        return Err("key is too long");
    }
    if s.starts_with('.') {
        return Err("key must not start with '.'");
    }
    let ok = s
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if !ok {
        return Err("key contains characters outside [A-Za-z0-9._-]");
    }
    Ok(())
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskKey {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TaskKey {
    type Error = ModelError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TaskKey> for String {
    fn from(k: TaskKey) -> Self {
        k.0
    }
}

impl Borrow<str> for TaskKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}
