use std::path::{Path, PathBuf};

use crate::TaskKey;

/// Raw image bytes handed to the compute collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bytes kept in memory.
    Inline(Vec<u8>),
    /// Bytes spooled to a scratch file while the task waits in the queue.
    Spooled(PathBuf),
}

impl Payload {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Inline(_) => "inline",
            Payload::Spooled(_) => "spooled",
        }
    }
}

/// One unit of compute work.
///
/// Owned by the producer until enqueued, by the worker afterwards.
#[derive(Debug, Clone)]
pub struct Task {
    key: TaskKey,
    payload: Payload,
    artifact_path: PathBuf,
}

impl Task {
    pub fn new(key: TaskKey, payload: Payload, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            key,
            payload,
            artifact_path: artifact_path.into(),
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Where the worker must persist the produced artifact.
    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }
}
