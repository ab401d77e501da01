//! Exactly-once acquisition of a large shared file across cooperating processes.
//!
//! Writers serialize on an advisory `flock(2)` held on a sidecar `<dest>.lock`.
//! Readers that must not take the lock poll the local size against the remote
//! `Content-Length` instead.
mod error;
pub use error::FetchError;

mod lock;
pub use lock::{LockFile, lock_path};

mod acquirer;
pub use acquirer::{ArtifactAcquirer, DEFAULT_POLL_INTERVAL};
