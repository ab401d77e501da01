use std::{
    ffi::OsString,
    fs::{File, OpenOptions},
    io,
    os::unix::{fs::OpenOptionsExt, io::AsRawFd},
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::error::FetchError;

/// Sidecar lock path for `dest`: the same path with `.lock` appended.
pub fn lock_path(dest: &Path) -> PathBuf {
    let mut s = OsString::from(dest.as_os_str());
    s.push(".lock");
    PathBuf::from(s)
}

/// Exclusive advisory lock on a file, released on drop.
///
/// The lock belongs to the open file description, so two guards on the same
/// path exclude each other even inside one process.
#[derive(Debug)]
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Block on the blocking pool until the lock on `path` is held.
    pub async fn acquire(path: PathBuf) -> Result<Self, FetchError> {
        tokio::task::spawn_blocking(move || Self::acquire_blocking(path))
            .await
            .map_err(io::Error::other)?
            .map_err(FetchError::from)
    }

    pub fn acquire_blocking(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .mode(0o600)
            .open(&path)?;

        debug!(path = %path.display(), "waiting for lock");
        flock(&file, libc::LOCK_EX)?;
        info!(path = %path.display(), "lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        match flock(&self.file, libc::LOCK_UN) {
            Ok(()) => info!(path = %self.path.display(), "lock released"),
            // Closing the descriptor releases the lock anyway.
            Err(e) => warn!(path = %self.path.display(), error = %e, "unlock failed"),
        }
    }
}

fn flock(file: &File, op: libc::c_int) -> io::Result<()> {
    loop {
        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
