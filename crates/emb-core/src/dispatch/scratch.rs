use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::warn;

/// A per-request file that is removed when the guard goes out of scope.
#[derive(Debug)]
pub(crate) struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Take ownership of `path`, clearing any leftover from an earlier run.
    pub(crate) fn reserve(path: PathBuf) -> io::Result<Self> {
        remove_if_present(&path)?;
        Ok(Self { path })
    }

    /// Reserve `path` and fill it with `bytes`.
    pub(crate) fn write(path: PathBuf, bytes: &[u8]) -> io::Result<Self> {
        let guard = Self::reserve(path)?;
        fs::write(&guard.path, bytes)?;
        Ok(guard)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = remove_if_present(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove scratch file");
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
