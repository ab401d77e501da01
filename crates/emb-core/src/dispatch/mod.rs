//! Synchronous entry point for producers.
mod error;
pub use error::DispatchError;

mod scratch;
use scratch::ScratchFile;

use std::{env, fs, path::Path, path::PathBuf};

use tracing::{debug, instrument, warn};

use emb_model::{Payload, TaskKey};

use crate::context::DispatchContext;

/// Payloads above this size are spooled to disk while queued.
pub const DEFAULT_SPOOL_THRESHOLD: usize = 512 * 1024;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Directory for per-request scratch files.
    pub work_dir: PathBuf,
    /// Extension of the artifact scratch file.
    pub artifact_ext: String,
    pub spool_threshold: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            work_dir: env::temp_dir(),
            artifact_ext: "npy".to_string(),
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
        }
    }
}

/// Bridges many concurrent callers onto the single worker.
///
/// Each call blocks its thread until the worker has produced the outcome for
/// its key.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    ctx: DispatchContext,
    cfg: DispatchConfig,
}

impl Dispatcher {
    pub fn new(ctx: DispatchContext, cfg: DispatchConfig) -> Self {
        Self { ctx, cfg }
    }

    pub fn context(&self) -> &DispatchContext {
        &self.ctx
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.cfg
    }

    /// Run `payload` through the worker under `key` and return the artifact bytes.
    #[instrument(level = "debug", skip(self, payload), fields(key = %key, bytes = payload.len()))]
    pub fn submit(&self, key: TaskKey, payload: Vec<u8>) -> Result<Vec<u8>, DispatchError> {
        let claim = self.ctx.registry().claim(key)?;
        let key = claim.key().clone();

        let artifact = ScratchFile::reserve(self.scratch_path(&key, &self.cfg.artifact_ext))?;
        let (payload, _spool) = if payload.len() > self.cfg.spool_threshold {
            let spool = ScratchFile::write(self.scratch_path(&key, "binary"), &payload)?;
            (Payload::Spooled(spool.path().to_path_buf()), Some(spool))
        } else {
            (Payload::Inline(payload), None)
        };
        debug!(payload = payload.kind(), "enqueueing task");

        let pending = claim.submit(self.ctx.queue(), payload, artifact.path());
        self.ctx.metrics().set_queue_depth(self.ctx.queue().len());

        let outcome = pending.wait();
        if let Some(info) = outcome.error() {
            warn!(kind = %info.kind, error = %info.message, "task failed");
            return Err(DispatchError::Failed { kind: info.kind });
        }

        Ok(fs::read(artifact.path())?)
    }

    /// Like [`Dispatcher::submit`], with the key taken from the stem of `out_path`.
    pub fn submit_path(
        &self,
        out_path: impl AsRef<Path>,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, DispatchError> {
        let key = TaskKey::from_path(out_path)?;
        self.submit(key, payload)
    }

    fn scratch_path(&self, key: &TaskKey, ext: &str) -> PathBuf {
        self.cfg.work_dir.join(format!("{key}.{ext}"))
    }
}
