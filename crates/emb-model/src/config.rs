use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    CHECKPOINT_PATH_ENV, CHECKPOINT_URL_ENV, DEVICE_ENV, Env, MODEL_TYPE_ENV,
    error::{ModelError, ModelResult},
};

/// Extension a usable checkpoint path must carry.
pub const CHECKPOINT_EXT: &str = "pth";

/// Model settings the service cannot start without.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Where the checkpoint is downloaded from.
    pub checkpoint_url: String,
    /// Local checkpoint location, shared by all processes on the host.
    pub checkpoint_path: PathBuf,
    /// Model variant selector.
    pub model_type: String,
    /// Device selector.
    pub device: String,
}

impl ServiceConfig {
    /// Build the config from optional inputs.
    ///
    /// Blank values count as missing, and so does a checkpoint path without the
    /// `.pth` extension. All missing settings are reported in a single
    /// [`ModelError::MissingConfig`] so the operator can fix them in one go.
    pub fn resolve(
        checkpoint_url: Option<String>,
        checkpoint_path: Option<PathBuf>,
        model_type: Option<String>,
        device: Option<String>,
    ) -> ModelResult<Self> {
        let checkpoint_url = non_blank(checkpoint_url);
        let checkpoint_path = checkpoint_path.filter(|p| is_checkpoint_path(p));
        let model_type = non_blank(model_type);
        let device = non_blank(device);

        let mut missing = Vec::new();
        if checkpoint_url.is_none() {
            missing.push(CHECKPOINT_URL_ENV);
        }
        if checkpoint_path.is_none() {
            missing.push(CHECKPOINT_PATH_ENV);
        }
        if model_type.is_none() {
            missing.push(MODEL_TYPE_ENV);
        }
        if device.is_none() {
            missing.push(DEVICE_ENV);
        }

        match (checkpoint_url, checkpoint_path, model_type, device) {
            (Some(checkpoint_url), Some(checkpoint_path), Some(model_type), Some(device)) => {
                let cfg = Self {
                    checkpoint_url,
                    checkpoint_path,
                    model_type,
                    device,
                };
                cfg.validate()?;
                Ok(cfg)
            }
            _ => Err(ModelError::MissingConfig(missing)),
        }
    }

    /// Structural checks beyond presence.
    pub fn validate(&self) -> ModelResult<()> {
        if !(self.checkpoint_url.starts_with("http://") || self.checkpoint_url.starts_with("https://"))
        {
            return Err(ModelError::InvalidConfig {
                name: CHECKPOINT_URL_ENV,
                reason: "expected an http(s) URL".into(),
            });
        }
        if !is_checkpoint_path(&self.checkpoint_path) {
            return Err(ModelError::InvalidConfig {
                name: CHECKPOINT_PATH_ENV,
                reason: format!("expected a .{CHECKPOINT_EXT} file path"),
            });
        }
        Ok(())
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Environment forwarded to the external compute process.
    pub fn compute_env(&self) -> Env {
        Env::new()
            .with(CHECKPOINT_PATH_ENV, self.checkpoint_path.display().to_string())
            .with(MODEL_TYPE_ENV, self.model_type.clone())
            .with(DEVICE_ENV, self.device.clone())
    }
}

fn is_checkpoint_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == CHECKPOINT_EXT)
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}
