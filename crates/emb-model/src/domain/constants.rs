//! Well-known environment variable names.
//!
//! The daemon reads them at startup and forwards the model-related ones
//! to the external compute process, so both sides agree on spelling.

/// URL the model checkpoint is downloaded from.
pub const CHECKPOINT_URL_ENV: &str = "EMBD_CHECKPOINT_URL";

/// Local path of the model checkpoint (shared by cooperating processes).
pub const CHECKPOINT_PATH_ENV: &str = "EMBD_CHECKPOINT_PATH";

/// Model variant selector (e.g. `vit_h`).
pub const MODEL_TYPE_ENV: &str = "EMBD_MODEL_TYPE";

/// Device selector (e.g. `cuda`, `cpu`).
pub const DEVICE_ENV: &str = "EMBD_DEVICE";
