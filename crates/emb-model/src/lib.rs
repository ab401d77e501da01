mod domain;
pub use domain::{CHECKPOINT_PATH_ENV, CHECKPOINT_URL_ENV, DEVICE_ENV, MODEL_TYPE_ENV};
pub use domain::{Env, Flag, KeyValue, TaskKey};

mod error;
pub use error::{ModelError, ModelResult};

mod task;
pub use task::{Payload, Task};

mod outcome;
pub use outcome::{ErrorInfo, ErrorKind, Outcome};

mod strategy;
pub use strategy::RestartStrategy;

mod config;
pub use config::{CHECKPOINT_EXT, ServiceConfig};
