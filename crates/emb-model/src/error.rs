use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid task key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("cannot derive task key from path: {0}")]
    UnderivableKey(String),

    #[error("missing required configuration: {}", .0.join(", "))]
    MissingConfig(Vec<&'static str>),

    #[error("invalid configuration value for {name}: {reason}")]
    InvalidConfig { name: &'static str, reason: String },
}

pub type ModelResult<T> = Result<T, ModelError>;
