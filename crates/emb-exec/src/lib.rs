//! External-process backends: per-task compute over stdin/stdout and a supervised
//! long-running listener.
mod error;
pub use error::ExecError;

mod config;
pub use config::SubprocessConfig;

mod logger;
pub use logger::LogConfig;

mod compute;
pub use compute::{EX_DATAERR, SubprocessCompute};

mod listener;
pub use listener::SubprocessListener;
