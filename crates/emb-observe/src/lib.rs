//! Process-wide logging setup for the embedding service.
//!
//! All crates log through `tracing` macros; this crate installs the global
//! subscriber once at startup.
mod error;
pub use error::{LoggerError, LoggerResult};

mod format;
pub use format::LoggerFormat;

mod level;
pub use level::LoggerLevel;

mod clock;
pub use clock::{LogClock, LoggerTimeZone, init_local_offset};

mod config;
pub use config::LoggerConfig;

mod init;
pub use init::init_logger;
