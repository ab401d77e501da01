use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{LogClock, LoggerConfig, LoggerError, LoggerFormat, LoggerResult};

/// Install the global tracing subscriber described by `cfg`.
///
/// With [`crate::LoggerTimeZone::Local`], call [`crate::init_local_offset`]
/// first, before any thread is spawned. Fails with
/// [`LoggerError::AlreadyInitialized`] on a second call.
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    let filter = cfg.level.to_env_filter();
    let clock = LogClock::new(cfg.tz);

    match cfg.format {
        LoggerFormat::Text => {
            let layer = fmt::layer()
                .with_ansi(cfg.should_use_color())
                .with_target(cfg.with_targets)
                .with_timer(clock);
            install(tracing_subscriber::registry().with(filter).with(layer))
        }
        LoggerFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(cfg.with_targets)
                .with_current_span(true)
                .with_timer(clock);
            install(tracing_subscriber::registry().with(filter).with(layer))
        }
        LoggerFormat::Journald => journald(filter),
    }
}

#[cfg(target_os = "linux")]
fn journald(filter: tracing_subscriber::EnvFilter) -> LoggerResult<()> {
    let layer =
        tracing_journald::layer().map_err(|e| LoggerError::JournaldInitFailed(e.to_string()))?;
    install(tracing_subscriber::registry().with(filter).with(layer))
}

#[cfg(not(target_os = "linux"))]
fn journald(_filter: tracing_subscriber::EnvFilter) -> LoggerResult<()> {
    Err(LoggerError::JournaldNotSupported)
}

fn install<S>(subscriber: S) -> LoggerResult<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)
}
