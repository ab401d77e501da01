use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::{LoggerFormat, LoggerLevel, LoggerTimeZone};

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `"emb_core=debug,info"`.
    pub level: LoggerLevel,
    /// Timezone of timestamps.
    pub tz: LoggerTimeZone,
    /// Include the module target in each record.
    pub with_targets: bool,
    /// Colored text output; only honored when stdout is a terminal.
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::default(),
            level: LoggerLevel::default(),
            tz: LoggerTimeZone::default(),
            with_targets: true,
            use_color: true,
        }
    }
}

impl LoggerConfig {
    pub fn new(format: LoggerFormat, level: LoggerLevel) -> Self {
        Self {
            format,
            level,
            ..Self::default()
        }
    }

    pub fn with_tz(mut self, tz: LoggerTimeZone) -> Self {
        self.tz = tz;
        self
    }

    /// Color only when enabled and stdout is a terminal.
    pub fn should_use_color(&self) -> bool {
        self.use_color && self.format == LoggerFormat::Text && std::io::stdout().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = LoggerConfig::default();
        assert_eq!(cfg.format, LoggerFormat::Text);
        assert_eq!(cfg.tz, LoggerTimeZone::Utc);
        assert_eq!(cfg.level.as_str(), "info");
        assert!(cfg.with_targets);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: LoggerConfig = serde_json::from_str(r#"{"format":"json","tz":"local"}"#).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.tz, LoggerTimeZone::Local);
        assert_eq!(cfg.level, LoggerLevel::default());
        assert!(cfg.use_color);
    }

    #[test]
    fn json_never_uses_color() {
        let cfg = LoggerConfig::new(LoggerFormat::Json, LoggerLevel::default());
        assert!(!cfg.should_use_color());
    }

    #[test]
    fn invalid_level_fails_deserialization() {
        let res = serde_json::from_str::<LoggerConfig>(r#"{"level":"core=shout"}"#);
        assert!(res.is_err());
    }
}
