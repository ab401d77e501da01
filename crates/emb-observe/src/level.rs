use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::LoggerError;

const DEFAULT_LEVEL: &str = "info";

/// A validated `EnvFilter` directive string, e.g. `"info"` or `"emb_core=debug,info"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LoggerLevel(String);

impl LoggerLevel {
    pub fn new(s: impl Into<String>) -> Result<Self, LoggerError> {
        let s = s.into();
        EnvFilter::try_new(&s).map_err(|e| LoggerError::InvalidLevel(format!("{s}: {e}")))?;
        Ok(Self(s))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the filter. Falls back to `info` if the directive stopped parsing,
    /// which cannot happen for a value that passed [`LoggerLevel::new`].
    pub fn to_env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.0).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    }
}

impl Default for LoggerLevel {
    fn default() -> Self {
        Self(DEFAULT_LEVEL.to_string())
    }
}

impl FromStr for LoggerLevel {
    type Err = LoggerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LoggerLevel {
    type Error = LoggerError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<LoggerLevel> for String {
    fn from(l: LoggerLevel) -> Self {
        l.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_per_target_directives() {
        for ok in ["info", "trace", "emb_core=debug,emb_fetch=trace,warn"] {
            assert!(ok.parse::<LoggerLevel>().is_ok(), "{ok}");
        }
    }

    #[test]
    fn rejects_unknown_levels() {
        for bad in ["emb_core=loud", "x=verbose,info"] {
            assert!(matches!(bad.parse::<LoggerLevel>(), Err(LoggerError::InvalidLevel(_))), "{bad}");
        }
    }

    #[test]
    fn default_is_info() {
        let lvl = LoggerLevel::default();
        assert_eq!(lvl.as_str(), "info");
        let _ = lvl.to_env_filter();
    }

    #[test]
    fn deserialize_validates() {
        assert!(serde_json::from_str::<LoggerLevel>(r#""debug""#).is_ok());
        assert!(serde_json::from_str::<LoggerLevel>(r#""a=nope""#).is_err());
    }
}
