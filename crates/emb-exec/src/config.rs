use std::{fmt, path::PathBuf, process::Command};

use tracing::trace;

use emb_model::Env;

use crate::{ExecError, logger::LogConfig};

/// How to launch an external process.
#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    /// Log identifier.
    pub(crate) name: String,
    /// Program to execute (e.g. `"python3"`).
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    /// Extra environment on top of the inherited one. Later entries win.
    pub(crate) env: Env,
    /// Working directory; inherited when `None`.
    pub(crate) cwd: Option<PathBuf>,
    pub(crate) log: LogConfig,
}

impl SubprocessConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: Env::new(),
            cwd: None,
            log: LogConfig::default(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, env: Env) -> Self {
        self.env = self.env.merged(&env);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Rules:
    /// - `command` is not empty or whitespace-only;
    /// - `name` is not empty.
    pub fn validate(&self) -> Result<(), ExecError> {
        if self.command.trim().is_empty() {
            return Err(ExecError::InvalidSpec("subprocess command is empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(ExecError::InvalidSpec("subprocess name is empty".into()));
        }
        Ok(())
    }

    /// Emit a trace-level log with the essential configuration fields.
    pub fn trace_state(&self) {
        trace!(
            name = %self.name,
            command = %self.command,
            args = ?self.args,
            cwd = ?self.cwd,
            env_len = self.env.len(),
            "subprocess config resolved"
        );
    }

    /// Build a [`Command`] without stdio wiring.
    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in self.env.effective() {
            cmd.env(k, v);
        }
        cmd
    }
}

impl fmt::Display for SubprocessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SubprocessConfig(name='{}', cmd='{}', args={}, env={}, cwd={:?})",
            self.name,
            self.command,
            self.args.len(),
            self.env.len(),
            self.cwd,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_command_is_rejected() {
        let err = SubprocessConfig::new("compute", "  ").validate().unwrap_err();
        assert!(matches!(err, ExecError::InvalidSpec(_)));
    }

    #[test]
    fn env_layers_merge_with_later_winning() {
        let cfg = SubprocessConfig::new("compute", "python3")
            .with_env(Env::new().with("A", "1").with("B", "1"))
            .with_env(Env::new().with("B", "2"));
        assert_eq!(cfg.env.get("A"), Some("1"));
        assert_eq!(cfg.env.get("B"), Some("2"));
    }

    #[test]
    fn display_summarises_without_values() {
        let cfg = SubprocessConfig::new("compute", "python3")
            .with_args(["embed.py", "--stdin"])
            .with_env(Env::new().with("SECRET", "x"));
        let s = cfg.to_string();
        assert!(s.contains("cmd='python3'"));
        assert!(s.contains("args=2"));
        assert!(!s.contains("SECRET"));
    }
}
