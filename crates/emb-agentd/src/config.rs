use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;

use emb_core::DispatchConfig;
use emb_exec::SubprocessConfig;
use emb_model::{
    CHECKPOINT_PATH_ENV, CHECKPOINT_URL_ENV, DEVICE_ENV, MODEL_TYPE_ENV, ModelResult,
    RestartStrategy, ServiceConfig,
};
use emb_observe::{LoggerConfig, LoggerFormat, LoggerLevel};

/// Serialized image embedding service.
#[derive(Debug, Clone, Parser)]
#[command(name = "emb-agentd", version)]
pub struct Args {
    /// Where to download the model checkpoint from.
    #[arg(long, env = CHECKPOINT_URL_ENV)]
    pub checkpoint_url: Option<String>,

    /// Local checkpoint path, shared by every service process on the host.
    #[arg(long, env = CHECKPOINT_PATH_ENV)]
    pub checkpoint_path: Option<PathBuf>,

    /// Model variant.
    #[arg(long, env = MODEL_TYPE_ENV)]
    pub model_type: Option<String>,

    /// Compute device.
    #[arg(long, env = DEVICE_ENV)]
    pub device: Option<String>,

    /// Program run once per task: image on stdin, artifact on stdout.
    #[arg(long, env = "EMBD_COMPUTE_CMD")]
    pub compute_cmd: String,

    /// Argument for the compute program (repeatable).
    #[arg(long = "compute-arg", allow_hyphen_values = true)]
    pub compute_args: Vec<String>,

    /// Optional long-running job listener, supervised alongside the worker.
    #[arg(long, env = "EMBD_LISTENER_CMD")]
    pub listener_cmd: Option<String>,

    /// Argument for the listener program (repeatable).
    #[arg(long = "listener-arg", allow_hyphen_values = true)]
    pub listener_args: Vec<String>,

    #[arg(long, env = "EMBD_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Directory for per-request scratch files. Defaults to the system temp dir.
    #[arg(long, env = "EMBD_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    #[arg(long, env = "EMBD_DOWNLOAD_TIMEOUT_SECS", default_value_t = 3600)]
    pub download_timeout_secs: u64,

    /// Fast failures tolerated before the process gives up.
    #[arg(long, env = "EMBD_RESTART_RETRIES", default_value_t = RestartStrategy::DEFAULT_RETRIES)]
    pub restart_retries: u32,

    /// Runs shorter than this count as fast failures.
    #[arg(long, env = "EMBD_MIN_HEALTHY_MS", default_value_t = RestartStrategy::DEFAULT_MIN_HEALTHY_MS)]
    pub min_healthy_ms: u64,

    #[arg(long, env = "EMBD_LOG_LEVEL", default_value = "info")]
    pub log_level: LoggerLevel,

    #[arg(long, env = "EMBD_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,
}

impl Args {
    /// Model settings; every missing one is reported in a single error.
    pub fn service_config(&self) -> ModelResult<ServiceConfig> {
        ServiceConfig::resolve(
            self.checkpoint_url.clone(),
            self.checkpoint_path.clone(),
            self.model_type.clone(),
            self.device.clone(),
        )
    }

    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig::new(self.log_format, self.log_level.clone())
    }

    pub fn restart_strategy(&self) -> RestartStrategy {
        RestartStrategy {
            retries: self.restart_retries,
            min_healthy_runtime_ms: self.min_healthy_ms,
            ..RestartStrategy::default()
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        let mut cfg = DispatchConfig::default();
        if let Some(dir) = &self.work_dir {
            cfg.work_dir = dir.clone();
        }
        cfg
    }

    pub fn compute_config(&self, service: &ServiceConfig) -> SubprocessConfig {
        SubprocessConfig::new("compute", &self.compute_cmd)
            .with_args(self.compute_args.iter().cloned())
            .with_env(service.compute_env())
    }

    pub fn listener_config(&self, service: &ServiceConfig) -> Option<SubprocessConfig> {
        let cmd = self.listener_cmd.as_deref().filter(|c| !c.trim().is_empty())?;
        Some(
            SubprocessConfig::new("job-listener", cmd)
                .with_args(self.listener_args.iter().cloned())
                .with_env(service.compute_env()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emb_model::ModelError;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["emb-agentd", "--compute-cmd", "python3"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_apply() {
        let args = parse(&[]);
        assert_eq!(args.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(args.download_timeout(), Duration::from_secs(3600));
        assert_eq!(args.restart_strategy().retries, 3);
        assert_eq!(args.restart_strategy().min_healthy_runtime_ms, 5_000);
        assert_eq!(args.log_format, LoggerFormat::Text);
        assert!(args.listener_cmd.is_none());
    }

    #[test]
    fn missing_model_settings_are_listed_together() {
        let args = parse(&["--device", "cpu"]);
        match args.service_config().unwrap_err() {
            ModelError::MissingConfig(names) => {
                assert_eq!(names, vec![CHECKPOINT_URL_ENV, CHECKPOINT_PATH_ENV, MODEL_TYPE_ENV]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn compute_args_accept_hyphenated_values() {
        let args = parse(&["--compute-arg", "embed.py", "--compute-arg", "--stdin"]);
        assert_eq!(args.compute_args, vec!["embed.py", "--stdin"]);
    }

    #[test]
    fn listener_is_configured_only_when_given() {
        let full = [
            "--checkpoint-url",
            "https://example.org/sam.pth",
            "--checkpoint-path",
            "/tmp/ckpt/checkpoint.pth",
            "--model-type",
            "vit_b",
            "--device",
            "cpu",
        ];
        let args = parse(&full);
        let service = args.service_config().unwrap();
        assert!(args.listener_config(&service).is_none());

        let mut with_listener = full.to_vec();
        with_listener.extend_from_slice(&["--listener-cmd", "php", "--listener-arg", "artisan"]);
        let args = parse(&with_listener);
        let listener = args.listener_config(&service).unwrap();
        assert_eq!(listener.name(), "job-listener");
        assert_eq!(listener.command(), "php");
    }

    #[test]
    fn invalid_log_level_is_a_parse_error() {
        let res = Args::try_parse_from(["emb-agentd", "--compute-cmd", "x", "--log-level", "a=loud"]);
        assert!(res.is_err());
    }

    #[test]
    fn work_dir_overrides_scratch_location() {
        let args = parse(&["--work-dir", "/var/tmp/embd"]);
        assert_eq!(args.dispatch_config().work_dir, PathBuf::from("/var/tmp/embd"));
    }
}
