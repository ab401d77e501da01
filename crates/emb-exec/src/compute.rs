use std::{
    io::{self, Write},
    process::{Output, Stdio},
    thread,
};

use tracing::{debug, instrument};

use emb_core::{Compute, ComputeError};

use crate::{
    ExecError,
    config::SubprocessConfig,
    logger::{Stream, emit_captured},
};

/// Exit code a compute process uses to reject its input (`EX_DATAERR` from sysexits.h).
pub const EX_DATAERR: i32 = 65;

/// Runs one process per task: payload on stdin, artifact on stdout.
///
/// Exit code [`EX_DATAERR`] means the input is not a supported image; any other
/// non-zero exit is a compute failure. Stderr is logged line by line.
#[derive(Debug, Clone)]
pub struct SubprocessCompute {
    config: SubprocessConfig,
}

impl SubprocessCompute {
    pub fn new(config: SubprocessConfig) -> Result<Self, ExecError> {
        config.validate()?;
        config.trace_state();
        Ok(Self { config })
    }

    pub fn config(&self) -> &SubprocessConfig {
        &self.config
    }

    fn run(&self, payload: &[u8]) -> Result<Output, ExecError> {
        let mut child = self
            .config
            .to_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: self.config.command.clone(),
                source,
            })?;
        let stdin = child.stdin.take();

        // Feed stdin from a second thread so a chatty child cannot fill stdout and deadlock us.
        let (output, fed) = thread::scope(|s| {
            let feeder = stdin.map(|mut stdin| s.spawn(move || stdin.write_all(payload)));
            let output = child.wait_with_output();
            let fed = match feeder {
                Some(h) => h
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked"))),
                None => Ok(()),
            };
            (output, fed)
        });
        let output = output?;

        match fed {
            // The child may legitimately exit before reading everything.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(process = %self.config.name, "child closed stdin early");
            }
            Err(e) if output.status.success() => return Err(ExecError::Io(e)),
            _ => {}
        }
        Ok(output)
    }
}

impl Compute for SubprocessCompute {
    #[instrument(level = "debug", skip_all, fields(process = %self.config.name, bytes = payload.len()))]
    fn compute(&mut self, payload: &[u8]) -> Result<Vec<u8>, ComputeError> {
        let output = self.run(payload)?;
        emit_captured(&self.config.name, Stream::Stderr, &output.stderr, &self.config.log);

        match output.status.code() {
            Some(0) => {
                debug!(artifact_bytes = output.stdout.len(), "compute finished");
                Ok(output.stdout)
            }
            Some(EX_DATAERR) => Err(ComputeError::UnsupportedFormat(
                last_line(&output.stderr).unwrap_or_else(|| "input rejected".to_string()),
            )),
            _ => Err(ComputeError::Failed(format!(
                "'{}' exited with {}",
                self.config.command, output.status
            ))),
        }
    }
}

fn last_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
}
