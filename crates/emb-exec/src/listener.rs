use std::{
    io,
    os::unix::process::CommandExt,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tokio::{
    process::{Child, Command},
    runtime,
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use emb_core::{CoreError, Supervised};

use crate::{
    ExecError,
    config::SubprocessConfig,
    logger::{Stream, pump},
};

const DEFAULT_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_DRAIN: Duration = Duration::from_millis(200);

/// A long-running external process kept alive by the supervisor.
///
/// Any exit of the child counts as abnormal, whatever its status. The child runs
/// in its own process group: when it exits, stragglers left in the group are
/// killed; on shutdown the group gets `SIGTERM`, then `SIGKILL` once the grace
/// period runs out.
pub struct SubprocessListener {
    config: SubprocessConfig,
    shutdown: CancellationToken,
    grace: Duration,
    drain: Duration,
}

impl SubprocessListener {
    pub fn new(config: SubprocessConfig, shutdown: CancellationToken) -> Result<Self, ExecError> {
        config.validate()?;
        Ok(Self {
            config,
            shutdown,
            grace: DEFAULT_GRACE,
            drain: DEFAULT_DRAIN,
        })
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Upper bound on flushing buffered output after the child is gone.
    pub fn with_drain(mut self, drain: Duration) -> Self {
        self.drain = drain;
        self
    }

    fn spawn(&self) -> Result<(Child, Vec<JoinHandle<()>>), ExecError> {
        self.config.trace_state();
        let mut std_cmd = self.config.to_command();
        std_cmd.process_group(0);

        let mut child = Command::from(std_cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: self.config.command.clone(),
                source,
            })?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            pumps.push(pump(self.config.name.clone(), Stream::Stdout, out, self.config.log));
        }
        if let Some(err) = child.stderr.take() {
            pumps.push(pump(self.config.name.clone(), Stream::Stderr, err, self.config.log));
        }
        Ok((child, pumps))
    }

    async fn supervise(&self) -> Result<(), CoreError> {
        let (mut child, pumps) = self
            .spawn()
            .map_err(|e| CoreError::WorkerFatal(e.to_string()))?;
        let pgid = child.id();
        info!(process = %self.config.name, pid = ?pgid, "listener started");

        let result = tokio::select! {
            res = child.wait() => {
                if let Some(pgid) = pgid {
                    signal_group(pgid, libc::SIGKILL);
                }
                match res {
                    Ok(status) => Err(CoreError::WorkerFatal(format!("listener exited with {status}"))),
                    Err(e) => Err(CoreError::WorkerFatal(format!("listener wait failed: {e}"))),
                }
            }
            _ = self.shutdown.cancelled() => {
                match self.stop(&mut child, pgid).await {
                    Ok(status) => info!(process = %self.config.name, %status, "listener stopped"),
                    Err(e) => warn!(process = %self.config.name, error = %e, "listener stop failed"),
                }
                Ok(())
            }
        };

        self.drain_output(pumps).await;
        result
    }

    /// SIGTERM the group, wait out the grace period, then SIGKILL.
    async fn stop(&self, child: &mut Child, pgid: Option<u32>) -> Result<ExitStatus, ExecError> {
        if let Some(pgid) = pgid {
            signal_group(pgid, libc::SIGTERM);
        }
        if let Ok(status) = time::timeout(self.grace, child.wait()).await {
            return Ok(status?);
        }

        warn!(process = %self.config.name, pid = ?pgid, "grace period elapsed; killing");
        if let Some(pgid) = pgid {
            signal_group(pgid, libc::SIGKILL);
        }
        if let Err(e) = child.start_kill() {
            debug!(process = %self.config.name, error = %e, "start_kill failed");
        }
        Ok(child.wait().await?)
    }

    async fn drain_output(&self, pumps: Vec<JoinHandle<()>>) {
        let joined = async {
            for p in pumps {
                let _ = p.await;
            }
        };
        if time::timeout(self.drain, joined).await.is_err() {
            debug!(process = %self.config.name, "output still open after exit; dropping readers");
        }
    }
}

fn signal_group(pgid: u32, signal: libc::c_int) {
    // SAFETY: killpg(2) takes plain integers and touches no memory of ours.
    if unsafe { libc::killpg(pgid as libc::pid_t, signal) } != 0 {
        let err = io::Error::last_os_error();
        debug!(pgid, signal, error = %err, "killpg failed; group probably gone");
    }
}

impl Supervised for SubprocessListener {
    fn name(&self) -> &str {
        self.config.name()
    }

    /// Drive one child lifetime on a private current-thread runtime.
    ///
    /// Returns as soon as the child exits; output readers still attached to a
    /// leftover pipe are dropped with the runtime.
    fn run(&mut self) -> Result<(), CoreError> {
        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CoreError::WorkerFatal(format!("listener runtime: {e}")))?;
        rt.block_on(self.supervise())
    }
}
