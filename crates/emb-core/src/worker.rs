use std::{
    fs, io,
    panic::{self, AssertUnwindSafe},
    path::Path,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use emb_model::{ErrorInfo, ErrorKind, Outcome, Payload, Task};

use crate::{
    compute::{Compute, ComputeFactory},
    context::DispatchContext,
    error::CoreError,
    supervisor::{Supervised, panic_message},
};

const DEFAULT_POLL: Duration = Duration::from_secs(1);

/// The single consumer of the task queue.
///
/// Builds the compute collaborator once per run, then processes tasks strictly
/// one at a time in FIFO order. Every dequeued task gets exactly one published
/// outcome. A failing task never stops the loop; a panic inside compute does,
/// after its outcome is published, so the supervisor can rebuild the collaborator.
pub struct WorkerLoop<F> {
    name: String,
    ctx: DispatchContext,
    factory: F,
    shutdown: CancellationToken,
    poll: Duration,
}

impl<F: ComputeFactory> WorkerLoop<F> {
    pub fn new(ctx: DispatchContext, factory: F, shutdown: CancellationToken) -> Self {
        Self {
            name: "embedding-worker".to_string(),
            ctx,
            factory,
            shutdown,
            poll: DEFAULT_POLL,
        }
    }

    /// How often an idle worker re-checks the shutdown token.
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Process one task and publish its outcome.
    ///
    /// Returns the panic message if compute panicked.
    #[instrument(level = "debug", skip_all, fields(key = %task.key(), payload = task.payload().kind()))]
    fn process(&self, compute: &mut F::Output, task: Task) -> Option<String> {
        let metrics = self.ctx.metrics();
        metrics.record_task_started();
        let started = Instant::now();

        let step = panic::catch_unwind(AssertUnwindSafe(|| execute(compute, &task)));
        let key = task.key().clone();
        let (outcome, fatal) = match step {
            Ok(Ok(())) => (Outcome::succeeded(key), None),
            Ok(Err(info)) => {
                warn!(kind = %info.kind, error = %info.message, "task failed");
                (Outcome::failed(key, info), None)
            }
            Err(payload) => {
                let msg = panic_message(&*payload);
                error!(panic = %msg, "compute panicked");
                let info = ErrorInfo::new(ErrorKind::Panicked, msg.clone());
                (Outcome::failed(key, info), Some(msg))
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        metrics.record_task_completed(outcome.as_label(), elapsed_ms);
        debug!(outcome = outcome.as_label(), elapsed_ms, "task finished");

        let succeeded = outcome.success();
        if !self.ctx.registry().publish(outcome) && succeeded {
            // Nobody will collect it; the producer's scratch guard is already gone.
            discard_artifact(task.artifact_path());
        }
        fatal
    }
}

impl<F: ComputeFactory> Supervised for WorkerLoop<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<(), CoreError> {
        let mut compute = self
            .factory
            .build()
            .map_err(|e| CoreError::WorkerFatal(e.to_string()))?;
        info!(worker = %self.name, "worker ready");

        while !self.shutdown.is_cancelled() {
            let Some(task) = self.ctx.queue().dequeue_timeout(self.poll) else {
                continue;
            };
            self.ctx.metrics().set_queue_depth(self.ctx.queue().len());

            if let Some(msg) = self.process(&mut compute, task) {
                return Err(CoreError::WorkerFatal(format!("compute panicked: {msg}")));
            }
        }

        info!(worker = %self.name, "worker stopped");
        Ok(())
    }
}

fn execute<C: Compute>(compute: &mut C, task: &Task) -> Result<(), ErrorInfo> {
    let spooled;
    let bytes: &[u8] = match task.payload() {
        Payload::Inline(bytes) => bytes,
        Payload::Spooled(path) => {
            spooled = fs::read(path).map_err(|e| {
                ErrorInfo::new(ErrorKind::Io, format!("read {}: {e}", path.display()))
            })?;
            &spooled
        }
    };

    let artifact = compute.compute(bytes).map_err(|e| ErrorInfo::from(&e))?;

    // The artifact must be on disk before the outcome is published.
    let path = task.artifact_path();
    fs::write(path, artifact)
        .map_err(|e| ErrorInfo::new(ErrorKind::Io, format!("write {}: {e}", path.display())))
}

fn discard_artifact(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "orphaned artifact removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove orphaned artifact"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{Arc, Mutex},
        thread,
    };

    use emb_model::TaskKey;
    use tempfile::TempDir;

    use crate::compute::ComputeError;

    /// Uppercases ASCII input. `bad*` is rejected, `panic*` panics.
    struct Upper {
        seen: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl Compute for Upper {
        fn compute(&mut self, payload: &[u8]) -> Result<Vec<u8>, ComputeError> {
            self.seen.lock().unwrap().push(payload.to_vec());
            if payload.starts_with(b"bad") {
                return Err(ComputeError::UnsupportedFormat("not an image".into()));
            }
            if payload.starts_with(b"panic") {
                panic!("decoder exploded");
            }
            Ok(payload.to_ascii_uppercase())
        }
    }

    struct Harness {
        ctx: DispatchContext,
        token: CancellationToken,
        seen: Arc<Mutex<Vec<Vec<u8>>>>,
        dir: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                ctx: DispatchContext::default(),
                token: CancellationToken::new(),
                seen: Arc::new(Mutex::new(Vec::new())),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn worker(&self) -> WorkerLoop<impl ComputeFactory + use<>> {
            let seen = Arc::clone(&self.seen);
            let factory = move || Ok::<_, ComputeError>(Upper { seen: Arc::clone(&seen) });
            WorkerLoop::new(self.ctx.clone(), factory, self.token.clone())
                .with_poll_interval(Duration::from_millis(10))
        }

        fn spawn_worker(&self) -> thread::JoinHandle<Result<(), CoreError>> {
            let mut worker = self.worker();
            thread::spawn(move || worker.run())
        }

        fn artifact(&self, key: &str) -> std::path::PathBuf {
            self.dir.path().join(format!("{key}.npy"))
        }

        fn submit(&self, key: &str, payload: &[u8]) -> crate::Pending {
            self.ctx
                .registry()
                .claim(TaskKey::new(key).unwrap())
                .unwrap()
                .submit(self.ctx.queue(), Payload::Inline(payload.to_vec()), self.artifact(key))
        }
    }

    #[test]
    fn concurrent_producers_get_their_own_artifacts() {
        let h = Arc::new(Harness::new());
        let worker = h.spawn_worker();

        let producers: Vec<_> = (0..8)
            .map(|i| {
                let h = Arc::clone(&h);
                thread::spawn(move || {
                    let key = format!("req{i}");
                    let outcome = h.submit(&key, format!("image-{i}").as_bytes()).wait();
                    (key, outcome)
                })
            })
            .collect();

        for p in producers {
            let (key, outcome) = p.join().unwrap();
            assert_eq!(outcome.key().as_str(), key);
            assert!(outcome.success());

            let i = key.trim_start_matches("req");
            let bytes = fs::read(h.artifact(&key)).unwrap();
            assert_eq!(bytes, format!("IMAGE-{i}").into_bytes());
        }

        h.token.cancel();
        assert!(worker.join().unwrap().is_ok());
        assert_eq!(h.ctx.registry().in_flight(), 0);
    }

    #[test]
    fn tasks_are_processed_in_enqueue_order() {
        let h = Harness::new();
        let pending: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|k| h.submit(k, k.as_bytes()))
            .collect();

        let worker = h.spawn_worker();
        for p in pending {
            assert!(p.wait().success());
        }
        h.token.cancel();
        worker.join().unwrap().unwrap();

        let seen = h.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn failed_task_does_not_stop_the_loop() {
        let h = Harness::new();
        let worker = h.spawn_worker();

        let a = h.submit("a", b"bad bytes").wait();
        let b = h.submit("b", b"fine").wait();

        assert_eq!(a.error().map(|e| e.kind), Some(ErrorKind::UnsupportedFormat));
        assert!(!h.artifact("a").exists());
        assert!(b.success());
        assert_eq!(fs::read(h.artifact("b")).unwrap(), b"FINE");

        h.token.cancel();
        assert!(worker.join().unwrap().is_ok());
    }

    #[test]
    fn spooled_payload_is_read_from_disk() {
        let h = Harness::new();
        let spool = h.dir.path().join("big.binary");
        fs::write(&spool, b"spooled").unwrap();

        let worker = h.spawn_worker();
        let outcome = h
            .ctx
            .registry()
            .claim(TaskKey::new("big").unwrap())
            .unwrap()
            .submit(h.ctx.queue(), Payload::Spooled(spool), h.artifact("big"))
            .wait();

        assert!(outcome.success());
        assert_eq!(fs::read(h.artifact("big")).unwrap(), b"SPOOLED");
        h.token.cancel();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn missing_spool_file_is_an_io_failure() {
        let h = Harness::new();
        let worker = h.spawn_worker();

        let outcome = h
            .ctx
            .registry()
            .claim(TaskKey::new("gone").unwrap())
            .unwrap()
            .submit(
                h.ctx.queue(),
                Payload::Spooled(h.dir.path().join("gone.binary")),
                h.artifact("gone"),
            )
            .wait();

        assert_eq!(outcome.error().map(|e| e.kind), Some(ErrorKind::Io));
        h.token.cancel();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn abandoned_task_leaves_no_artifact_behind() {
        let h = Harness::new();
        drop(h.submit("gone", b"nobody waits"));
        let kept = h.submit("kept", b"still wanted");

        let worker = h.spawn_worker();
        assert!(kept.wait().success());
        h.token.cancel();
        worker.join().unwrap().unwrap();

        assert!(!h.artifact("gone").exists());
        assert_eq!(fs::read(h.artifact("kept")).unwrap(), b"STILL WANTED");
        assert_eq!(h.ctx.registry().in_flight(), 0);
    }

    #[test]
    fn panic_publishes_failure_then_exits_abnormally() {
        let h = Harness::new();
        let worker = h.spawn_worker();

        let outcome = h.submit("p", b"panic now").wait();
        assert_eq!(outcome.error().map(|e| e.kind), Some(ErrorKind::Panicked));

        let res = worker.join().unwrap();
        assert!(matches!(res, Err(CoreError::WorkerFatal(msg)) if msg.contains("decoder exploded")));
    }

    #[test]
    fn init_failure_is_fatal() {
        let ctx = DispatchContext::default();
        let factory = || Err::<Upper, _>(ComputeError::Init("checkpoint unreadable".into()));
        let mut worker = WorkerLoop::new(ctx, factory, CancellationToken::new());

        let res = worker.run();
        assert!(matches!(res, Err(CoreError::WorkerFatal(msg)) if msg.contains("checkpoint unreadable")));
    }

    #[test]
    fn idle_worker_stops_on_shutdown() {
        let h = Harness::new();
        let worker = h.spawn_worker();

        thread::sleep(Duration::from_millis(30));
        h.token.cancel();

        assert!(worker.join().unwrap().is_ok());
        assert!(h.seen.lock().unwrap().is_empty());
    }
}
