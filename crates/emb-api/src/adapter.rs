use async_trait::async_trait;

use emb_core::Dispatcher;
use emb_model::TaskKey;

use crate::{error::ApiError, handler::EmbeddingHandler};

/// Runs each request through a [`Dispatcher`] on tokio's blocking pool.
///
/// The dispatcher blocks its thread until the worker finishes, so every
/// in-flight request occupies one blocking thread.
#[derive(Debug, Clone)]
pub struct DispatcherAdapter {
    dispatcher: Dispatcher,
}

impl DispatcherAdapter {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EmbeddingHandler for DispatcherAdapter {
    async fn embed(&self, key: TaskKey, image: Vec<u8>) -> Result<Vec<u8>, ApiError> {
        let dispatcher = self.dispatcher.clone();
        tokio::task::spawn_blocking(move || dispatcher.submit(key, image))
            .await
            .map_err(|e| ApiError::Internal(format!("dispatch task failed: {e}")))?
            .map_err(ApiError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    use emb_core::{
        Compute, ComputeError, DispatchConfig, DispatchContext, Supervised, WorkerLoop,
    };
    use tokio_util::sync::CancellationToken;

    struct Doubler;

    impl Compute for Doubler {
        fn compute(&mut self, payload: &[u8]) -> Result<Vec<u8>, ComputeError> {
            if payload.is_empty() {
                return Err(ComputeError::UnsupportedFormat("empty".into()));
            }
            Ok(payload.iter().flat_map(|b| [*b, *b]).collect())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn requests_flow_through_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = DispatchContext::default();
        let token = CancellationToken::new();

        let mut worker = WorkerLoop::new(ctx.clone(), || Ok::<_, ComputeError>(Doubler), token.clone())
            .with_poll_interval(Duration::from_millis(10));
        let worker = thread::spawn(move || worker.run());

        let cfg = DispatchConfig {
            work_dir: dir.path().to_path_buf(),
            ..DispatchConfig::default()
        };
        let adapter = DispatcherAdapter::new(Dispatcher::new(ctx, cfg));

        let (a, b) = tokio::join!(
            adapter.embed(TaskKey::new("a").unwrap(), vec![1, 2]),
            adapter.embed(TaskKey::new("b").unwrap(), Vec::new()),
        );
        assert_eq!(a.unwrap(), vec![1, 1, 2, 2]);
        assert!(matches!(b, Err(ApiError::UnsupportedFormat)));

        token.cancel();
        worker.join().unwrap().unwrap();
    }
}
