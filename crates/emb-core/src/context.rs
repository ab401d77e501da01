use std::{fmt, sync::Arc};

use crate::{
    metrics::{MetricsHandle, noop_metrics},
    queue::TaskQueue,
    registry::CompletionRegistry,
};

/// Shared state of one dispatch pipeline.
///
/// Owns the task queue, the completion registry and the metrics handle. Cloning
/// is cheap; every clone refers to the same pipeline. Construct one per service
/// (or per test) and hand clones to the worker and the dispatcher.
#[derive(Clone)]
pub struct DispatchContext {
    queue: Arc<TaskQueue>,
    registry: Arc<CompletionRegistry>,
    metrics: MetricsHandle,
}

impl DispatchContext {
    /// Create an empty pipeline with the given metrics backend.
    pub fn new(metrics: MetricsHandle) -> Self {
        Self {
            queue: Arc::new(TaskQueue::new()),
            registry: Arc::new(CompletionRegistry::new()),
            metrics,
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<CompletionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    /// Replace the metrics backend and return updated context.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self::new(noop_metrics())
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("queued", &self.queue.len())
            .field("registry", &self.registry)
            .field("metrics", &"<handle>")
            .finish()
    }
}

impl fmt::Display for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DispatchContext(queued={}, in_flight={})",
            self.queue.len(),
            self.registry.in_flight()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emb_model::TaskKey;

    #[test]
    fn clones_share_the_same_pipeline() {
        let ctx = DispatchContext::default();
        let other = ctx.clone();

        let _claim = ctx.registry().claim(TaskKey::new("shared").unwrap()).unwrap();
        assert_eq!(other.registry().in_flight(), 1);
    }

    #[test]
    fn separate_contexts_are_isolated() {
        let a = DispatchContext::default();
        let b = DispatchContext::default();

        let _claim = a.registry().claim(TaskKey::new("k").unwrap()).unwrap();
        assert!(b.registry().claim(TaskKey::new("k").unwrap()).is_ok());
    }

    #[test]
    fn display_reports_depth_and_in_flight() {
        let ctx = DispatchContext::default();
        assert_eq!(ctx.to_string(), "DispatchContext(queued=0, in_flight=0)");
    }

    #[test]
    fn with_metrics_replaces_backend() {
        let ctx = DispatchContext::default().with_metrics(noop_metrics());
        ctx.metrics().record_task_started();
        ctx.metrics().set_queue_depth(3);
    }
}
