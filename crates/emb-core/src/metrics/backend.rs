use std::sync::Arc;

/// Backend metrics collection interface.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record that the worker picked a task off the queue.
    fn record_task_started(&self);
    /// Record task completion.
    ///
    /// # Arguments
    /// - `outcome`: `"success"` or the failure kind label
    /// - `duration_ms`: time spent in the worker
    fn record_task_completed(&self, outcome: &'static str, duration_ms: u64);
    /// Report the current number of queued tasks.
    fn set_queue_depth(&self, depth: usize);
    /// Record a supervisor restart of the named target.
    fn record_restart(&self, target: &str);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
