use crate::metrics::backend::MetricsBackend;

/// No-op metrics backend that compiles to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_task_started(&self) {}

    #[inline(always)]
    fn record_task_completed(&self, _: &'static str, _: u64) {}

    #[inline(always)]
    fn set_queue_depth(&self, _: usize) {}

    #[inline(always)]
    fn record_restart(&self, _: &str) {}
}
