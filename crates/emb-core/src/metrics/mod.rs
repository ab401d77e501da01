//! Metrics collection abstraction for the dispatch core.
//!
//! Backends (prometheus, ...) implement [`MetricsBackend`] and are injected via [`crate::DispatchContext`].
mod backend;
pub use backend::{MetricsBackend, MetricsHandle};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
