//! Prometheus implementation of [`emb_core::MetricsBackend`].
//!
//! ## Metrics
//! - `embd_tasks_started_total` - Counter
//! - `embd_tasks_completed_total{outcome}` - Counter
//! - `embd_task_duration_seconds` - Histogram
//! - `embd_queue_depth` - Gauge
//! - `embd_supervisor_restarts_total{target}` - Counter
//!
//! Serving `/metrics` is left to the host's HTTP stack; [`PrometheusMetrics::encode_text`]
//! produces the response body.
mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Registry, TextEncoder};
