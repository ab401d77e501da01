use std::sync::Arc;

use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, IntGauge, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use emb_core::MetricsBackend;

const NAMESPACE: &str = "embd";

/// Prometheus metrics for the dispatch pipeline.
///
/// Label cardinality is bounded: `outcome` is `success` or one of the failure
/// kinds, `target` is the name of a supervised target.
#[derive(Clone)]
pub struct PrometheusMetrics {
    tasks_started: Counter,
    tasks_completed: CounterVec,
    task_duration: Histogram,
    queue_depth: IntGauge,
    restarts: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let tasks_started = Counter::with_opts(
            Opts::new("tasks_started_total", "Tasks picked up by the worker").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(tasks_started.clone()))?;

        let tasks_completed = CounterVec::new(
            Opts::new("tasks_completed_total", "Tasks finished by the worker").namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(tasks_completed.clone()))?;

        let task_duration = Histogram::with_opts(
            HistogramOpts::new("task_duration_seconds", "Time spent computing one task")
                .namespace(NAMESPACE)
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(task_duration.clone()))?;

        let queue_depth = IntGauge::with_opts(
            Opts::new("queue_depth", "Tasks waiting for the worker").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let restarts = CounterVec::new(
            Opts::new("supervisor_restarts_total", "Restarts after abnormal exits")
                .namespace(NAMESPACE),
            &["target"],
        )?;
        registry.register(Box::new(restarts.clone()))?;

        Ok(Self {
            tasks_started,
            tasks_completed,
            task_duration,
            queue_depth,
            restarts,
            registry,
        })
    }

    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format, ready to serve on `/metrics`.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_task_started(&self) {
        self.tasks_started.inc();
    }

    fn record_task_completed(&self, outcome: &'static str, duration_ms: u64) {
        self.tasks_completed.with_label_values(&[outcome]).inc();
        self.task_duration.observe(duration_ms as f64 / 1000.0);
    }

    fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    fn record_restart(&self, target: &str) {
        self.restarts.with_label_values(&[target]).inc();
    }
}
