/// Prometheus metric definitions for the worker.
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};

/// Metrics collector.
#[derive(Debug, Clone)]
pub struct Metrics {
    pub classify_requests: Counter,
    pub classify_failures: Counter,
    pub contribute_requests: Counter,
    pub contribute_failures: Counter,
    pub fit_requests: Counter,
    pub fit_failures: Counter,

    pub predict_duration: Histogram,
    pub update_duration: Histogram,

    pub training_samples: Gauge,
}

impl Metrics {
    /// Registers the worker metrics on the given registry.
    ///
    /// # Errors
    /// Fails when a metric name collides or registration fails.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            classify_requests: register_counter_with_registry!(
                "season_worker_classify_requests_total",
                "Number of classify requests received",
                registry
            )?,
            classify_failures: register_counter_with_registry!(
                "season_worker_classify_failures_total",
                "Number of classify requests that failed",
                registry
            )?,
            contribute_requests: register_counter_with_registry!(
                "season_worker_contribute_requests_total",
                "Number of contribute requests received",
                registry
            )?,
            contribute_failures: register_counter_with_registry!(
                "season_worker_contribute_failures_total",
                "Number of contribute requests that failed",
                registry
            )?,
            fit_requests: register_counter_with_registry!(
                "season_worker_fit_requests_total",
                "Number of full pipeline fits",
                registry
            )?,
            fit_failures: register_counter_with_registry!(
                "season_worker_fit_failures_total",
                "Number of full pipeline fits that failed",
                registry
            )?,
            predict_duration: register_histogram_with_registry!(
                "season_worker_predict_duration_seconds",
                "Wall-clock duration of a single prediction",
                registry
            )?,
            update_duration: register_histogram_with_registry!(
                "season_worker_update_duration_seconds",
                "Wall-clock duration of a model update",
                registry
            )?,
            training_samples: register_gauge_with_registry!(
                "season_worker_training_samples",
                "Stored training samples in the nearest-neighbor classifier",
                registry
            )?,
        })
    }
}
