//! Prometheus metrics for deploy/destroy operations.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

const DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0];

/// Operation counters and durations, labelled by resource kind, operation and result
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    operations: IntCounterVec,
    durations: HistogramVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new("infra_operations_total", "Deploy and destroy operations by outcome"),
            &["kind", "operation", "result"],
        )?;
        let durations = HistogramVec::new(
            HistogramOpts::new(
                "infra_operation_duration_seconds",
                "Wall-clock duration of deploy and destroy operations",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["kind", "operation"],
        )?;

        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(durations.clone()))?;

        Ok(Self {
            registry,
            operations,
            durations,
        })
    }

    pub fn observe(&self, kind: &str, operation: &str, success: bool, elapsed: Duration) {
        let result = if success { "success" } else { "failure" };
        self.operations.with_label_values(&[kind, operation, result]).inc();
        self.durations
            .with_label_values(&[kind, operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Text exposition format for `/metrics`
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
