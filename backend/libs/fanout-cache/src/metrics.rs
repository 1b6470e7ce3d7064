//! Fan-out metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<FanoutMetricsInner> = OnceLock::new();

struct FanoutMetricsInner {
    scripts: CounterVec,
    populates: CounterVec,
    reads: CounterVec,
    errors: CounterVec,
}

impl FanoutMetricsInner {
    fn new() -> Self {
        Self {
            scripts: CounterVec::new(
                Opts::new("fanout_scripts_total", "Guarded batch runs by outcome"),
                &["outcome"],
            )
            .expect("valid metric definition"),
            populates: CounterVec::new(
                Opts::new("fanout_populates_total", "Read-through populate tasks by outcome"),
                &["view", "outcome"],
            )
            .expect("valid metric definition"),
            reads: CounterVec::new(
                Opts::new("fanout_reads_total", "View reads by serving source"),
                &["view", "source"],
            )
            .expect("valid metric definition"),
            errors: CounterVec::new(
                Opts::new("fanout_cache_errors_total", "Cache backend errors"),
                &["operation"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.scripts.clone()))?;
        registry.register(Box::new(self.populates.clone()))?;
        registry.register(Box::new(self.reads.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static FanoutMetricsInner {
    METRICS.get_or_init(FanoutMetricsInner::new)
}

#[derive(Clone, Copy, Default, Debug)]
pub struct FanoutMetrics;

impl FanoutMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_script(&self, outcome: &str) {
        get_metrics().scripts.with_label_values(&[outcome]).inc();
    }

    pub fn record_populate(&self, view: &str, outcome: &str) {
        get_metrics()
            .populates
            .with_label_values(&[view, outcome])
            .inc();
    }

    pub fn record_read(&self, view: &str, source: &str) {
        get_metrics().reads.with_label_values(&[view, source]).inc();
    }

    pub fn record_error(&self, operation: &str) {
        get_metrics().errors.with_label_values(&[operation]).inc();
    }
}
