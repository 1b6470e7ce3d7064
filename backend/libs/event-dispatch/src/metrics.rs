//! Dispatch metrics

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<DispatchMetricsInner> = OnceLock::new();

struct DispatchMetricsInner {
    outcomes: CounterVec,
    published: CounterVec,
    duration: HistogramVec,
}

impl DispatchMetricsInner {
    fn new() -> Self {
        Self {
            outcomes: CounterVec::new(
                Opts::new("dispatch_outcomes_total", "Dispatched events by mode and outcome"),
                &["mode", "outcome"],
            )
            .expect("valid metric definition"),
            published: CounterVec::new(
                Opts::new("bus_published_total", "Published events by mode and result"),
                &["mode", "result"],
            )
            .expect("valid metric definition"),
            duration: HistogramVec::new(
                HistogramOpts::new("dispatch_handler_seconds", "Handler wall time")
                    .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
                &["mode"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.outcomes.clone()))?;
        registry.register(Box::new(self.published.clone()))?;
        registry.register(Box::new(self.duration.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static DispatchMetricsInner {
    METRICS.get_or_init(DispatchMetricsInner::new)
}

#[derive(Clone, Copy, Default, Debug)]
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_outcome(&self, mode: &str, outcome: &str) {
        get_metrics()
            .outcomes
            .with_label_values(&[mode, outcome])
            .inc();
    }

    pub fn record_publish(&self, mode: &str, result: &str) {
        get_metrics()
            .published
            .with_label_values(&[mode, result])
            .inc();
    }

    pub fn observe_handler(&self, mode: &str, seconds: f64) {
        get_metrics()
            .duration
            .with_label_values(&[mode])
            .observe(seconds);
    }
}
