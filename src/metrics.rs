//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub bids_attempted: IntCounter,
    pub bids_rejected_local: IntCounterVec,
    pub bids_accepted: IntCounter,
    pub bids_confirmed: IntCounter,
    pub bids_failed: IntCounterVec,

    // Gauges
    pub submissions_in_flight: IntGauge,

    // Histograms
    pub acceptance_latency: Histogram,
    pub confirmation_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let bids_attempted = IntCounter::with_opts(Opts::new(
            "bids_attempted_total",
            "Bid submissions requested by users",
        ))?;

        let bids_rejected_local = IntCounterVec::new(
            Opts::new(
                "bids_rejected_local_total",
                "Bids rejected before any settlement call",
            ),
            &["category"],
        )?;

        let bids_accepted = IntCounter::with_opts(Opts::new(
            "bids_accepted_total",
            "Bids accepted by the settlement service",
        ))?;

        let bids_confirmed =
            IntCounter::with_opts(Opts::new("bids_confirmed_total", "Bids confirmed on-chain"))?;

        let bids_failed = IntCounterVec::new(
            Opts::new("bids_failed_total", "Submitted bids that failed"),
            &["category"],
        )?;

        let submissions_in_flight = IntGauge::with_opts(Opts::new(
            "submissions_in_flight",
            "Submissions being tracked to an outcome",
        ))?;

        let acceptance_latency = Histogram::with_opts(
            HistogramOpts::new(
                "bid_acceptance_latency_seconds",
                "Time from submit to settlement acceptance",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "bid_confirmation_latency_seconds",
                "Time from submit to on-chain confirmation",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;

        registry.register(Box::new(bids_attempted.clone()))?;
        registry.register(Box::new(bids_rejected_local.clone()))?;
        registry.register(Box::new(bids_accepted.clone()))?;
        registry.register(Box::new(bids_confirmed.clone()))?;
        registry.register(Box::new(bids_failed.clone()))?;
        registry.register(Box::new(submissions_in_flight.clone()))?;
        registry.register(Box::new(acceptance_latency.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            bids_attempted,
            bids_rejected_local,
            bids_accepted,
            bids_confirmed,
            bids_failed,
            submissions_in_flight,
            acceptance_latency,
            confirmation_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let m = metrics();
        let before = m.bids_attempted.get();
        m.bids_attempted.inc();
        assert_eq!(m.bids_attempted.get(), before + 1);

        let rejected = m.bids_rejected_local.with_label_values(&["wallet"]);
        let before = rejected.get();
        rejected.inc();
        assert_eq!(rejected.get(), before + 1);
    }

    #[test]
    fn test_render_exposition() {
        let m = metrics();
        m.bids_confirmed.inc();
        m.acceptance_latency.observe(1.5);
        let text = m.render().unwrap();
        assert!(text.contains("bids_confirmed_total"));
        assert!(text.contains("bid_acceptance_latency_seconds_bucket"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        assert!(timer.elapsed_secs() >= 0.0);
        let histogram = &metrics().confirmation_latency;
        let before = histogram.get_sample_count();
        timer.observe_duration(histogram);
        assert_eq!(histogram.get_sample_count(), before + 1);
    }
}
