// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Registration outcomes and latency
// - Cancellations
// - Transaction retries after store conflicts
// - Event creation
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Registration Metrics
    pub registrations_total: IntCounterVec,
    pub register_duration: Histogram,
    pub cancellations_total: IntCounterVec,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,

    // Catalog Metrics
    pub events_created_total: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let registrations_total = IntCounterVec::new(
            Opts::new("registrations_total", "Registration attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(registrations_total.clone()))?;

        let register_duration = Histogram::with_opts(
            HistogramOpts::new("register_duration_seconds", "Registration latency including retries")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(register_duration.clone()))?;

        let cancellations_total = IntCounterVec::new(
            Opts::new("cancellations_total", "Cancellation attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(cancellations_total.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("transaction_retries_total", "Transactions restarted after a store conflict"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let events_created_total = IntCounter::new(
            "events_created_total",
            "Total events created",
        )?;
        registry.register(Box::new(events_created_total.clone()))?;

        Ok(Self {
            registry,
            registrations_total,
            register_duration,
            cancellations_total,
            retry_attempts_total,
            events_created_total,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_registration(&self, outcome: &str, duration_secs: f64) {
        self.registrations_total.with_label_values(&[outcome]).inc();
        self.register_duration.observe(duration_secs);
    }

    pub fn record_cancellation(&self, outcome: &str) {
        self.cancellations_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_retry_attempt(&self, operation: &str) {
        self.retry_attempts_total.with_label_values(&[operation]).inc();
    }

    pub fn record_event_created(&self) {
        self.events_created_total.inc();
    }
}
