//! Observability infrastructure for the collector
//!
//! Provides:
//! - Prometheus metrics about the collector itself (tick latency, delivery and source errors)
//! - Structured JSON logging of lifecycle events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for tick durations (in seconds)
const TICK_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CollectorMetricsInner> = OnceLock::new();

struct CollectorMetricsInner {
    tick_duration_seconds: Histogram,
    records_delivered: IntCounter,
    delivery_errors: IntCounter,
    source_errors: IntCounterVec,
    ticks_in_flight: IntGauge,
    nodes_discovered: IntGauge,
}

impl CollectorMetricsInner {
    fn new() -> Self {
        Self {
            tick_duration_seconds: register_histogram!(
                "k8s_metrics_collector_tick_duration_seconds",
                "Wall time of one collection tick, from first fetch to last record queued",
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_duration_seconds"),

            records_delivered: register_int_counter!(
                "k8s_metrics_collector_records_delivered_total",
                "Metric records accepted by the sink"
            )
            .expect("Failed to register records_delivered_total"),

            delivery_errors: register_int_counter!(
                "k8s_metrics_collector_delivery_errors_total",
                "Metric records rejected by the sink"
            )
            .expect("Failed to register delivery_errors_total"),

            source_errors: register_int_counter_vec!(
                "k8s_metrics_collector_source_errors_total",
                "Sources that failed to fetch or convert during a tick",
                &["source"]
            )
            .expect("Failed to register source_errors_total"),

            ticks_in_flight: register_int_gauge!(
                "k8s_metrics_collector_ticks_in_flight",
                "Collection ticks currently running"
            )
            .expect("Failed to register ticks_in_flight"),

            nodes_discovered: register_int_gauge!(
                "k8s_metrics_collector_nodes_discovered",
                "Nodes returned by the last node inventory fetch"
            )
            .expect("Failed to register nodes_discovered"),
        }
    }
}

/// Collector metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct CollectorMetrics {
    _private: (),
}

impl Default for CollectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CollectorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorMetrics").finish_non_exhaustive()
    }
}

impl CollectorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CollectorMetricsInner {
        GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new)
    }

    pub fn observe_tick_duration(&self, duration: Duration) {
        self.inner().tick_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn inc_records_delivered(&self) {
        self.inner().records_delivered.inc();
    }

    pub fn inc_delivery_errors(&self) {
        self.inner().delivery_errors.inc();
    }

    pub fn inc_source_errors(&self, source: &str) {
        self.inner().source_errors.with_label_values(&[source]).inc();
    }

    /// Mark a tick as started; pair with [`CollectorMetrics::tick_finished`]
    pub fn tick_started(&self) {
        self.inner().ticks_in_flight.inc();
    }

    pub fn tick_finished(&self) {
        self.inner().ticks_in_flight.dec();
    }

    pub fn set_nodes_discovered(&self, count: usize) {
        self.inner().nodes_discovered.set(count as i64);
    }
}

/// Structured logger for collector lifecycle events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    cluster: String,
}

impl StructuredLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    /// Log collector startup
    pub fn log_startup(&self, version: &str, period: Duration) {
        info!(
            event = "collector_started",
            cluster = %self.cluster,
            collector_version = %version,
            period_secs = period.as_secs(),
            "Metrics collector started"
        );
    }

    /// Log collector shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "collector_shutdown",
            cluster = %self.cluster,
            reason = %reason,
            "Metrics collector shutting down"
        );
    }

    /// Log the outcome of one collection tick
    pub fn log_tick(&self, records: usize, sources: usize, source_failures: usize, elapsed: Duration) {
        if source_failures > 0 {
            warn!(
                event = "tick_complete",
                cluster = %self.cluster,
                records = records,
                sources = sources,
                source_failures = source_failures,
                elapsed_ms = elapsed.as_millis() as u64,
                "Collection tick finished with failed sources"
            );
        } else {
            info!(
                event = "tick_complete",
                cluster = %self.cluster,
                records = records,
                sources = sources,
                elapsed_ms = elapsed.as_millis() as u64,
                "Collection tick finished"
            );
        }
    }
}
