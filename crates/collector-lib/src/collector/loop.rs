//! Metrics collection loop
//!
//! Fires a collection tick every period and delivers the records to the
//! sink. Each tick runs as its own task, so a slow tick never holds back the
//! next one; a single delivery task drains the shared channel one record at
//! a time.

use super::{ClusterSource, EndpointSource, MetricSink, NodeMetricsCollector, NodeTagCache, TickSummary};
use crate::converter::{Converter, ConverterOptions, ExpositionParser};
use crate::health::{components, HealthRegistry};
use crate::models::{MetricRecord, Tag};
use crate::observability::{CollectorMetrics, StructuredLogger};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// An extra exposition endpoint scraped every tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalEndpoint {
    pub url: String,
    /// Static tags appended to every record from this endpoint
    pub tags: Vec<Tag>,
}

impl AdditionalEndpoint {
    pub fn new(url: impl Into<String>, tags: Vec<Tag>) -> Self {
        Self {
            url: url.into(),
            tags,
        }
    }
}

/// Configuration for the collection loop
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Time between ticks (default: 60 seconds)
    pub period: Duration,
    /// Scrape each node's metrics endpoint
    pub node_metrics: bool,
    /// Scrape each node's cAdvisor endpoint
    pub cadvisor_metrics: bool,
    /// Read node and pod usage from the metrics API
    pub usage_metrics: bool,
    /// Report pod counts and declared container resources
    pub pod_inventory: bool,
    /// Maximum nodes scraped at once (default: unbounded)
    ///
    /// Lowering it trades tick duration for less load on the cluster API.
    pub node_concurrency: Option<usize>,
    /// Records buffered between producers and the sink
    pub buffer_size: usize,
    pub additional_endpoints: Vec<AdditionalEndpoint>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            node_metrics: true,
            cadvisor_metrics: true,
            usage_metrics: true,
            pod_inventory: true,
            node_concurrency: None,
            buffer_size: 1000,
            additional_endpoints: Vec::new(),
        }
    }
}

impl CollectorConfig {
    /// True if any per-node source is enabled
    pub fn scrapes_nodes(&self) -> bool {
        self.node_metrics || self.cadvisor_metrics || self.usage_metrics
    }
}

/// Periodic driver of [`NodeMetricsCollector`] ticks
pub struct CollectionLoop {
    collector: Arc<NodeMetricsCollector>,
    sink: Arc<dyn MetricSink>,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    metrics: Option<CollectorMetrics>,
}

impl CollectionLoop {
    pub fn new(collector: Arc<NodeMetricsCollector>, sink: Arc<dyn MetricSink>) -> Self {
        Self {
            collector,
            sink,
            logger: StructuredLogger::new("kubernetes"),
            health: None,
            metrics: None,
        }
    }

    pub fn collector(&self) -> &Arc<NodeMetricsCollector> {
        &self.collector
    }

    /// Run ticks until `shutdown` fires
    ///
    /// Shutdown stops new ticks from being scheduled; ticks already running
    /// finish and their records are delivered before this returns. The
    /// collector component is left unhealthy afterwards.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.collector.config();
        info!(
            period_secs = config.period.as_secs(),
            node_concurrency = ?config.node_concurrency,
            endpoints = config.additional_endpoints.len(),
            "Starting metrics collection loop"
        );

        let (tx, rx) = mpsc::channel(config.buffer_size);
        let delivery = tokio::spawn(deliver(
            Arc::clone(&self.sink),
            rx,
            self.health.clone(),
            self.metrics.clone(),
        ));

        let mut ticker = interval(config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: JoinSet<(TickSummary, Duration)> = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    ticks.spawn(timed_tick(
                        Arc::clone(&self.collector),
                        tx.clone(),
                        self.metrics.clone(),
                    ));
                }
                Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                    self.finish_tick(joined).await;
                }
                _ = shutdown.recv() => {
                    info!(in_flight = ticks.len(), "Shutting down metrics collection loop");
                    break;
                }
            }
        }

        while let Some(joined) = ticks.join_next().await {
            self.finish_tick(joined).await;
        }
        drop(tx);

        match delivery.await {
            Ok(delivered) => debug!(delivered = delivered, "Delivery task drained"),
            Err(e) => error!(error = %e, "Delivery task failed"),
        }

        if let Some(health) = &self.health {
            health
                .set_unhealthy(components::COLLECTOR, "collection loop stopped")
                .await;
        }
    }

    /// Run a single tick and deliver all of its records
    pub async fn run_once(&self) -> TickSummary {
        let (tx, rx) = mpsc::channel(self.collector.config().buffer_size);
        let delivery = tokio::spawn(deliver(
            Arc::clone(&self.sink),
            rx,
            self.health.clone(),
            self.metrics.clone(),
        ));

        let joined = tokio::spawn(timed_tick(
            Arc::clone(&self.collector),
            tx,
            self.metrics.clone(),
        ))
        .await;
        let summary = self.finish_tick(joined).await;

        if let Err(e) = delivery.await {
            error!(error = %e, "Delivery task failed");
        }
        summary
    }

    async fn finish_tick(
        &self,
        joined: std::result::Result<(TickSummary, Duration), JoinError>,
    ) -> TickSummary {
        match joined {
            Ok((summary, elapsed)) => {
                self.logger
                    .log_tick(summary.records, summary.sources, summary.source_failures, elapsed);
                if let Some(health) = &self.health {
                    health.set_healthy(components::COLLECTOR).await;
                }
                summary
            }
            Err(e) => {
                error!(error = %e, "Collection tick failed");
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::COLLECTOR, format!("collection tick failed: {e}"))
                        .await;
                }
                TickSummary::default()
            }
        }
    }
}

async fn timed_tick(
    collector: Arc<NodeMetricsCollector>,
    tx: mpsc::Sender<MetricRecord>,
    metrics: Option<CollectorMetrics>,
) -> (TickSummary, Duration) {
    let start = Instant::now();
    if let Some(metrics) = &metrics {
        metrics.tick_started();
    }

    let summary = collector.collect(tx).await;

    let elapsed = start.elapsed();
    if let Some(metrics) = &metrics {
        metrics.tick_finished();
        metrics.observe_tick_duration(elapsed);
    }
    (summary, elapsed)
}

/// Hand records to the sink one at a time until every producer is gone
///
/// A rejected record is logged and counted; delivery carries on with the
/// next one. Returns the number of records the sink accepted.
async fn deliver(
    sink: Arc<dyn MetricSink>,
    mut rx: mpsc::Receiver<MetricRecord>,
    health: Option<HealthRegistry>,
    metrics: Option<CollectorMetrics>,
) -> usize {
    let mut delivered = 0;
    let mut degraded = false;

    while let Some(record) = rx.recv().await {
        match sink.send(record).await {
            Ok(()) => {
                delivered += 1;
                if let Some(metrics) = &metrics {
                    metrics.inc_records_delivered();
                }
                if degraded {
                    degraded = false;
                    if let Some(health) = &health {
                        health.set_healthy(components::SINK).await;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to deliver metric record");
                if let Some(metrics) = &metrics {
                    metrics.inc_delivery_errors();
                }
                if !degraded {
                    degraded = true;
                    if let Some(health) = &health {
                        health.set_degraded(components::SINK, e.to_string()).await;
                    }
                }
            }
        }
    }

    delivered
}

/// Builder for creating the collection loop
pub struct CollectionLoopBuilder {
    cluster: Option<Arc<dyn ClusterSource>>,
    endpoints: Option<Arc<dyn EndpointSource>>,
    sink: Option<Arc<dyn MetricSink>>,
    converter: Option<Arc<dyn Converter>>,
    node_tags: Option<Arc<NodeTagCache>>,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
    metrics: Option<CollectorMetrics>,
    config: CollectorConfig,
}

impl CollectionLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            cluster: None,
            endpoints: None,
            sink: None,
            converter: None,
            node_tags: None,
            logger: None,
            health: None,
            metrics: None,
            config: CollectorConfig::default(),
        }
    }

    /// Set the cluster API source
    pub fn cluster(mut self, cluster: Arc<dyn ClusterSource>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Set the source for additional endpoints
    pub fn endpoints(mut self, endpoints: Arc<dyn EndpointSource>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Set the record sink
    pub fn sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the payload converter (default: exposition parser without filters)
    pub fn converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Use the exposition parser with the given filters and rewrites
    pub fn converter_options(self, options: ConverterOptions) -> Self {
        self.converter(Arc::new(ExpositionParser::new(options)))
    }

    /// Share a node tag cache
    pub fn node_tags(mut self, node_tags: Arc<NodeTagCache>) -> Self {
        self.node_tags = Some(node_tags);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn metrics(mut self, metrics: CollectorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: CollectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the collection period
    pub fn period(mut self, period: Duration) -> Self {
        self.config.period = period;
        self
    }

    /// Set the buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Bound the per-node fan-out
    pub fn node_concurrency(mut self, limit: usize) -> Self {
        self.config.node_concurrency = Some(limit);
        self
    }

    pub fn additional_endpoint(mut self, endpoint: AdditionalEndpoint) -> Self {
        self.config.additional_endpoints.push(endpoint);
        self
    }

    /// Build the collection loop
    pub fn build(self) -> Result<CollectionLoop> {
        let cluster = self
            .cluster
            .ok_or_else(|| anyhow::anyhow!("Cluster source is required"))?;
        let sink = self
            .sink
            .ok_or_else(|| anyhow::anyhow!("Metric sink is required"))?;

        if self.config.period.is_zero() {
            anyhow::bail!("Collection period must be greater than zero");
        }
        if self.config.buffer_size == 0 {
            anyhow::bail!("Buffer size must be greater than zero");
        }
        if self.config.node_concurrency == Some(0) {
            anyhow::bail!("Node concurrency must be greater than zero when set");
        }
        if !self.config.additional_endpoints.is_empty() && self.endpoints.is_none() {
            anyhow::bail!("Endpoint source is required when additional endpoints are configured");
        }

        let converter = self
            .converter
            .unwrap_or_else(|| Arc::new(ExpositionParser::default()));

        let mut collector = NodeMetricsCollector::new(cluster, converter, self.config);
        if let Some(endpoints) = self.endpoints {
            collector = collector.with_endpoints(endpoints);
        }
        if let Some(node_tags) = self.node_tags {
            collector = collector.with_node_tags(node_tags);
        }
        if let Some(health) = &self.health {
            collector = collector.with_health(health.clone());
        }
        if let Some(metrics) = &self.metrics {
            collector = collector.with_metrics(metrics.clone());
        }

        let mut collection_loop = CollectionLoop::new(Arc::new(collector), sink);
        if let Some(logger) = self.logger {
            collection_loop.logger = logger;
        }
        collection_loop.health = self.health;
        collection_loop.metrics = self.metrics;

        Ok(collection_loop)
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
