//! One collection tick
//!
//! Every source runs as its own task and pushes records into a bounded
//! channel, so a slow sink pauses producers instead of growing a buffer.
//! A failing source is logged and counted; it never cancels its siblings.

use super::usage::{pod_group_records, pod_usage_records, usage_records, NODE_PREFIX};
use super::{AdditionalEndpoint, ClusterSource, CollectorConfig, EndpointSource, NodeTagCache};
use crate::converter::{Conversion, Converter};
use crate::error::{CollectorError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::{MetricRecord, NodeDescriptor, Tag};
use crate::observability::CollectorMetrics;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Source labels used in logs and the `source` metric label
mod sources {
    pub const NODE_INVENTORY: &str = "node_inventory";
    pub const POD_INVENTORY: &str = "pod_inventory";
    pub const NODE_METRICS: &str = "node_metrics";
    pub const CADVISOR_METRICS: &str = "cadvisor_metrics";
    pub const NODE_USAGE: &str = "node_usage";
    pub const PODS_USAGE: &str = "pods_usage";
    pub const ENDPOINT: &str = "endpoint";
}

const CLUSTER_ORIGIN: &str = "cluster";

/// Outcome of one tick, or of any part of it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Records handed to the delivery channel
    pub records: usize,
    /// Sources attempted (inventory fetches included)
    pub sources: usize,
    /// Sources that failed to fetch or convert
    pub source_failures: usize,
}

impl TickSummary {
    pub fn merge(&mut self, other: TickSummary) {
        self.records += other.records;
        self.sources += other.sources;
        self.source_failures += other.source_failures;
    }
}

/// Pushes records into the tick channel, counting what was accepted
struct Emitter<'a> {
    tx: &'a mpsc::Sender<MetricRecord>,
    sent: usize,
    closed: bool,
}

impl<'a> Emitter<'a> {
    fn new(tx: &'a mpsc::Sender<MetricRecord>) -> Self {
        Self {
            tx,
            sent: 0,
            closed: false,
        }
    }

    /// Wait for channel capacity and queue one record
    async fn emit(&mut self, record: MetricRecord) {
        if self.closed {
            return;
        }
        if self.tx.send(record).await.is_err() {
            debug!("Record channel closed, dropping remaining records");
            self.closed = true;
        } else {
            self.sent += 1;
        }
    }

    async fn emit_all(&mut self, records: impl IntoIterator<Item = MetricRecord>) {
        for record in records {
            self.emit(record).await;
        }
    }

    /// Queue records as the conversion yields them; a terminal failure is returned
    async fn emit_conversion(&mut self, conversion: Conversion<'_>) -> Result<()> {
        for record in conversion {
            self.emit(record?).await;
            if self.closed {
                break;
            }
        }
        Ok(())
    }
}

async fn when(enabled: bool, work: impl Future<Output = TickSummary>) -> Option<TickSummary> {
    if enabled {
        Some(work.await)
    } else {
        None
    }
}

async fn drain(tasks: &mut JoinSet<TickSummary>) -> TickSummary {
    let mut summary = TickSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(part) => summary.merge(part),
            Err(e) => {
                error!(error = %e, "Collection task failed");
                summary.sources += 1;
                summary.source_failures += 1;
            }
        }
    }
    summary
}

/// Runs collection ticks against the cluster and additional endpoints
pub struct NodeMetricsCollector {
    cluster: Arc<dyn ClusterSource>,
    endpoints: Option<Arc<dyn EndpointSource>>,
    converter: Arc<dyn Converter>,
    node_tags: Arc<NodeTagCache>,
    config: CollectorConfig,
    health: Option<HealthRegistry>,
    metrics: Option<CollectorMetrics>,
}

impl NodeMetricsCollector {
    pub fn new(
        cluster: Arc<dyn ClusterSource>,
        converter: Arc<dyn Converter>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            cluster,
            endpoints: None,
            converter,
            node_tags: Arc::new(NodeTagCache::new()),
            config,
            health: None,
            metrics: None,
        }
    }

    /// Source used for the configured additional endpoints
    pub fn with_endpoints(mut self, endpoints: Arc<dyn EndpointSource>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Share an existing node tag cache instead of a private one
    pub fn with_node_tags(mut self, node_tags: Arc<NodeTagCache>) -> Self {
        self.node_tags = node_tags;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_metrics(mut self, metrics: CollectorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn node_tags(&self) -> &Arc<NodeTagCache> {
        &self.node_tags
    }

    /// Run one tick, queueing every record on `tx`
    ///
    /// Returns once every source has finished. Records are handed over as
    /// they are produced; `tx` applies backpressure when the consumer lags.
    pub async fn collect(self: Arc<Self>, tx: mpsc::Sender<MetricRecord>) -> TickSummary {
        let mut tasks = JoinSet::new();

        if self.config.usage_metrics {
            tasks.spawn(Arc::clone(&self).collect_pods_usage(tx.clone()));
        }
        if self.config.pod_inventory {
            tasks.spawn(Arc::clone(&self).collect_pod_inventory(tx.clone()));
        }
        if self.config.scrapes_nodes() || self.config.pod_inventory {
            tasks.spawn(Arc::clone(&self).collect_nodes(tx.clone()));
        }
        for endpoint in self.config.additional_endpoints.iter().cloned() {
            tasks.spawn(Arc::clone(&self).collect_endpoint(endpoint, tx.clone()));
        }
        drop(tx);

        drain(&mut tasks).await
    }

    /// Record the outcome of one source
    fn tally(&self, source: &'static str, origin: &str, sent: usize, outcome: Result<()>) -> TickSummary {
        let mut summary = TickSummary {
            records: sent,
            sources: 1,
            source_failures: 0,
        };

        if let Err(e) = outcome {
            warn!(
                source = source,
                origin = %origin,
                records = sent,
                error = %e,
                "Source failed, skipping it for this tick"
            );
            if let Some(metrics) = &self.metrics {
                metrics.inc_source_errors(source);
            }
            summary.source_failures = 1;
        }

        summary
    }

    async fn inventory_fetched(&self) {
        if let Some(health) = &self.health {
            health.set_healthy(components::CLUSTER_API).await;
        }
    }

    async fn inventory_failed(&self, source: &'static str, e: CollectorError) -> TickSummary {
        if let Some(health) = &self.health {
            health
                .set_degraded(components::CLUSTER_API, e.to_string())
                .await;
        }
        self.tally(source, CLUSTER_ORIGIN, 0, Err(e))
    }

    /// Fetch the node list, refresh the tag cache and fan out per node
    async fn collect_nodes(self: Arc<Self>, tx: mpsc::Sender<MetricRecord>) -> TickSummary {
        let nodes = match self.cluster.nodes().await {
            Ok(nodes) => {
                self.inventory_fetched().await;
                nodes
            }
            Err(e) => return self.inventory_failed(sources::NODE_INVENTORY, e).await,
        };

        debug!(nodes = nodes.len(), "Fetched node inventory");
        if let Some(metrics) = &self.metrics {
            metrics.set_nodes_discovered(nodes.len());
        }
        for node in &nodes {
            self.node_tags.insert_node(node);
        }

        let mut summary = self.tally(sources::NODE_INVENTORY, CLUSTER_ORIGIN, 0, Ok(()));
        if !self.config.scrapes_nodes() {
            return summary;
        }

        let limiter = self
            .config
            .node_concurrency
            .map(|permits| Arc::new(Semaphore::new(permits.max(1))));

        let mut fanout = JoinSet::new();
        for node in nodes {
            let this = Arc::clone(&self);
            let tx = tx.clone();
            let limiter = limiter.clone();
            fanout.spawn(async move {
                let _permit = match &limiter {
                    Some(limiter) => limiter.acquire().await.ok(),
                    None => None,
                };
                this.collect_node(node, &tx).await
            });
        }

        summary.merge(drain(&mut fanout).await);
        summary
    }

    /// Scrape the enabled per-node sources concurrently
    async fn collect_node(&self, node: NodeDescriptor, tx: &mpsc::Sender<MetricRecord>) -> TickSummary {
        let tags = node.tags();
        let name = node.name.as_str();

        let (metrics, cadvisor, usage) = tokio::join!(
            when(
                self.config.node_metrics,
                self.forward_text(
                    sources::NODE_METRICS,
                    name,
                    self.cluster.node_metrics(name),
                    &tags,
                    tx
                )
            ),
            when(
                self.config.cadvisor_metrics,
                self.forward_text(
                    sources::CADVISOR_METRICS,
                    name,
                    self.cluster.cadvisor_metrics(name),
                    &tags,
                    tx
                )
            ),
            when(self.config.usage_metrics, self.node_usage(name, &tags, tx)),
        );

        let mut summary = TickSummary::default();
        for part in [metrics, cadvisor, usage].into_iter().flatten() {
            summary.merge(part);
        }
        summary
    }

    /// Fetch exposition text and convert it with the given tags appended
    async fn forward_text(
        &self,
        source: &'static str,
        origin: &str,
        fetch: impl Future<Output = Result<String>>,
        tags: &[Tag],
        tx: &mpsc::Sender<MetricRecord>,
    ) -> TickSummary {
        let mut out = Emitter::new(tx);
        let outcome: Result<()> = async {
            let text = fetch.await?;
            out.emit_conversion(self.converter.convert(&text, tags)).await
        }
        .await;
        self.tally(source, origin, out.sent, outcome)
    }

    async fn node_usage(&self, node: &str, tags: &[Tag], tx: &mpsc::Sender<MetricRecord>) -> TickSummary {
        let mut out = Emitter::new(tx);
        let outcome: Result<()> = async {
            let payload = self.cluster.node_usage(node).await?;
            out.emit_all(usage_records(NODE_PREFIX, &payload, tags)?).await;
            Ok(())
        }
        .await;
        self.tally(sources::NODE_USAGE, node, out.sent, outcome)
    }

    async fn collect_pods_usage(self: Arc<Self>, tx: mpsc::Sender<MetricRecord>) -> TickSummary {
        let mut out = Emitter::new(&tx);
        let outcome: Result<()> = async {
            let payload = self.cluster.pods_usage().await?;
            out.emit_all(pod_usage_records(&payload)).await;
            Ok(())
        }
        .await;
        self.tally(sources::PODS_USAGE, CLUSTER_ORIGIN, out.sent, outcome)
    }

    /// Report each pod group once, tagged with its owning node
    async fn collect_pod_inventory(self: Arc<Self>, tx: mpsc::Sender<MetricRecord>) -> TickSummary {
        let groups = match self.cluster.pods().await {
            Ok(groups) => {
                self.inventory_fetched().await;
                groups
            }
            Err(e) => return self.inventory_failed(sources::POD_INVENTORY, e).await,
        };

        debug!(groups = groups.len(), "Fetched pod inventory");
        let mut out = Emitter::new(&tx);
        for group in &groups {
            out.emit_all(pod_group_records(group, &self.node_tags)).await;
        }
        self.tally(sources::POD_INVENTORY, CLUSTER_ORIGIN, out.sent, Ok(()))
    }

    async fn collect_endpoint(
        self: Arc<Self>,
        endpoint: AdditionalEndpoint,
        tx: mpsc::Sender<MetricRecord>,
    ) -> TickSummary {
        let Some(endpoints) = self.endpoints.clone() else {
            let e = CollectorError::fetch(&endpoint.url, "no endpoint source configured");
            return self.tally(sources::ENDPOINT, &endpoint.url, 0, Err(e));
        };

        self.forward_text(
            sources::ENDPOINT,
            &endpoint.url,
            endpoints.fetch(&endpoint.url),
            &endpoint.tags,
            &tx,
        )
        .await
    }
}
