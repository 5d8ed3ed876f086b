//! Periodic collection from the cluster
//!
//! This module drives every tick: it fetches the node and pod inventory,
//! fans out per-node scrapes, turns each payload into metric records and
//! streams them to the sink. Data sources and the sink sit behind the
//! traits below so the orchestration can run against any transport.

mod inventory;
mod r#loop;
mod node_tags;
mod orchestrator;
mod usage;


pub use inventory::{canonical_pod_name, parse_node_list, parse_pod_list, ROLE_LABEL};
pub use node_tags::NodeTagCache;
pub use orchestrator::{NodeMetricsCollector, TickSummary};
pub use r#loop::{AdditionalEndpoint, CollectionLoop, CollectionLoopBuilder, CollectorConfig};
pub use usage::{pod_group_records, pod_usage_records, usage_records, NODE_PREFIX, POD_PREFIX};

use crate::error::Result;
use crate::models::{MetricRecord, NodeDescriptor, PodGroup};
use serde_json::Value;

pub use async_trait::async_trait;

/// Cluster API data needed by one tick
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// List the nodes of the cluster
    async fn nodes(&self) -> Result<Vec<NodeDescriptor>>;

    /// List the pods of the cluster, grouped by canonical name
    async fn pods(&self) -> Result<Vec<PodGroup>>;

    /// Exposition text of the node's own metrics endpoint
    async fn node_metrics(&self, node: &str) -> Result<String>;

    /// Exposition text of the node's cAdvisor endpoint
    async fn cadvisor_metrics(&self, node: &str) -> Result<String>;

    /// Aggregated usage of one node (`{"usage": {"cpu", "memory"}}`)
    async fn node_usage(&self, node: &str) -> Result<Value>;

    /// Aggregated usage of every pod (`{"items": [{"containers": [...]}]}`)
    async fn pods_usage(&self) -> Result<Value>;
}

/// Source of exposition text for additional endpoints
#[async_trait]
pub trait EndpointSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Downstream consumer of metric records, one record at a time
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn send(&self, record: MetricRecord) -> Result<()>;
}
