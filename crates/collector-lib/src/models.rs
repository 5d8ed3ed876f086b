//! Core data models for the collector

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key/value label attached to a metric record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Kind of a metric record as understood by the monitoring backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Timer,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Timer => "timer",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single converted sample, ready for the sink
///
/// Records are immutable once built; tags keep their insertion order and
/// duplicate keys are preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    name: String,
    value: f64,
    tags: Vec<Tag>,
    kind: MetricKind,
}

impl MetricRecord {
    pub fn new(name: impl Into<String>, value: f64, tags: Vec<Tag>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            value,
            tags,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Look up the first tag value with the given key
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    /// Render the record in the backend line protocol:
    /// `<namespace>.<kind>.<name>[,<key>=<value>...] <value> <timestamp>`
    pub fn to_metric_line(&self, namespace: &str, timestamp: i64) -> String {
        let mut line = String::with_capacity(64);
        if !namespace.is_empty() {
            line.push_str(namespace);
            line.push('.');
        }
        line.push_str(self.kind.as_str());
        line.push('.');
        line.push_str(&self.name);
        for tag in &self.tags {
            line.push(',');
            line.push_str(&tag.key);
            line.push('=');
            line.push_str(&tag.value);
        }
        line.push_str(&format!(" {} {}", self.value, timestamp));
        line
    }
}

/// Cluster node as seen by one collection tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    pub role: Option<String>,
}

impl NodeDescriptor {
    /// Enrichment tags for everything collected from this node
    pub fn tags(&self) -> Vec<Tag> {
        let mut tags = vec![Tag::new("node", &self.name)];
        if let Some(role) = &self.role {
            tags.push(Tag::new("role", role));
        }
        tags
    }
}

/// Declared resources of one container, as raw quantity strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResourceSpec {
    pub name: String,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
    pub cpu_request: Option<String>,
    pub memory_request: Option<String>,
}

/// Pods sharing a canonical name, treated as one workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodGroup {
    /// Canonical pod name (generated suffix removed)
    pub name: String,
    pub pod_count: usize,
    /// Node of the representative pod
    pub node_name: Option<String>,
    /// Containers of the representative pod
    pub containers: Vec<ContainerResourceSpec>,
}
