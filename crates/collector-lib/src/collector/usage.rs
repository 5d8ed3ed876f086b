//! Record builders for structured (non-exposition) payloads

use super::NodeTagCache;
use crate::error::{CollectorError, Result};
use crate::models::{MetricKind, MetricRecord, PodGroup, Tag};
use crate::quantity::{parse_cpu, parse_memory};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

pub const NODE_PREFIX: &str = "node";
pub const POD_PREFIX: &str = "pod";

fn non_digits() -> &'static Regex {
    static NON_DIGITS: OnceLock<Regex> = OnceLock::new();
    NON_DIGITS.get_or_init(|| Regex::new(r"\D+").expect("non-digit pattern"))
}

fn usage_value(payload: &Value, field: &str) -> Result<f64> {
    let raw = payload
        .get("usage")
        .and_then(|usage| usage.get(field))
        .and_then(Value::as_str)
        .ok_or_else(|| CollectorError::Conversion {
            line: 0,
            reason: format!("usage payload has no `usage.{field}`"),
        })?;

    let digits = non_digits().replace_all(raw, "");
    digits
        .parse::<u64>()
        .map(|value| value as f64)
        .map_err(|e| CollectorError::Conversion {
            line: 0,
            reason: format!("usage.{field} `{raw}` is not a number: {e}"),
        })
}

/// Build the `<prefix>.cpu` and `<prefix>.memory` counters from a usage payload
///
/// The raw values are reduced to their digits before parsing, so `"1024Ki"`
/// reports `1024`. A missing field or a value without digits is a
/// conversion error (reported with line 0, the payload is not line based).
pub fn usage_records(prefix: &str, payload: &Value, tags: &[Tag]) -> Result<[MetricRecord; 2]> {
    let cpu = usage_value(payload, "cpu")?;
    let memory = usage_value(payload, "memory")?;

    Ok([
        MetricRecord::new(format!("{prefix}.cpu"), cpu, tags.to_vec(), MetricKind::Counter),
        MetricRecord::new(
            format!("{prefix}.memory"),
            memory,
            tags.to_vec(),
            MetricKind::Counter,
        ),
    ])
}

/// Build usage records for every container in a cluster-wide pod usage payload
///
/// Each container is tagged with its name only, under the `pod_name` key
/// that pod usage dashboards group by. A malformed entry is logged
/// and skipped; it never affects its siblings.
pub fn pod_usage_records(payload: &Value) -> Vec<MetricRecord> {
    let containers = payload
        .get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|pod| pod.get("containers").and_then(Value::as_array))
        .flatten();

    let mut records = Vec::new();
    for container in containers {
        let Some(name) = container.get("name").and_then(Value::as_str) else {
            warn!("Skipping container usage entry without a name");
            continue;
        };

        match usage_records(POD_PREFIX, container, &[Tag::new("pod_name", name)]) {
            Ok(pair) => records.extend(pair),
            Err(e) => warn!(container = %name, error = %e, "Skipping malformed container usage"),
        }
    }
    records
}

/// Build the inventory records for one pod group
///
/// A `pod` gauge with the group's replica count, then four gauges per
/// container of the representative pod: CPU limit and request in
/// millicores, memory limit and request in bytes.
pub fn pod_group_records(group: &PodGroup, node_tags: &NodeTagCache) -> Vec<MetricRecord> {
    let pod_tag = Tag::new("pod_name", &group.name);
    let owner_tags = group
        .node_name
        .as_deref()
        .map(|node| node_tags.tags_for(node))
        .unwrap_or_default();

    let mut records = Vec::with_capacity(1 + group.containers.len() * 4);
    records.push(MetricRecord::new(
        POD_PREFIX,
        group.pod_count as f64,
        vec![pod_tag.clone()],
        MetricKind::Gauge,
    ));

    for container in &group.containers {
        let mut tags = vec![pod_tag.clone(), Tag::new("container_name", &container.name)];
        tags.extend_from_slice(&owner_tags);

        let specs = [
            ("pod.cpu.limit", parse_cpu(container.cpu_limit.as_deref())),
            ("pod.memory.limit", parse_memory(container.memory_limit.as_deref())),
            ("pod.cpu.request", parse_cpu(container.cpu_request.as_deref())),
            ("pod.memory.request", parse_memory(container.memory_request.as_deref())),
        ];
        records.extend(
            specs
                .into_iter()
                .map(|(name, value)| MetricRecord::new(name, value, tags.clone(), MetricKind::Gauge)),
        );
    }

    records
}
