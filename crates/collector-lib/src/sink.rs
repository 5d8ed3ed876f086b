//! Metric sinks

use crate::collector::{async_trait, MetricSink};
use crate::error::Result;
use crate::models::MetricRecord;
use chrono::Utc;
use tracing::info;

/// Dry-run sink that writes each record as a metric line on the `metrics` target
#[derive(Debug, Clone)]
pub struct LogSink {
    namespace: String,
}

impl LogSink {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Render a record stamped with the current Unix time
    pub fn render(&self, record: &MetricRecord) -> String {
        record.to_metric_line(&self.namespace, Utc::now().timestamp())
    }
}

#[async_trait]
impl MetricSink for LogSink {
    async fn send(&self, record: MetricRecord) -> Result<()> {
        let line = self.render(&record);
        info!(target: "metrics", line = %line, "metric");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricKind, Tag};

    #[test]
    fn test_render_uses_namespace_and_tags() {
        let sink = LogSink::new("kubernetes");
        let record = MetricRecord::new(
            "pod.cpu",
            250.0,
            vec![Tag::new("node", "node-a"), Tag::new("role", "worker")],
            MetricKind::Counter,
        );

        let before = Utc::now().timestamp();
        let line = sink.render(&record);

        let (head, timestamp) = line.rsplit_once(' ').unwrap();
        assert_eq!(head, "kubernetes.counter.pod.cpu,node=node-a,role=worker 250");
        assert!(timestamp.parse::<i64>().unwrap() >= before);
    }

    #[tokio::test]
    async fn test_send_accepts_records() {
        let sink = LogSink::new("kubernetes");
        let record = MetricRecord::new("pod", 2.0, vec![], MetricKind::Gauge);
        assert!(sink.send(record).await.is_ok());
    }
}
