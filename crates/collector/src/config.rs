//! Collector settings
//!
//! Loaded from an optional file followed by `COLLECTOR_*` environment
//! variables, which take precedence. Nested keys use `__`, for example
//! `COLLECTOR_KUBE__PORT=8001`.

use anyhow::{Context, Result};
use collector_lib::{
    collector::{AdditionalEndpoint, CollectorConfig},
    converter::{ConverterOptions, IgnoreRule, TagReplacementRule},
    transport::KubeApiSettings,
    Tag,
};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "COLLECTOR";

/// One tag value substitution
#[derive(Debug, Clone, Deserialize)]
pub struct TagReplacementSetting {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

/// An extra exposition endpoint and its static tags
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSetting {
    pub url: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Collector settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds between collection ticks
    pub period_secs: u64,

    pub nodes_disabled: bool,
    pub cadvisor_disabled: bool,
    pub metrics_server_disabled: bool,
    pub pods_disabled: bool,

    /// Maximum nodes scraped at once; unbounded when unset
    pub node_concurrency: Option<usize>,
    pub buffer_size: usize,

    pub ignore_metrics: Vec<String>,
    pub ignore_metrics_regex: Option<String>,
    pub ignore_tags: Vec<String>,
    pub ignore_tags_regex: Option<String>,
    pub tag_replacements: Vec<TagReplacementSetting>,

    pub additional_endpoints: Vec<EndpointSetting>,

    /// Prefix of every emitted metric line
    pub namespace: String,

    /// API server port for health/metrics
    pub api_port: u16,

    pub kube: KubeApiSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            period_secs: 60,
            nodes_disabled: false,
            cadvisor_disabled: false,
            metrics_server_disabled: false,
            pods_disabled: false,
            node_concurrency: None,
            buffer_size: 1000,
            ignore_metrics: Vec::new(),
            ignore_metrics_regex: None,
            ignore_tags: Vec::new(),
            ignore_tags_regex: None,
            tag_replacements: Vec::new(),
            additional_endpoints: Vec::new(),
            namespace: "kubernetes".to_string(),
            api_port: 8080,
            kube: KubeApiSettings::default(),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("ignore_metrics")
        .with_list_parse_key("ignore_tags")
}

impl Settings {
    /// Load settings from the optional file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_sources(path, environment())
    }

    fn from_sources(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(env)
            .build()
            .context("Failed to load collector settings")?;

        config
            .try_deserialize()
            .context("Invalid collector settings")
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            period: Duration::from_secs(self.period_secs),
            node_metrics: !self.nodes_disabled,
            cadvisor_metrics: !self.cadvisor_disabled,
            usage_metrics: !self.metrics_server_disabled,
            pod_inventory: !self.pods_disabled,
            node_concurrency: self.node_concurrency,
            buffer_size: self.buffer_size,
            additional_endpoints: self
                .additional_endpoints
                .iter()
                .map(|endpoint| {
                    let tags = endpoint
                        .tags
                        .iter()
                        .map(|(key, value)| Tag::new(key, value))
                        .collect();
                    AdditionalEndpoint::new(&endpoint.url, tags)
                })
                .collect(),
        }
    }

    /// Converter rules; invalid patterns are logged and left out
    pub fn converter_options(&self) -> ConverterOptions {
        ConverterOptions::new()
            .with_ignore_metric_names(IgnoreRule::new(
                self.ignore_metrics.iter().cloned(),
                self.ignore_metrics_regex.as_deref(),
            ))
            .with_ignore_tag_names(IgnoreRule::new(
                self.ignore_tags.iter().cloned(),
                self.ignore_tags_regex.as_deref(),
            ))
            .with_tag_value_replacements(TagReplacementRule::new(
                self.tag_replacements
                    .iter()
                    .map(|r| (r.pattern.as_str(), r.replacement.clone())),
            ))
    }

    pub fn kube_settings(&self) -> &KubeApiSettings {
        &self.kube
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_sources(None, env_from(&[])).unwrap();

        assert_eq!(settings.period_secs, 60);
        assert_eq!(settings.namespace, "kubernetes");
        assert_eq!(settings.api_port, 8080);
        assert!(settings.kube.uses_tls());

        let config = settings.collector_config();
        assert_eq!(config.period, Duration::from_secs(60));
        assert!(config.node_metrics && config.cadvisor_metrics);
        assert!(config.usage_metrics && config.pod_inventory);
        assert_eq!(config.node_concurrency, None);
        assert_eq!(config.buffer_size, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.toml");
        std::fs::write(
            &path,
            r#"
period_secs = 30
cadvisor_disabled = true
node_concurrency = 4
ignore_metrics = ["go_goroutines"]
ignore_tags_regex = "^pod_"

[[tag_replacements]]
pattern = "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
replacement = "_uuid_"

[[tag_replacements]]
pattern = ""
replacement = "skipped"

[[additional_endpoints]]
url = "http://exporter:9100/metrics"
tags = { team = "infra", app = "exporter" }

[kube]
host = "127.0.0.1"
port = 8001
"#,
        )
        .unwrap();

        let settings = Settings::from_sources(Some(&path), env_from(&[])).unwrap();
        assert_eq!(settings.kube.host, "127.0.0.1");
        assert!(!settings.kube.uses_tls());

        let config = settings.collector_config();
        assert_eq!(config.period, Duration::from_secs(30));
        assert!(!config.cadvisor_metrics);
        assert!(config.node_metrics);
        assert_eq!(config.node_concurrency, Some(4));

        let endpoint = &config.additional_endpoints[0];
        assert_eq!(endpoint.url, "http://exporter:9100/metrics");
        assert_eq!(
            endpoint.tags,
            vec![Tag::new("app", "exporter"), Tag::new("team", "infra")]
        );

        let options = settings.converter_options();
        assert!(options.ignore_metric_names.matches("go_goroutines"));
        assert!(options.ignore_tag_names.matches("pod_name"));
        assert_eq!(options.tag_value_replacements.len(), 1);
        assert_eq!(
            options
                .tag_value_replacements
                .apply("a1b2c3d4-0000-1111-2222-333344445555"),
            "_uuid_"
        );
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.toml");
        std::fs::write(&path, "period_secs = 30\nnamespace = \"staging\"\n").unwrap();

        let env = env_from(&[
            ("COLLECTOR_PERIOD_SECS", "15"),
            ("COLLECTOR_PODS_DISABLED", "true"),
            ("COLLECTOR_IGNORE_METRICS", "up,scrape_duration_seconds"),
            ("COLLECTOR_KUBE__PORT", "8001"),
        ]);
        let settings = Settings::from_sources(Some(&path), env).unwrap();

        assert_eq!(settings.period_secs, 15);
        assert_eq!(settings.namespace, "staging");
        assert!(settings.pods_disabled);
        assert_eq!(settings.kube.port, 8001);
        assert_eq!(
            settings.ignore_metrics,
            vec!["up".to_string(), "scrape_duration_seconds".to_string()]
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Settings::from_sources(Some(&path), env_from(&[])).is_err());
    }

    #[test]
    fn test_invalid_ignore_pattern_disables_pattern_only() {
        let settings = Settings {
            ignore_metrics: vec!["up".to_string()],
            ignore_metrics_regex: Some("(".to_string()),
            ..Default::default()
        };

        let options = settings.converter_options();
        assert!(options.ignore_metric_names.matches("up"));
        assert!(!options.ignore_metric_names.matches("up_total"));
    }
}
