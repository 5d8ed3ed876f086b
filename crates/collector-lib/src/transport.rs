//! HTTP transport for the cluster API and additional scrape endpoints

use crate::collector::{async_trait, parse_node_list, parse_pod_list, ClusterSource, EndpointSource};
use crate::error::{CollectorError, Result};
use crate::models::{NodeDescriptor, PodGroup};
use reqwest::{Certificate, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use url::Url;

const TLS_PORT: u16 = 443;

/// Connection settings for the cluster API
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KubeApiSettings {
    pub host: String,
    pub port: u16,
    /// Trust root used when talking TLS
    pub ca_cert_path: PathBuf,
    /// Service account token sent as bearer auth when talking TLS
    pub token_path: PathBuf,
    pub timeout_secs: u64,
}

impl Default for KubeApiSettings {
    fn default() -> Self {
        Self {
            host: "kubernetes.default.svc.cluster.local".to_string(),
            port: TLS_PORT,
            ca_cert_path: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/ca.crt"),
            token_path: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token"),
            timeout_secs: 30,
        }
    }
}

impl KubeApiSettings {
    /// Port 443 talks TLS with a bearer token; anything else is a local plain proxy
    pub fn uses_tls(&self) -> bool {
        self.port == TLS_PORT
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Cluster API client backing [`ClusterSource`]
pub struct KubeApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl KubeApiClient {
    /// Create a client, reading the CA certificate and token once when TLS is in use
    pub fn new(settings: &KubeApiSettings) -> Result<Self> {
        let mut builder = Client::builder().timeout(settings.timeout());
        let mut token = None;

        let scheme = if settings.uses_tls() {
            let ca_cert = std::fs::read(&settings.ca_cert_path)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&ca_cert)?);
            token = Some(std::fs::read_to_string(&settings.token_path)?.trim().to_string());
            "https"
        } else {
            "http"
        };

        let client = builder.build()?;
        let base_url = Url::parse(&format!("{}://{}:{}/", scheme, settings.host, settings.port))?;

        debug!(base_url = %base_url, tls = settings.uses_tls(), "Cluster API client created");

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET a path relative to the API root and return the body as text
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.base_url.join(path)?;
        debug!(url = %url, "Cluster API request");

        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CollectorError::fetch(path, e))?;

        let status = response.status();
        debug!(url = %url, status = %status, "Cluster API response");
        if status != StatusCode::OK {
            return Err(CollectorError::fetch(path, format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| CollectorError::fetch(path, e))
    }

    /// GET a path relative to the API root and parse the body as JSON
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let body = self.get_text(path).await?;
        serde_json::from_str(&body).map_err(|e| CollectorError::fetch(path, e))
    }
}

#[async_trait]
impl ClusterSource for KubeApiClient {
    async fn nodes(&self) -> Result<Vec<NodeDescriptor>> {
        let list = self.get_json("api/v1/nodes/").await?;
        Ok(parse_node_list(&list))
    }

    async fn pods(&self) -> Result<Vec<PodGroup>> {
        let list = self.get_json("api/v1/pods").await?;
        Ok(parse_pod_list(&list))
    }

    async fn node_metrics(&self, node: &str) -> Result<String> {
        self.get_text(&format!("api/v1/nodes/{}/proxy/metrics", node))
            .await
    }

    async fn cadvisor_metrics(&self, node: &str) -> Result<String> {
        self.get_text(&format!("api/v1/nodes/{}/proxy/metrics/cadvisor", node))
            .await
    }

    async fn node_usage(&self, node: &str) -> Result<Value> {
        self.get_json(&format!("apis/metrics.k8s.io/v1beta1/nodes/{}", node))
            .await
    }

    async fn pods_usage(&self) -> Result<Value> {
        self.get_json("apis/metrics.k8s.io/v1beta1/pods").await
    }
}

/// Plain HTTP client for additional exposition endpoints
pub struct HttpEndpointClient {
    client: Client,
}

impl HttpEndpointClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EndpointSource for HttpEndpointClient {
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)?;
        debug!(url = %parsed, "Endpoint request");

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| CollectorError::fetch(url, e))?;

        let status = response.status();
        debug!(url = %url, status = %status, "Endpoint response");
        if !status.is_success() {
            return Err(CollectorError::fetch(url, format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| CollectorError::fetch(url, e))
    }
}
