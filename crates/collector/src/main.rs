//! Kubernetes metrics collector
//!
//! Runs as a single deployment per cluster, periodically scraping node,
//! cAdvisor, metrics-server and pod inventory data through the cluster API
//! and forwarding it as metric records.

use anyhow::{Context, Result};
use clap::Parser;
use collector_lib::{
    collector::CollectionLoopBuilder,
    health::HealthRegistry,
    observability::{CollectorMetrics, StructuredLogger},
    sink::LogSink,
    transport::{HttpEndpointClient, KubeApiClient},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const COLLECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Kubernetes metrics collector
#[derive(Parser, Debug)]
#[command(name = "k8s-metrics-collector")]
#[command(author, version, about = "Periodic Kubernetes metrics collector", long_about = None)]
struct Args {
    /// Settings file (toml, yaml or json); environment variables override it
    #[arg(long, short, env = "COLLECTOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting k8s-metrics-collector");

    let settings = config::Settings::load(args.config.as_deref())?;
    let collector_config = settings.collector_config();
    info!(
        host = %settings.kube.host,
        port = settings.kube.port,
        period_secs = settings.period_secs,
        endpoints = collector_config.additional_endpoints.len(),
        "Collector configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = CollectorMetrics::new();
    let logger = StructuredLogger::new(&settings.namespace);

    let cluster = KubeApiClient::new(settings.kube_settings())
        .context("Failed to create cluster API client")?;
    let endpoints = HttpEndpointClient::new(settings.kube.timeout())
        .context("Failed to create endpoint client")?;

    let collection_loop = CollectionLoopBuilder::new()
        .cluster(Arc::new(cluster))
        .endpoints(Arc::new(endpoints))
        .sink(Arc::new(LogSink::new(&settings.namespace)))
        .converter_options(settings.converter_options())
        .config(collector_config)
        .logger(logger.clone())
        .health(health_registry.clone())
        .metrics(metrics)
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));

    logger.log_startup(COLLECTOR_VERSION, collection_loop.collector().config().period);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(collection_loop.run(shutdown_rx));

    health_registry.set_ready(true).await;

    let api_port = settings.api_port;
    let api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state, api_shutdown).await {
            error!(error = %e, "API server failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    // Receiver may already be gone if the loop exited on its own
    let _ = shutdown_tx.send(());
    loop_handle.await.context("Collection loop panicked")?;
    api_handle.await.context("API server panicked")?;

    info!("Shutdown complete");
    Ok(())
}
