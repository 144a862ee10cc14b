use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use gatewatch::config::ServiceConfig;
use gatewatch::Metrics;

/// Gatewatch - metrics collector and stats endpoint for request-routing gateways
#[derive(Parser, Debug)]
#[command(name = "gatewatch")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level, overrides the configuration file
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let service = ServiceConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;

    let level = args.log_level.as_deref().unwrap_or(&service.log_level);
    gatewatch::logging::init_subscriber(level)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging subsystem: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut metrics = Metrics::new(&service.extra_config, shutdown_rx.clone());

    if let Some(cfg) = metrics.config() {
        tracing::info!(
            config_file = %args.config.display(),
            collection_time_ms = cfg.collection_time.as_millis() as u64,
            listen_address = %cfg.listen_address,
            router_disabled = cfg.router_disabled,
            proxy_disabled = cfg.proxy_disabled,
            backend_disabled = cfg.backend_disabled,
            endpoint_disabled = cfg.endpoint_disabled,
            endpoints = service.endpoints.len(),
            "Configuration loaded successfully"
        );
    }

    let aggregator = metrics.aggregator_handle();
    let metrics = Arc::new(metrics);
    let endpoint = metrics.run_endpoint(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    for task in [aggregator, endpoint].into_iter().flatten() {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    Ok(())
}
