//! Trace-gas ingester service.
//!
//! Walks the configured product directories and ingests every file that
//! has not been processed yet, then exits.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use emissions_common::Product;
use ingestion::{PgConnector, Scheduler, TextScanDecoder};
use storage::PgStore;

use config::IngesterConfig;

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Ingest satellite trace-gas scans into PostgreSQL")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/emissions/ingester.yaml", env = "INGESTER_CONFIG")]
    config: PathBuf,

    /// Ingest only this product (default: all configured)
    #[arg(short, long)]
    product: Option<String>,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Serve Prometheus metrics on this address while running
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    if let Some(addr) = args.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus metrics exporter listening");
    }

    info!("Starting trace-gas ingester");

    let config = IngesterConfig::load(&args.config)?;
    let only = args
        .product
        .as_deref()
        .map(str::parse::<Product>)
        .transpose()?;
    let registry = config.registry();
    info!(
        products = ?registry.iter().map(|(p, _)| p.name()).collect::<Vec<_>>(),
        workers = config.ingestion.workers,
        "Loaded configuration"
    );

    // An unreachable store at startup is fatal.
    let store = PgStore::connect_with(&config.database_url, config.max_connections)
        .await
        .context("Failed to connect to database")?;
    store
        .migrate(registry.iter().map(|(_, spec)| &spec.table))
        .await
        .context("Failed to apply schema")?;

    let scheduler = Scheduler::new(
        Arc::new(PgConnector::new(config.database_url.clone())),
        Arc::new(TextScanDecoder),
        config.ingestion.clone(),
    )?;

    let jobs = config.jobs(&registry, only)?;
    let progress = scheduler.run(&jobs).await;

    let failed: usize = progress.iter().map(|p| p.failed).sum();
    let observations: u64 = progress.iter().map(|p| p.observations).sum();
    info!(
        products = progress.len(),
        observations,
        failed,
        "Ingestion run complete"
    );

    if failed > 0 {
        warn!(failed, "Some files failed and will be retried on the next run");
        anyhow::bail!("{} file(s) failed to ingest", failed);
    }

    Ok(())
}
