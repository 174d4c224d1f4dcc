//! Tollgate credit ingestion daemon.
//!
//! Runs the ledger-sync pipeline alone, without the HTTP surface. Useful for
//! backfilling a fresh database from the relay's stored events or for running
//! ingestion as a sidecar.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use tollgate_core::Config;
use tollgate_ingest::{CreditPipeline, RelayClient};
use tollgate_store::{LedgerStore, TokenLedger};

/// Tollgate credit ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "tollgate-ingest")]
#[command(about = "Relay credit ingestion daemon", long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, short, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    let pool = tollgate_store::connect(&config.database.dsn())
        .await
        .context("failed to connect to PostgreSQL")?;
    let ledger = TokenLedger::new(LedgerStore::new(pool));

    let relay = RelayClient::connect(&config.nostr)
        .await
        .context("failed to connect to relay")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let pipeline = CreditPipeline::new(relay.clone(), ledger);
    pipeline.run(shutdown_rx).await;

    relay.disconnect().await.ok();

    Ok(())
}
