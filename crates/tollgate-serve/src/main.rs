//! Tollgate daemon.
//!
//! Hosts the HTTP surface and the relay credit pipeline in one process: load
//! the configuration, connect PostgreSQL (running migrations) and the relay,
//! spawn the supervised ingestion task, and serve the API until ctrl-c.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::Request;
use clap::Parser;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use tollgate_core::Config;
use tollgate_ingest::{CreditPipeline, RelayClient};
use tollgate_serve::chat::ChatClient;
use tollgate_serve::{router, AppState};
use tollgate_store::{LedgerStore, TokenLedger};

/// Tollgate metered chat-completion proxy.
#[derive(Parser, Debug)]
#[command(name = "tollgate-serve")]
#[command(about = "Metered chat-completion proxy", long_about = None)]
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

    let config = Arc::new(
        Config::load(&args.config)
            .with_context(|| format!("failed to load config from {}", args.config.display()))?,
    );

    // Storage
    let pool = tollgate_store::connect(&config.database.dsn())
        .await
        .context("failed to connect to PostgreSQL")?;
    let store = LedgerStore::new(pool);
    let ledger = TokenLedger::new(store.clone());

    // Relay: one connection shared between the credit subscription and the
    // orchestrator's debit publisher.
    let relay = RelayClient::connect(&config.nostr)
        .await
        .context("failed to connect to relay")?;

    let chat = ChatClient::new(config.chat.api_key.clone());

    // Credit ingestion in the background, supervised.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = CreditPipeline::new(relay.clone(), ledger);
    let pipeline_handle = tokio::spawn(async move {
        pipeline.run(shutdown_rx).await;
    });

    // HTTP surface
    let state = AppState::new(config.clone(), store, chat, relay.clone());
    let app = router(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Stop the pipeline and release the relay connection.
    let _ = shutdown_tx.send(true);
    let _ = pipeline_handle.await;
    relay.disconnect().await.ok();

    Ok(())
}
