//! CAG gateway server entry point.
//!
//! Boots the HTTP API on `bind_addr`. Logging goes to stderr as JSON.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use cag_client::{CrawlConfig, GeminiBackend, GeminiConfig, HttpCrawler};
use cag_core::{AppConfig, Orchestrator, store};

mod error;
mod maintenance;
mod monitor;
mod routes;
mod state;

use state::AppState;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    if config.require_google_api_key().is_err() {
        tracing::warn!("CAG_GOOGLE_API_KEY not set; generation requests will fail until it is configured");
    }

    let store = store::open(&config).await?;
    let crawler = HttpCrawler::new(CrawlConfig::from_app(&config))?;
    let llm = GeminiBackend::new(GeminiConfig::from_app(&config))?;
    let orchestrator = Orchestrator::new(&config, store, Arc::new(crawler), Arc::new(llm));

    let state = AppState::new(config.clone(), orchestrator);
    maintenance::spawn(state.clone(), maintenance::INTERVAL);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, store = ?config.store, "Starting CAG gateway");

    axum::serve(listener, routes::router(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
