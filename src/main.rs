//! Analytics Agent - HTTP Service Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use analytics_agent::server;
use analytics_agent::storage::ConfigService;
use analytics_agent::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ConfigService::from_env().context("failed to load configuration")?;
    config
        .get_config()
        .validate_for_startup()
        .map_err(|e| anyhow!("invalid configuration: {}", e))?;
    if let Some(file) = config.source_file() {
        tracing::info!(file = %file.display(), "configuration overlay loaded");
    }

    let settings = config.get_config_clone();
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", settings.server.host, settings.server.port))?;

    let state = Arc::new(AppState::from_config(config).await?);
    tracing::info!(
        model = %settings.llm.model,
        database = %state.analytics_db().describe(),
        data_dir = %state.config_service().data_dir().display(),
        "analytics agent initialized"
    );

    let shutdown = CancellationToken::new();
    spawn_sweeper(state.clone(), settings.sweep_interval(), shutdown.clone());

    let listener = server::bind(addr).await?;
    let serving = tokio::spawn(server::serve(listener, state.clone(), shutdown.clone()));

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");
    shutdown.cancel();
    serving.await.context("server task panicked")??;

    let removed = state.artifacts().release_all();
    tracing::info!(removed, "artifacts released, bye");
    Ok(())
}

/// Periodically drop expired artifacts and idle session locks.
fn spawn_sweeper(state: Arc<AppState>, every: std::time::Duration, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            state.artifacts().sweep(chrono::Utc::now());
            let pruned = state.locks().prune();
            tracing::debug!(pruned, "idle session locks pruned");
        }
    });
}
