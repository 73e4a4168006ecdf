use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use genie_domain::config::Config;
use genie_engine::LlamaServerEngine;
use genie_store::MongoStores;
use genie_worker::poller;
use genie_worker::state::WorkerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("genie_worker=info")),
        )
        .init();

    tracing::info!("genie worker starting");

    // ── Config ─────────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".into());

    let config = Arc::new(Config::load_or_default(&config_path));
    tracing::info!(
        database = %config.store.database,
        engine = %config.engine.base_url,
        poll_interval_ms = config.worker.poll_interval_ms,
        max_in_flight = config.worker.max_in_flight,
        "configuration loaded"
    );

    // ── Document store ─────────────────────────────────────────────
    let stores = Arc::new(MongoStores::connect(&config.store).await?);

    // ── Generation backend ─────────────────────────────────────────
    // An unreachable backend (model not loaded) is fatal at startup.
    let engine = Arc::new(LlamaServerEngine::new(&config.engine)?);
    engine.health().await?;
    tracing::info!(base_url = %config.engine.base_url, "generation backend ready");

    // ── Worker state + poll loop ───────────────────────────────────
    let state = Arc::new(WorkerState::new(
        config,
        stores.clone(),
        stores.clone(),
        stores.clone(),
        engine,
    ));

    let poll = tokio::spawn(poller::run(state));

    // ── Shutdown ───────────────────────────────────────────────────
    shutdown_signal().await;

    // Immediate stop: in-flight generations are abandoned; their prompts
    // stay claimed until the reclaim sweep (if enabled) picks them up.
    poll.abort();
    stores.shutdown().await;
    tracing::info!("shutdown complete");

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}
