// main.rs

mod charts;
mod config;
mod consumers;
mod db;
mod display;
mod error;
mod event_log;
mod export;
mod flight_sim;
mod link;
mod map;
mod mission;
mod pipeline;
mod ring_buffer;
mod sequences;
mod state;
mod telemetry_task;
mod web;

use crate::config::GroundConfig;
use crate::state::AppState;
use crate::telemetry_task::telemetry_task;

use axum::Router;
use tokio::sync::broadcast;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = GroundConfig::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        db = %config.db_path,
        gate = ?config.pipeline.gate,
        "starting mission control"
    );

    // --- DB ---
    let db = db::open(&config.db_path).await?;

    // --- Shared state ---
    let bind_addr = config.bind_addr.clone();
    let (state, channels) = AppState::new(config, db);

    // --- Background tasks ---
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let telemetry = tokio::spawn(telemetry_task(state.clone(), channels, shutdown_rx));

    // --- Webserver ---
    let app: Router = web::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {bind_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {e}");
            }
            tracing::info!("shutting down");
        })
        .await?;

    let _ = shutdown_tx.send(());
    telemetry.await?;
    Ok(())
}
