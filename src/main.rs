use std::net::SocketAddr;

use axum::Router;
use pizza_metrics::{app, initialize_state, start_exporter, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::setup_logging();

    let state = initialize_state()?;

    // Exporter runs until the process exits; nothing is flushed on shutdown.
    let _exporter = start_exporter(&state);

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, name = %state.config.name, "server started");

    axum::serve(listener, app(state, Router::new()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
