//! Main Entrypoint for the Voicebridge Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing structured logging.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.
//!
//! A missing credential or a failed listener bind surfaces as an error from
//! `main`, which exits the process with a non-zero status.

use anyhow::Context;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use voicebridge::{config::Config, router::create_router, state::AppState};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Create Router and Apply Middleware ---
    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
    });
    let app = create_router(app_state).layer(TraceLayer::new_for_http());

    // --- 4. Start Server ---
    info!(
        bind_address = %config.bind_address,
        voice = %config.voice,
        teardown_policy = ?config.teardown_policy,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .context("Failed to bind network listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server has shut down.");
    Ok(())
}
