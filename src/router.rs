//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application: the
//! liveness endpoint, the call-control webhook, and the media-stream
//! WebSocket upgrade.

use crate::{handlers, state::AppState, ws::media_stream_handler};

use axum::{
    Router,
    routing::{any, get},
};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        // The telephony platform may fetch the call-control document with
        // either GET or POST depending on webhook configuration.
        .route("/incoming-call", any(handlers::incoming_call))
        .route("/media-stream", get(media_stream_handler))
        .with_state(app_state)
}
