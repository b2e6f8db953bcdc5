//! Shared Application State
//!
//! This module defines the `AppState` struct, which carries the immutable
//! configuration into handlers and per-call relay engines. Nothing in the
//! deeper modules reads process environment directly.

use crate::config::Config;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}
