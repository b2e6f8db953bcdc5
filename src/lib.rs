//! Voicebridge Library Crate
//!
//! This library contains all the core logic for the voicebridge service: a
//! relay that pairs an inbound telephony media stream with an outbound
//! realtime-AI connection and pumps audio between them. The binary in
//! `bin/server.rs` is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
