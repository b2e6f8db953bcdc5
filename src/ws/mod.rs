//! Per-call media relay
//!
//! This module contains the core logic for bridging one telephony media
//! stream to one realtime-AI connection. It is structured into submodules:
//!
//! - `codec`: stateless translation between the two wire envelopes.
//! - `session`: per-call state, connection ownership, and the WebSocket
//!   connection lifecycle from upgrade to teardown.
//! - `relay`: the per-session engine - AI handshake and the two message pumps.

pub mod codec;
pub mod relay;
pub mod session;

pub use session::media_stream_handler;
