//! Call-session state, connection ownership, and the WebSocket lifecycle for
//! one accepted telephony stream.

use crate::{state::AppState, ws::relay};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, StreamExt, stream::SplitSink};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::Mutex;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, tungstenite::protocol::Message as WsMessage,
};
use tracing::{Instrument, debug, error, info, instrument};

/// The AI-side socket and its send half.
pub type AiStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
pub type AiSink = SplitSink<AiStream, WsMessage>;
/// The telephony-side send half.
pub type TelephonySink = SplitSink<WebSocket, Message>;

/// The concrete session type used by the running service.
pub type BridgeSession = CallSession<TelephonySink, AiSink>;

/// Mutable per-call state: the stream identifier assigned by the telephony
/// side and the AI-readiness gate.
#[derive(Debug, Default)]
pub struct SessionState {
    stream_sid: Option<String>,
    ai_ready: bool,
}

impl SessionState {
    /// Records the telephony stream identifier. Last write wins; the
    /// telephony protocol emits at most one `start` per connection in normal
    /// operation, so no re-entrancy guard is needed.
    pub fn assign_stream(&mut self, id: impl Into<String>) {
        self.stream_sid = Some(id.into());
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    /// Opens the telephony-to-AI gate: audio may now be forwarded.
    pub fn mark_ai_ready(&mut self) {
        self.ai_ready = true;
    }

    /// Drops the gate again, so inbound audio is discarded rather than sent
    /// towards a closed AI leg.
    pub fn clear_ai_ready(&mut self) {
        self.ai_ready = false;
    }

    pub fn is_ai_ready(&self) -> bool {
        self.ai_ready
    }
}

/// One paired set of connections and the state belonging to the call.
///
/// Both sinks are exclusively owned by this session and shared only between
/// its two pump tasks. Each leg is closed at most once, regardless of which
/// failure path reaches it first.
pub struct CallSession<T, A> {
    pub(crate) state: Mutex<SessionState>,
    pub(crate) telephony_tx: Mutex<T>,
    pub(crate) ai_tx: Mutex<A>,
    telephony_closed: AtomicBool,
    ai_closed: AtomicBool,
}

impl<T, A> CallSession<T, A>
where
    T: Sink<Message> + Unpin,
    T::Error: std::error::Error,
    A: Sink<WsMessage> + Unpin,
    A::Error: std::error::Error,
{
    pub fn new(telephony_tx: T, ai_tx: A) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState::default()),
            telephony_tx: Mutex::new(telephony_tx),
            ai_tx: Mutex::new(ai_tx),
            telephony_closed: AtomicBool::new(false),
            ai_closed: AtomicBool::new(false),
        })
    }

    /// Closes the AI leg, then the telephony leg. Idempotent; safe to call
    /// from either failure path.
    pub async fn close_both(&self) {
        self.close_ai().await;
        self.close_telephony().await;
    }

    /// Closes the AI leg if still open and drops the readiness gate.
    pub async fn close_ai(&self) {
        if self.ai_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.lock().await.clear_ai_ready();
        let mut tx = self.ai_tx.lock().await;
        if let Err(e) = tx.send(WsMessage::Close(None)).await {
            debug!(error = %e, "AI connection already gone at close");
        }
    }

    /// Closes the telephony leg if still open.
    pub async fn close_telephony(&self) {
        if self.telephony_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tx = self.telephony_tx.lock().await;
        if let Err(e) = tx.send(Message::Close(None)).await {
            debug!(error = %e, "Telephony connection already gone at close");
        }
    }
}

/// Axum handler upgrading `/media-stream` to the telephony WebSocket.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Entry point for one accepted telephony connection.
///
/// Opens the AI leg, wires both halves into a [`CallSession`], spawns the
/// AI-to-telephony pump, and runs the telephony-to-AI pump until the caller
/// hangs up. The session and both connections are discarded on return.
#[instrument(name = "call_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id: u32 = rand::random();
    tracing::Span::current().record("session_id", session_id);
    info!("Telephony stream connected");

    let ai_stream = match relay::connect_ai(&state.config).await {
        Ok(stream) => stream,
        Err(e) => {
            // No retry: the call is simply dropped.
            error!(error = ?e, "Failed to open AI connection; dropping call");
            return;
        }
    };

    let (telephony_tx, telephony_rx) = socket.split();
    let (ai_tx, ai_rx) = ai_stream.split();
    let session = CallSession::new(telephony_tx, ai_tx);

    let ai_span = tracing::info_span!("ai_pump", session_id);
    let ai_task = tokio::spawn(
        relay::run_ai_pump(session.clone(), ai_rx, state.config.clone()).instrument(ai_span),
    );

    relay::run_telephony_pump(session.clone(), telephony_rx).await;

    // Telephony leg ended: tear down the AI leg and stop its pump.
    session.close_both().await;
    ai_task.abort();
    info!("Call session closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_stream_is_last_write_wins() {
        let mut state = SessionState::default();
        assert_eq!(state.stream_sid(), None);

        state.assign_stream("SD1");
        assert_eq!(state.stream_sid(), Some("SD1"));

        state.assign_stream("SD2");
        assert_eq!(state.stream_sid(), Some("SD2"));
    }

    #[test]
    fn test_ai_ready_gate_flips_both_ways() {
        let mut state = SessionState::default();
        assert!(!state.is_ai_ready());

        state.mark_ai_ready();
        assert!(state.is_ai_ready());

        state.clear_ai_ready();
        assert!(!state.is_ai_ready());
    }
}
