//! The per-session relay engine: AI-side handshake plus the two concurrent
//! message pumps.
//!
//! Each pump decodes one direction's messages, asks a pure `plan_*` function
//! what to do, and applies the result to the opposite sink. There is no retry
//! anywhere: a dropped frame is lost, a decode failure is logged and skipped,
//! a closed connection ends the relay in that direction.

use crate::{
    config::{Config, TeardownPolicy},
    ws::{
        codec::{self, AiEvent, AudioAppend, MediaFrame, TelephonyEvent},
        session::{AiStream, CallSession, SessionState},
    },
};
use anyhow::{Context, Result};
use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Error as WsError, client::IntoClientRequest, protocol::Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

const REALTIME_URL: &str =
    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01";

/// Grace period between the transport-level open and the session.update send,
/// so the configuration does not race the remote side of the handshake.
const SESSION_SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Opens the AI-side WebSocket with the bearer credential and the
/// protocol-version header.
pub(crate) async fn connect_ai(config: &Config) -> Result<AiStream> {
    let mut request = REALTIME_URL.into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", config.openai_api_key).parse()?,
    );
    request
        .headers_mut()
        .insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (stream, _) = connect_async(request)
        .await
        .context("Failed to connect to the realtime AI endpoint")?;
    info!("Connected to realtime AI endpoint");
    Ok(stream)
}

/// What the engine does with one decoded telephony event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TelephonyAction {
    /// Forward caller audio to the AI side.
    Forward(AudioAppend),
    /// Nothing to relay.
    Ignore,
}

pub(crate) fn plan_telephony_event(
    event: TelephonyEvent,
    state: &mut SessionState,
) -> TelephonyAction {
    match event {
        TelephonyEvent::Media { payload } => {
            if state.is_ai_ready() {
                TelephonyAction::Forward(codec::audio_append(&payload))
            } else {
                // Dropped, never queued.
                debug!("AI side not ready; dropping inbound media frame");
                TelephonyAction::Ignore
            }
        }
        TelephonyEvent::Start { stream_sid } => {
            info!(stream_sid = %stream_sid, "Telephony stream started");
            state.assign_stream(stream_sid);
            TelephonyAction::Ignore
        }
        TelephonyEvent::Other { event } => {
            debug!(event = %event, "Ignoring non-media telephony event");
            TelephonyAction::Ignore
        }
    }
}

/// What the engine does with one decoded AI event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AiAction {
    /// Forward synthesized audio to the telephony side.
    Forward(MediaFrame),
    /// Nothing to relay.
    Ignore,
}

pub(crate) fn plan_ai_event(event: &AiEvent, state: &SessionState) -> AiAction {
    if let Some(delta) = event.audio_delta() {
        if let Some(sid) = state.stream_sid() {
            return AiAction::Forward(codec::media_frame(sid, delta));
        }
        warn!("Audio delta before telephony start event; dropping");
        return AiAction::Ignore;
    }
    if codec::DIAGNOSTIC_AI_EVENTS.contains(&event.kind.as_str()) {
        info!(kind = %event.kind, "AI event");
    }
    AiAction::Ignore
}

/// Telephony-to-AI direction. Runs on the accepted socket until the caller
/// hangs up or the transport errors.
pub(crate) async fn run_telephony_pump<S, T, A>(session: Arc<CallSession<T, A>>, mut rx: S)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    T: Sink<Message> + Unpin,
    T::Error: std::error::Error + Send + Sync + 'static,
    A: Sink<WsMessage> + Unpin,
    A::Error: std::error::Error + Send + Sync + 'static,
{
    while let Some(msg) = rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let event = match codec::decode_telephony_event(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Undecodable telephony message; skipping");
                        continue;
                    }
                };
                let action = {
                    let mut state = session.state.lock().await;
                    plan_telephony_event(event, &mut state)
                };
                if let TelephonyAction::Forward(append) = action {
                    if let Err(e) = send_to_ai(&session, &append).await {
                        warn!(error = %e, "Failed to forward audio to AI side");
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("Telephony peer closed the stream");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Telephony receive error");
                break;
            }
        }
    }
}

/// AI-to-telephony direction. Completes the protocol handshake, then relays
/// synthesized audio back to the caller until the AI leg ends.
///
/// When the AI leg ends first, the telephony leg is torn down only under the
/// symmetric policy; otherwise the readiness gate drops and inbound audio is
/// discarded for the remainder of the call.
pub(crate) async fn run_ai_pump<S, T, A>(
    session: Arc<CallSession<T, A>>,
    mut rx: S,
    config: Arc<Config>,
) where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
    T: Sink<Message> + Unpin,
    T::Error: std::error::Error + Send + Sync + 'static,
    A: Sink<WsMessage> + Unpin,
    A::Error: std::error::Error + Send + Sync + 'static,
{
    if let Err(e) = configure_ai_session(&session, &config).await {
        error!(error = ?e, "AI session handshake failed");
    } else {
        while let Some(msg) = rx.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => {
                    let event = match codec::decode_ai_event(text.as_str()) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(error = %e, "Undecodable AI message; skipping");
                            continue;
                        }
                    };
                    let action = {
                        let state = session.state.lock().await;
                        plan_ai_event(&event, &state)
                    };
                    if let AiAction::Forward(frame) = action {
                        if let Err(e) = send_to_telephony(&session, &frame).await {
                            warn!(error = %e, "Failed to forward audio to telephony side");
                        }
                    }
                }
                Ok(WsMessage::Close(_)) => {
                    info!("AI peer closed the stream");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "AI receive error");
                    break;
                }
            }
        }
    }

    session.close_ai().await;
    if config.teardown_policy == TeardownPolicy::Symmetric {
        session.close_telephony().await;
    }
}

/// Waits out the settling delay, sends the one-time session configuration,
/// and opens the telephony-to-AI gate. The `session.updated` acknowledgment
/// is logged when it later arrives but never awaited.
async fn configure_ai_session<T, A>(session: &CallSession<T, A>, config: &Config) -> Result<()>
where
    T: Sink<Message> + Unpin,
    T::Error: std::error::Error,
    A: Sink<WsMessage> + Unpin,
    A::Error: std::error::Error + Send + Sync + 'static,
{
    tokio::time::sleep(SESSION_SETTLE_DELAY).await;

    let update = codec::session_update(&config.voice, &config.instructions)?;
    let text = serde_json::to_string(&update)?;
    session
        .ai_tx
        .lock()
        .await
        .send(WsMessage::Text(text.into()))
        .await?;

    session.state.lock().await.mark_ai_ready();
    info!("Session configuration sent; relay active");
    Ok(())
}

async fn send_to_ai<T, A>(session: &CallSession<T, A>, append: &AudioAppend) -> Result<()>
where
    T: Sink<Message> + Unpin,
    T::Error: std::error::Error,
    A: Sink<WsMessage> + Unpin,
    A::Error: std::error::Error + Send + Sync + 'static,
{
    let text = serde_json::to_string(append)?;
    session
        .ai_tx
        .lock()
        .await
        .send(WsMessage::Text(text.into()))
        .await?;
    Ok(())
}

async fn send_to_telephony<T, A>(session: &CallSession<T, A>, frame: &MediaFrame) -> Result<()>
where
    T: Sink<Message> + Unpin,
    T::Error: std::error::Error + Send + Sync + 'static,
    A: Sink<WsMessage> + Unpin,
    A::Error: std::error::Error,
{
    let text = serde_json::to_string(frame)?;
    session
        .telephony_tx
        .lock()
        .await
        .send(Message::Text(text.into()))
        .await?;
    Ok(())
}
