//! Wire-envelope translation between the telephony stream protocol and the
//! realtime-AI protocol.
//!
//! Everything here is stateless and side-effect free: decoders turn raw text
//! into tagged variants (or a [`DecodeError`] the caller may log and skip),
//! encoders build envelopes that are well-formed by construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure to interpret a raw message from either peer. Never fatal to the
/// session; the offending message is logged and discarded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing or non-string `{0}` field")]
    MissingTag(&'static str),
    #[error("malformed `{event}` event: {source}")]
    BadShape {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Rejected encoder input.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("`{0}` must be a non-empty string")]
    EmptyField(&'static str),
}

/// The audio encoding native to the telephony media stream. Both directions
/// of the AI session are configured to this format, so audio passes through
/// the relay untouched.
pub const TELEPHONY_AUDIO_FORMAT: &str = "g711_ulaw";

const SAMPLING_TEMPERATURE: f32 = 0.8;

/// AI event kinds surfaced in logs when they arrive; everything else that is
/// not an audio delta is ignored silently.
pub const DIAGNOSTIC_AI_EVENTS: &[&str] = &[
    "error",
    "response.content.done",
    "rate_limits.updated",
    "response.done",
    "input_audio_buffer.committed",
    "input_audio_buffer.speech_stopped",
    "input_audio_buffer.speech_started",
    "session.created",
    "session.updated",
];

// ---------------------------------------------------------------------------
// Telephony side
// ---------------------------------------------------------------------------

/// A decoded inbound telephony event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyEvent {
    /// Stream opened; carries the identifier that must tag all return media.
    Start { stream_sid: String },
    /// One inbound caller-audio frame (base64).
    Media { payload: String },
    /// Any other event tag. Not an error; relayed nowhere.
    Other { event: String },
}

#[derive(Deserialize)]
struct StartBody {
    start: StartMeta,
}

#[derive(Deserialize)]
struct StartMeta {
    #[serde(rename = "streamSid")]
    stream_sid: String,
}

#[derive(Deserialize)]
struct MediaBody {
    media: MediaMeta,
}

#[derive(Deserialize)]
struct MediaMeta {
    payload: String,
}

/// Parses an inbound telephony message into a tagged variant. Unrecognized
/// event tags decode into [`TelephonyEvent::Other`].
pub fn decode_telephony_event(raw: &str) -> Result<TelephonyEvent, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    let tag = value
        .get("event")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(DecodeError::MissingTag("event"))?;

    match tag.as_str() {
        "start" => {
            let body: StartBody = serde_json::from_value(value).map_err(|e| {
                DecodeError::BadShape {
                    event: "start",
                    source: e,
                }
            })?;
            Ok(TelephonyEvent::Start {
                stream_sid: body.start.stream_sid,
            })
        }
        "media" => {
            let body: MediaBody = serde_json::from_value(value).map_err(|e| {
                DecodeError::BadShape {
                    event: "media",
                    source: e,
                }
            })?;
            Ok(TelephonyEvent::Media {
                payload: body.media.payload,
            })
        }
        _ => Ok(TelephonyEvent::Other { event: tag }),
    }
}

/// A media frame returning synthesized audio to the caller, tagged with the
/// session's stream identifier.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MediaFrame {
    event: &'static str,
    #[serde(rename = "streamSid")]
    stream_sid: String,
    media: MediaPayload,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct MediaPayload {
    payload: String,
}

/// Wraps a base64 audio payload into the telephony media-frame shape.
/// The caller guarantees `stream_sid` is the session's assigned identifier.
pub fn media_frame(stream_sid: &str, payload: &str) -> MediaFrame {
    MediaFrame {
        event: "media",
        stream_sid: stream_sid.to_owned(),
        media: MediaPayload {
            payload: payload.to_owned(),
        },
    }
}

// ---------------------------------------------------------------------------
// AI side
// ---------------------------------------------------------------------------

/// A decoded AI-service event. `kind` is always present; `delta` carries the
/// base64 audio chunk on audio-delta events; `raw` keeps the full payload for
/// diagnostics.
#[derive(Debug, Clone)]
pub struct AiEvent {
    pub kind: String,
    pub delta: Option<String>,
    pub raw: Value,
}

impl AiEvent {
    /// The synthesized-audio chunk to relay back to the caller, if this event
    /// is an audio delta carrying a non-empty payload.
    pub fn audio_delta(&self) -> Option<&str> {
        if self.kind != "response.audio.delta" {
            return None;
        }
        self.delta.as_deref().filter(|d| !d.is_empty())
    }
}

/// Parses a raw AI-service message. Any JSON object with a string `type`
/// field decodes successfully.
pub fn decode_ai_event(raw: &str) -> Result<AiEvent, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(DecodeError::MissingTag("type"))?;
    let delta = value.get("delta").and_then(Value::as_str).map(str::to_owned);
    Ok(AiEvent {
        kind,
        delta,
        raw: value,
    })
}

/// The one-time `session.update` configuring the realtime AI connection.
#[derive(Debug, Serialize)]
pub struct SessionUpdate {
    #[serde(rename = "type")]
    kind: &'static str,
    session: SessionConfig,
}

#[derive(Debug, Serialize)]
struct SessionConfig {
    turn_detection: TurnDetection,
    input_audio_format: &'static str,
    output_audio_format: &'static str,
    voice: String,
    instructions: String,
    modalities: [&'static str; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct TurnDetection {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Builds the session-configuration message: server-driven voice-activity
/// detection, telephony-native audio in both directions, text+audio
/// modalities, fixed sampling temperature.
pub fn session_update(voice: &str, instructions: &str) -> Result<SessionUpdate, CodecError> {
    if voice.trim().is_empty() {
        return Err(CodecError::EmptyField("voice"));
    }
    if instructions.trim().is_empty() {
        return Err(CodecError::EmptyField("instructions"));
    }
    Ok(SessionUpdate {
        kind: "session.update",
        session: SessionConfig {
            turn_detection: TurnDetection { kind: "server_vad" },
            input_audio_format: TELEPHONY_AUDIO_FORMAT,
            output_audio_format: TELEPHONY_AUDIO_FORMAT,
            voice: voice.to_owned(),
            instructions: instructions.to_owned(),
            modalities: ["text", "audio"],
            temperature: SAMPLING_TEMPERATURE,
        },
    })
}

/// One inbound caller-audio chunk in the AI service's append shape.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AudioAppend {
    #[serde(rename = "type")]
    kind: &'static str,
    audio: String,
}

impl AudioAppend {
    /// The base64 audio payload carried by this append.
    pub fn audio(&self) -> &str {
        &self.audio
    }
}

/// Wraps inbound caller audio into the AI input-audio-append shape.
pub fn audio_append(payload: &str) -> AudioAppend {
    AudioAppend {
        kind: "input_audio_buffer.append",
        audio: payload.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_start_event() {
        let raw = r#"{"event":"start","start":{"streamSid":"SD123"}}"#;
        let event = decode_telephony_event(raw).unwrap();
        assert_eq!(
            event,
            TelephonyEvent::Start {
                stream_sid: "SD123".to_string()
            }
        );
    }

    #[test]
    fn test_decode_media_event() {
        let raw = r#"{"event":"media","media":{"payload":"AAAA"}}"#;
        let event = decode_telephony_event(raw).unwrap();
        assert_eq!(
            event,
            TelephonyEvent::Media {
                payload: "AAAA".to_string()
            }
        );
    }

    #[test]
    fn test_decode_unknown_event_tag_is_not_an_error() {
        let raw = r#"{"event":"mark","mark":{"name":"greeting"}}"#;
        let event = decode_telephony_event(raw).unwrap();
        assert_eq!(
            event,
            TelephonyEvent::Other {
                event: "mark".to_string()
            }
        );
    }

    #[test]
    fn test_decode_telephony_rejects_non_json() {
        let err = decode_telephony_event("not json at all").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_decode_telephony_rejects_missing_event_tag() {
        let err = decode_telephony_event(r#"{"foo":"bar"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingTag("event")));
    }

    #[test]
    fn test_decode_telephony_rejects_malformed_media_body() {
        let err = decode_telephony_event(r#"{"event":"media","media":{}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::BadShape { event: "media", .. }));
    }

    #[test]
    fn test_decode_ai_event_with_delta() {
        let raw = r#"{"type":"response.audio.delta","delta":"QUJD"}"#;
        let event = decode_ai_event(raw).unwrap();
        assert_eq!(event.kind, "response.audio.delta");
        assert_eq!(event.audio_delta(), Some("QUJD"));
        assert_eq!(event.raw["type"], "response.audio.delta");
    }

    #[test]
    fn test_decode_ai_event_without_type_fails() {
        let err = decode_ai_event(r#"{"delta":"QUJD"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingTag("type")));
    }

    #[test]
    fn test_audio_delta_ignores_other_kinds_and_empty_payloads() {
        let not_audio = decode_ai_event(r#"{"type":"session.updated","delta":"QUJD"}"#).unwrap();
        assert_eq!(not_audio.audio_delta(), None);

        let empty = decode_ai_event(r#"{"type":"response.audio.delta","delta":""}"#).unwrap();
        assert_eq!(empty.audio_delta(), None);

        let missing = decode_ai_event(r#"{"type":"response.audio.delta"}"#).unwrap();
        assert_eq!(missing.audio_delta(), None);
    }

    #[test]
    fn test_media_frame_shape() {
        let frame = media_frame("SD123", "QUJD");
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "media",
                "streamSid": "SD123",
                "media": { "payload": "QUJD" }
            })
        );
    }

    #[test]
    fn test_media_frame_payload_round_trips_bytes() {
        use base64::Engine;

        let original = base64::engine::general_purpose::STANDARD.encode([0x00u8, 0x7f, 0xff]);
        let frame = media_frame("SD1", &original);
        let value = serde_json::to_value(&frame).unwrap();
        let relayed = value["media"]["payload"].as_str().unwrap();
        assert_eq!(
            base64::engine::general_purpose::STANDARD
                .decode(relayed)
                .unwrap(),
            vec![0x00u8, 0x7f, 0xff]
        );
    }

    #[test]
    fn test_audio_append_shape() {
        let append = audio_append("AAAA");
        let value = serde_json::to_value(&append).unwrap();
        assert_eq!(
            value,
            json!({ "type": "input_audio_buffer.append", "audio": "AAAA" })
        );
    }

    #[test]
    fn test_session_update_shape() {
        let update = session_update("alloy", "Be brief.").unwrap();
        let value = serde_json::to_value(&update).unwrap();

        assert_eq!(value["type"], "session.update");
        let session = &value["session"];
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["input_audio_format"], "g711_ulaw");
        assert_eq!(session["output_audio_format"], "g711_ulaw");
        assert_eq!(session["voice"], "alloy");
        assert_eq!(session["instructions"], "Be brief.");
        assert_eq!(session["modalities"], json!(["text", "audio"]));
        assert!((session["temperature"].as_f64().unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_session_update_rejects_empty_fields() {
        assert!(matches!(
            session_update("", "Be brief.").unwrap_err(),
            CodecError::EmptyField("voice")
        ));
        assert!(matches!(
            session_update("alloy", "   ").unwrap_err(),
            CodecError::EmptyField("instructions")
        ));
    }
}
