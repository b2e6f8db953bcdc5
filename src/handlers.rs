//! HTTP boundary handlers: the liveness document and the call-control
//! document handed back to the telephony platform. Neither touches session
//! state; the media relay lives in [`crate::ws`].

use axum::{
    Json,
    http::{HeaderMap, header},
    response::IntoResponse,
};
use serde_json::json;

/// `GET /` - static liveness acknowledgment.
pub async fn index() -> impl IntoResponse {
    Json(json!({ "message": "Voicebridge media relay is running" }))
}

/// `ANY /incoming-call` - returns the call-control document that tells the
/// telephony platform to open a media stream back to this service.
///
/// The stream URL host is derived from the inbound request's `Host` header so
/// the same deployment works behind any public hostname.
pub async fn incoming_call(headers: HeaderMap) -> impl IntoResponse {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    (
        [(header::CONTENT_TYPE, "text/xml")],
        call_control_document(host),
    )
}

/// Builds the TwiML answering a call: a short greeting, then a `<Connect>`
/// verb pointing the platform at our `/media-stream` WebSocket.
fn call_control_document(host: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Say>Please wait while we connect your call to the A. I. voice assistant</Say>
    <Pause length="1"/>
    <Say>You can start talking now</Say>
    <Connect>
        <Stream url="wss://{host}/media-stream" />
    </Connect>
</Response>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_control_document_uses_request_host() {
        let doc = call_control_document("example.ngrok.io");
        assert!(doc.contains(r#"<Stream url="wss://example.ngrok.io/media-stream" />"#));
    }

    #[test]
    fn test_call_control_document_is_twiml() {
        let doc = call_control_document("host");
        assert!(doc.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(doc.contains("<Response>"));
        assert!(doc.contains("<Connect>"));
        assert!(doc.ends_with("</Response>"));
    }
}
