//! Persistent session transport over WebSocket.
//!
//! # Data Flow
//! ```text
//! GET /mongodb/ws (upgrade)
//!     → session slot reserved (503 when full)
//!     → server sends `connect_response`
//!     → client sends `mongodb` events, server answers each with `response`
//!     → client close frame or server shutdown ends the session
//! ```
//!
//! Frames are JSON text: `{"event": "...", "data": {...}, "id": ...}`.
//! `id` is optional and echoed back so clients can correlate replies.
//! Messages within one session are handled in arrival order; sessions are
//! independent of each other.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::dispatch::{into_envelope, OperationKind};
use crate::error::GatewayError;
use crate::gateway::{Gateway, GatewayRequest};
use crate::http::server::AppState;
use crate::http::sessions::SessionPermit;

pub const EVENT_CONNECT: &str = "connect_response";
pub const EVENT_REQUEST: &str = "mongodb";
pub const EVENT_RESPONSE: &str = "response";

#[derive(Debug, Deserialize)]
struct InboundEvent {
    event: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct OutboundEvent {
    event: &'static str,
    data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
}

impl OutboundEvent {
    fn connected() -> Self {
        Self {
            event: EVENT_CONNECT,
            data: json!({ "status": "success", "message": "Connected to MongoDB namespace" }),
            id: None,
        }
    }

    fn response(data: Value, id: Option<Value>) -> Self {
        Self {
            event: EVENT_RESPONSE,
            data,
            id,
        }
    }
}

/// Upgrade handler for `GET /mongodb/ws`.
pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let Some(permit) = state.sessions.try_open() else {
        tracing::warn!("Session limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(session_limit_reached())).into_response();
    };

    let span = tracing::info_span!("session", session_id = %permit.id());
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_session(socket, state, permit).instrument(span))
}

async fn run_session(mut socket: WebSocket, state: AppState, permit: SessionPermit) {
    let mut shutdown = state.shutdown.subscribe();
    tracing::debug!("Client connected");

    if send(&mut socket, OutboundEvent::connected()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = socket.recv() => {
                let reply = match frame {
                    Some(Ok(Message::Text(text))) => handle_text(&state.gateway, text.as_str()).await,
                    Some(Ok(Message::Binary(_))) => rejected("Binary frames are not supported", None),
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong are answered by the socket itself.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Session receive error");
                        break;
                    }
                };
                if send(&mut socket, reply).await.is_err() {
                    break;
                }
            }
            _ = shutdown.recv() => {
                let frame = CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                };
                let _ = socket.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }

    tracing::debug!("Client disconnected");
    drop(permit);
}

async fn handle_text(gateway: &Gateway, text: &str) -> OutboundEvent {
    let inbound: InboundEvent = match serde_json::from_str(text) {
        Ok(inbound) => inbound,
        Err(e) => return rejected(&format!("Invalid message: {e}"), None),
    };

    if inbound.event != EVENT_REQUEST {
        return rejected(&format!("Unknown event: {}", inbound.event), inbound.id);
    }

    let call_id = Uuid::new_v4();
    let outcome = async {
        match GatewayRequest::from_value(inbound.data) {
            Ok(request) => gateway.handle(request, &OperationKind::ALL).await,
            Err(e) => Err(e),
        }
    }
    .instrument(tracing::info_span!("call", call_id = %call_id))
    .await;

    OutboundEvent::response(into_envelope(outcome), inbound.id)
}

/// Gateway capacity, not the engine, is exhausted, so no error kind applies.
fn session_limit_reached() -> Value {
    json!({ "status": "error", "error": "Too many open sessions" })
}

fn rejected(msg: &str, id: Option<Value>) -> OutboundEvent {
    OutboundEvent::response(into_envelope(Err(GatewayError::validation(msg))), id)
}

async fn send(socket: &mut WebSocket, event: OutboundEvent) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(&event) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize session event");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await.map_err(|e| {
        tracing::debug!(error = %e, "Session send failed");
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_events_serialize_with_optional_id() {
        let connected = serde_json::to_value(OutboundEvent::connected()).unwrap();
        assert_eq!(connected["event"], "connect_response");
        assert_eq!(connected["data"]["status"], "success");
        assert!(connected.get("id").is_none());

        let reply = serde_json::to_value(rejected("nope", Some(json!(7)))).unwrap();
        assert_eq!(
            session_limit_reached(),
            json!({ "status": "error", "error": "Too many open sessions" })
        );
        assert_eq!(
            reply,
            json!({ "event": "response", "data": { "status": "error", "error": "nope" }, "id": 7 })
        );
    }
}
