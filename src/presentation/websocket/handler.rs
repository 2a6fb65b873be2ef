//! WebSocket Connection Handler
//!
//! Upgrade, admission and the per-connection read/write loop.

use axum::{
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    body::Bytes,
    response::Response,
};
use axum_extra::{headers::Cookie, TypedHeader};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::time::interval;

use super::heartbeat::{Heartbeat, Inbound};
use super::messages::{self, ClientFrame, ConnectErrorPayload, HandshakeQuery, SessionReadyPayload};
use crate::application::realtime::{events, Handshake, OutboundEvent};
use crate::shared::error::{AppError, AuthError, ErrorEvent};
use crate::startup::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    cookies: Option<TypedHeader<Cookie>>,
) -> Response {
    let handshake = handshake_from(
        query,
        cookies.as_ref().map(|TypedHeader(cookie)| cookie),
        &state.settings.websocket.auth_cookie_name,
    );

    let limits = &state.settings.websocket;
    ws.max_message_size(limits.max_message_size)
        .max_frame_size(limits.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state, handshake))
}

fn handshake_from(query: HandshakeQuery, cookies: Option<&Cookie>, cookie_name: &str) -> Handshake {
    Handshake {
        auth_token: query.token,
        cookie_token: cookies
            .and_then(|cookie| cookie.get(cookie_name))
            .map(str::to_owned),
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, handshake: Handshake) {
    // Split socket for concurrent read/write
    let (mut sender, mut receiver) = socket.split();

    let identity = match state.hub.authenticate(&handshake).await {
        Ok(identity) => identity,
        Err(e) => {
            reject(&mut sender, &e).await;
            return;
        }
    };

    let (conn, mut rx) = state.hub.connect(identity).await;

    match serde_json::to_value(SessionReadyPayload {
        connection_id: conn.id(),
        user: conn.identity(),
    }) {
        Ok(ready) => {
            conn.emit(events::SESSION_READY, ready);
        }
        Err(e) => tracing::error!(error = %e, "Failed to encode session:ready"),
    }

    let every = state.settings.websocket.heartbeat_interval();

    // Forward queued events to the socket, pinging while idle
    let writer = tokio::spawn(async move {
        let mut ping = interval(every);
        ping.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match messages::encode(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(event = %event.event, error = %e, "Failed to serialize event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Events from one connection are handled one at a time, in arrival order.
    let mut heartbeat = Heartbeat::new(every);
    loop {
        match heartbeat.next(&mut receiver).await {
            Inbound::Frame(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                Ok(frame) => {
                    let _ = state.hub.dispatch(&conn, &frame.event, frame.data).await;
                }
                Err(e) => {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "Malformed frame");
                    let error = AppError::from(e);
                    if let Ok(body) = serde_json::to_value(ErrorEvent::new("", &error)) {
                        conn.emit(events::ERROR, body);
                    }
                }
            },
            // Pings are answered by axum; binary frames are not part of the protocol
            Inbound::Frame(_) => {}
            Inbound::Closed => break,
            Inbound::Failed(e) => {
                tracing::debug!(connection_id = %conn.id(), error = %e, "WebSocket error");
                break;
            }
            Inbound::Expired => {
                tracing::info!(connection_id = %conn.id(), "Heartbeat timeout, closing connection");
                break;
            }
        }
    }

    state.hub.disconnect(&conn).await;
    writer.abort();
}

/// Tell the client why it was refused, then close.
async fn reject(sender: &mut SplitSink<WebSocket, Message>, error: &AuthError) {
    let payload = match serde_json::to_value(ConnectErrorPayload::from(error)) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode connect_error");
            serde_json::Value::Null
        }
    };

    if let Ok(text) = messages::encode(&OutboundEvent::new(events::CONNECT_ERROR, payload)) {
        let _ = sender.send(Message::Text(text.into())).await;
    }
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code: error.close_code(),
            reason: Utf8Bytes::from_static(error.reason()),
        })))
        .await;
}
