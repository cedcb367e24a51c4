use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::{
    domain::{ConnectionId, SubjectId},
    protocol::{ClientEvent, SendMessagePayload},
};
use tracing::{debug, info, warn};

use crate::app_state::AppState;

#[derive(Debug, Clone, Copy)]
pub(crate) struct HeartbeatConfig {
    pub(crate) interval: Duration,
    pub(crate) idle_timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    token: Option<String>,
}

/// Credentials are checked before the upgrade completes, so a rejected
/// handshake never registers a connection.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> Response {
    let subject = match auth::verify_session_token(&state.tokens, q.token.as_deref()) {
        Ok(subject) => subject,
        Err(error) => {
            warn!(%error, "websocket handshake rejected");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| ws_connection(state, socket, subject))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, subject: SubjectId) {
    let (connection_id, mut outbound) = state.hub.attach(subject).await;
    let (mut sink, mut stream) = socket.split();

    let heartbeat = state.heartbeat;
    let send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat.interval);
        loop {
            tokio::select! {
                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // any inbound frame counts as liveness; a connection silent for the
    // whole idle window gets closed
    loop {
        let frame = match tokio::time::timeout(heartbeat.idle_timeout, stream.next()).await {
            Ok(frame) => frame,
            Err(_) => {
                info!(connection_id = %connection_id, "closing idle connection");
                break;
            }
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                handle_client_event(&state, connection_id, &text).await;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Binary(_))) => {
                warn!(connection_id = %connection_id, "ignoring binary frame");
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(error)) => {
                debug!(connection_id = %connection_id, %error, "websocket transport error");
                break;
            }
        }
    }

    send_task.abort();
    state.hub.detach(connection_id).await;
}

async fn handle_client_event(state: &AppState, connection: ConnectionId, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::JoinConversation(conversation_id)) => {
            state.hub.join(connection, &conversation_id).await;
        }
        Ok(ClientEvent::SendMessage(SendMessagePayload {
            conversation_id,
            message,
        })) => {
            let delivered = state
                .hub
                .broadcast(connection, &conversation_id, message)
                .await;
            debug!(
                connection_id = %connection,
                conversation_id = %conversation_id,
                delivered,
                "message broadcast"
            );
        }
        Err(error) => {
            // malformed frames are dropped; the connection stays up
            warn!(connection_id = %connection, %error, "ignoring malformed client event");
        }
    }
}

#[cfg(test)]
#[path = "tests/ws_tests.rs"]
mod tests;
