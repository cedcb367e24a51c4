use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConversationId, SubjectId};

/// Events a client sends over the realtime channel.
///
/// Wire shape: `{"type": "<event-name>", "payload": ...}` with kebab-case
/// event names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Payload is the bare conversation id string.
    JoinConversation(ConversationId),
    SendMessage(SendMessagePayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub conversation_id: ConversationId,
    /// Opaque message content; the gateway relays it without inspection.
    pub message: serde_json::Value,
}

/// Events the gateway pushes to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum GatewayEvent {
    /// Payload is the message content as submitted by the sender.
    NewMessage(serde_json::Value),
}

/// A message accepted for broadcast. Not persisted here; the hub republishes
/// these on a tap channel so an external message store can observe the same
/// stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub conversation_id: ConversationId,
    pub sender: SubjectId,
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketTokenResponse {
    pub token: String,
}
