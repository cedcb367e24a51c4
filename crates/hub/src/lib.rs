pub mod registry;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::{
    domain::{ConnectionId, ConversationId, SubjectId},
    protocol::{GatewayEvent, MessageEvent},
};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::registry::RoomRegistry;

const MESSAGE_TAP_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct HubOptions {
    /// Echo broadcasts back to the sending connection. Off by default since
    /// clients render their own messages locally.
    pub include_sender: bool,
}

struct ConnectionEntry {
    subject: SubjectId,
    outbound: mpsc::UnboundedSender<GatewayEvent>,
    connected_at: DateTime<Utc>,
}

/// Room membership plus message fan-out, independent of any transport.
///
/// The hub only ever sees connection ids and outbound queues; the websocket
/// layer attaches a queue per authenticated socket and drains it. Dropping
/// the receiving end is how a transport signals teardown, so a failed
/// enqueue is a dropped delivery, never an error.
pub struct Hub {
    options: HubOptions,
    registry: RoomRegistry,
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
    messages: broadcast::Sender<MessageEvent>,
}

impl Hub {
    pub fn new() -> Self {
        Self::with_options(HubOptions::default())
    }

    pub fn with_options(options: HubOptions) -> Self {
        let (messages, _) = broadcast::channel(MESSAGE_TAP_CAPACITY);
        Self {
            options,
            registry: RoomRegistry::new(),
            connections: RwLock::new(HashMap::new()),
            messages,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Registers an authenticated connection, handing back its id and the
    /// queue the transport should drain.
    pub async fn attach(
        &self,
        subject: SubjectId,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let id = ConnectionId::new();
        let (outbound, rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(
            id,
            ConnectionEntry {
                subject: subject.clone(),
                outbound,
                connected_at: Utc::now(),
            },
        );
        info!(connection_id = %id, subject = %subject, "connection attached");
        (id, rx)
    }

    /// Tears the connection down: removes it from every room and drops its
    /// outbound queue, cancelling pending deliveries. Safe to call twice.
    pub async fn detach(&self, connection: ConnectionId) {
        let left = self.registry.leave_all(connection).await;
        let removed = self.connections.write().await.remove(&connection);
        if let Some(entry) = removed {
            info!(
                connection_id = %connection,
                subject = %entry.subject,
                rooms_left = left.len(),
                session_ms = (Utc::now() - entry.connected_at).num_milliseconds(),
                "connection detached"
            );
        }
    }

    /// Idempotent join. Returns false when the connection was already in the
    /// room.
    pub async fn join(&self, connection: ConnectionId, room: &ConversationId) -> bool {
        let newly_joined = self.registry.join(connection, room).await;
        if newly_joined {
            debug!(connection_id = %connection, conversation_id = %room, "joined conversation");
        }
        newly_joined
    }

    pub async fn leave(&self, connection: ConnectionId, room: &ConversationId) -> bool {
        let removed = self.registry.leave(connection, room).await;
        if removed {
            debug!(connection_id = %connection, conversation_id = %room, "left conversation");
        }
        removed
    }

    /// Fans the message out to the room's current members, skipping the
    /// sender unless `include_sender` is set. Returns the number of
    /// deliveries enqueued. Messages to absent or empty rooms are dropped
    /// silently; a closed member queue is a dropped delivery.
    pub async fn broadcast(
        &self,
        sender: ConnectionId,
        room: &ConversationId,
        payload: serde_json::Value,
    ) -> usize {
        let subject = {
            let connections = self.connections.read().await;
            match connections.get(&sender) {
                Some(entry) => entry.subject.clone(),
                None => {
                    warn!(connection_id = %sender, "broadcast from unknown connection dropped");
                    return 0;
                }
            }
        };

        // the tap mirrors every accepted message; no listeners is fine
        let _ = self.messages.send(MessageEvent {
            conversation_id: room.clone(),
            sender: subject,
            payload: payload.clone(),
            sent_at: Utc::now(),
        });

        let Some(handle) = self.registry.room_handle(room).await else {
            debug!(conversation_id = %room, "message to absent room dropped");
            return 0;
        };

        // room lock held across the fan-out: per-room deliveries are
        // serialized and members observe one message order
        let members = handle.lock().await;
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for member in members.iter() {
            if !self.options.include_sender && *member == sender {
                continue;
            }
            let Some(entry) = connections.get(member) else {
                continue;
            };
            let frame = GatewayEvent::NewMessage(payload.clone());
            if entry.outbound.send(frame).is_err() {
                debug!(connection_id = %member, "delivery to closing connection dropped");
                continue;
            }
            delivered += 1;
        }
        delivered
    }

    pub async fn subject_of(&self, connection: ConnectionId) -> Option<SubjectId> {
        self.connections
            .read()
            .await
            .get(&connection)
            .map(|entry| entry.subject.clone())
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Every accepted message, before fan-out. Intended for an external
    /// message store observing the stream.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<MessageEvent> {
        self.messages.subscribe()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
