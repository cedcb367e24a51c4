use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use shared::domain::{ConnectionId, ConversationId};
use tokio::sync::{Mutex, RwLock};

/// Shared handle to one room's member set. The mutex doubles as the room's
/// sequencing point: membership changes and fan-outs for the same room never
/// interleave, while unrelated rooms proceed in parallel.
pub(crate) type RoomHandle = Arc<Mutex<BTreeSet<ConnectionId>>>;

/// Tracks which connections are in which conversation rooms.
///
/// Rooms exist only while they have members: first join creates the room,
/// last leave reclaims it. The forward map and the per-connection reverse
/// index are mutated under one writer lock so they never diverge.
#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    rooms: HashMap<ConversationId, RoomHandle>,
    joined: HashMap<ConnectionId, HashSet<ConversationId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the connection to the room, creating the room on first join.
    /// Returns false when the connection was already a member.
    pub async fn join(&self, connection: ConnectionId, room: &ConversationId) -> bool {
        let mut inner = self.inner.write().await;
        let handle = inner.rooms.entry(room.clone()).or_default().clone();
        inner
            .joined
            .entry(connection)
            .or_default()
            .insert(room.clone());
        let mut members = handle.lock().await;
        members.insert(connection)
    }

    /// Removes the connection from the room. Returns false when it was not a
    /// member. An emptied room is removed from the registry.
    pub async fn leave(&self, connection: ConnectionId, room: &ConversationId) -> bool {
        let mut inner = self.inner.write().await;
        let Some(handle) = inner.rooms.get(room).cloned() else {
            return false;
        };
        let (removed, now_empty) = {
            let mut members = handle.lock().await;
            let removed = members.remove(&connection);
            (removed, members.is_empty())
        };
        if removed {
            if let Some(joined) = inner.joined.get_mut(&connection) {
                joined.remove(room);
                if joined.is_empty() {
                    inner.joined.remove(&connection);
                }
            }
        }
        if now_empty {
            inner.rooms.remove(room);
        }
        removed
    }

    /// Removes the connection from every room it joined, reclaiming rooms it
    /// emptied. Returns the rooms left, sorted.
    pub async fn leave_all(&self, connection: ConnectionId) -> Vec<ConversationId> {
        let mut inner = self.inner.write().await;
        let rooms: Vec<ConversationId> = inner
            .joined
            .remove(&connection)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();

        let mut left = Vec::with_capacity(rooms.len());
        for room in rooms {
            let Some(handle) = inner.rooms.get(&room).cloned() else {
                continue;
            };
            let now_empty = {
                let mut members = handle.lock().await;
                members.remove(&connection);
                members.is_empty()
            };
            if now_empty {
                inner.rooms.remove(&room);
            }
            left.push(room);
        }
        left.sort();
        left
    }

    /// Snapshot of the room's members in deterministic (sorted) order.
    /// Absent rooms yield an empty list.
    pub async fn members(&self, room: &ConversationId) -> Vec<ConnectionId> {
        let handle = {
            let inner = self.inner.read().await;
            inner.rooms.get(room).cloned()
        };
        match handle {
            Some(handle) => handle.lock().await.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Snapshot of the rooms the connection has joined, sorted.
    pub async fn rooms_of(&self, connection: ConnectionId) -> Vec<ConversationId> {
        let inner = self.inner.read().await;
        let mut rooms: Vec<ConversationId> = inner
            .joined
            .get(&connection)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    pub(crate) async fn room_handle(&self, room: &ConversationId) -> Option<RoomHandle> {
        self.inner.read().await.rooms.get(room).cloned()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
