use crate::events::ConnectionId;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};

/// What one live connection holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub room_id: i64,
    pub username: String,
    pub user_id: Option<i64>,
}

/// In-memory index of live connections: connection -> room binding, and
/// room -> username -> holders.
///
/// Durable membership lives in the participants table; this registry only
/// answers "who is connected right now". Both maps are written in the same
/// order (connections first) so concurrent writers never deadlock.
pub struct PresenceRegistry {
    connections: DashMap<ConnectionId, PresenceEntry>,
    rooms: DashMap<i64, HashMap<String, HashMap<ConnectionId, Option<i64>>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Bind `connection_id` to a room/username, returning its previous binding.
    pub fn register(&self, connection_id: ConnectionId, entry: PresenceEntry) -> Option<PresenceEntry> {
        let previous = self.connections.insert(connection_id, entry.clone());
        if let Some(prev) = &previous {
            self.detach(connection_id, prev);
        }
        self.rooms
            .entry(entry.room_id)
            .or_default()
            .entry(entry.username)
            .or_default()
            .insert(connection_id, entry.user_id);
        previous
    }

    pub fn remove(&self, connection_id: ConnectionId) -> Option<PresenceEntry> {
        let (_, entry) = self.connections.remove(&connection_id)?;
        self.detach(connection_id, &entry);
        Some(entry)
    }

    fn detach(&self, connection_id: ConnectionId, entry: &PresenceEntry) {
        let mut room_empty = false;
        if let Some(mut room) = self.rooms.get_mut(&entry.room_id) {
            if let Some(holders) = room.get_mut(&entry.username) {
                holders.remove(&connection_id);
                if holders.is_empty() {
                    room.remove(&entry.username);
                }
            }
            room_empty = room.is_empty();
        }
        if room_empty {
            self.rooms.remove_if(&entry.room_id, |_, room| room.is_empty());
        }
    }

    pub fn entry(&self, connection_id: ConnectionId) -> Option<PresenceEntry> {
        self.connections.get(&connection_id).map(|e| e.clone())
    }

    /// Live connections holding `username` in the room, with their user ids.
    pub fn holders(&self, room_id: i64, username: &str) -> Vec<(ConnectionId, Option<i64>)> {
        self.rooms
            .get(&room_id)
            .and_then(|room| {
                room.get(username)
                    .map(|h| h.iter().map(|(c, u)| (*c, *u)).collect())
            })
            .unwrap_or_default()
    }

    pub fn is_online(&self, room_id: i64, username: &str) -> bool {
        self.rooms
            .get(&room_id)
            .is_some_and(|room| room.contains_key(username))
    }

    pub fn live_usernames(&self, room_id: i64) -> HashSet<String> {
        self.rooms
            .get(&room_id)
            .map(|room| room.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
