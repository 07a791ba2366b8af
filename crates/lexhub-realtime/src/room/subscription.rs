//! Subscription tracking: which rooms each connection has joined.

use std::collections::{HashMap, HashSet};

use lexhub_core::types::{ConnectionId, RoomId};

/// Tracks connection-to-room mappings (reverse index).
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    conn_to_rooms: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl SubscriptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription.
    pub fn add(&mut self, connection_id: &str, room_id: &str) {
        self.conn_to_rooms
            .entry(connection_id.to_string())
            .or_default()
            .insert(room_id.to_string());
    }

    /// Removes a subscription.
    pub fn remove(&mut self, connection_id: &str, room_id: &str) {
        if let Some(rooms) = self.conn_to_rooms.get_mut(connection_id) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                self.conn_to_rooms.remove(connection_id);
            }
        }
    }

    /// Gets all rooms a connection has joined.
    pub fn rooms(&self, connection_id: &str) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self
            .conn_to_rooms
            .get(connection_id)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Returns the number of rooms a connection has joined.
    pub fn count(&self, connection_id: &str) -> usize {
        self.conn_to_rooms.get(connection_id).map_or(0, HashSet::len)
    }

    /// Removes all subscriptions for a connection.
    pub fn remove_all(&mut self, connection_id: &str) -> HashSet<RoomId> {
        self.conn_to_rooms.remove(connection_id).unwrap_or_default()
    }
}
