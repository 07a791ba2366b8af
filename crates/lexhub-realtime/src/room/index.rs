//! Room index: rooms plus the reverse subscription map.

use std::collections::HashMap;

use lexhub_core::types::{ConnectionId, RoomId};

use super::room::Room;
use super::subscription::SubscriptionTracker;

/// All rooms with at least one member.
///
/// Invariant: a connection is listed in a room exactly when the room is
/// listed under that connection in the subscription tracker, and no room
/// in the index is empty after a mutating call returns.
#[derive(Debug, Default)]
pub struct RoomIndex {
    rooms: HashMap<RoomId, Room>,
    subscriptions: SubscriptionTracker,
}

impl RoomIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a room, creating it if needed.
    ///
    /// Returns `false` when the connection was already a member.
    pub fn join(&mut self, room_id: &str, connection_id: &str) -> bool {
        let joined = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id.to_string()))
            .join(connection_id.to_string());
        if joined {
            self.subscriptions.add(connection_id, room_id);
        }
        joined
    }

    /// Removes a connection from a room, pruning the room when empty.
    pub fn leave(&mut self, room_id: &str, connection_id: &str) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let left = room.leave(connection_id);
        if room.is_empty() {
            self.rooms.remove(room_id);
        }
        if left {
            self.subscriptions.remove(connection_id, room_id);
        }
        left
    }

    /// Removes a connection from every room; returns the rooms it left.
    pub fn leave_all(&mut self, connection_id: &str) -> Vec<RoomId> {
        let mut left: Vec<RoomId> = self.subscriptions.remove_all(connection_id).into_iter().collect();
        left.sort();
        for room_id in &left {
            if let Some(room) = self.rooms.get_mut(room_id) {
                room.leave(connection_id);
                if room.is_empty() {
                    self.rooms.remove(room_id);
                }
            }
        }
        left
    }

    pub fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(Room::member_ids)
            .unwrap_or_default()
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, Room::member_count)
    }

    pub fn is_member(&self, room_id: &str, connection_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|room| room.contains(connection_id))
    }

    /// Rooms a connection has joined, sorted.
    pub fn rooms_of(&self, connection_id: &str) -> Vec<RoomId> {
        self.subscriptions.rooms(connection_id)
    }

    pub fn room_count_of(&self, connection_id: &str) -> usize {
        self.subscriptions.count(connection_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Drop members that fail `is_live` and prune empty rooms.
    ///
    /// Returns the number of rooms removed.
    pub fn prune(&mut self, mut is_live: impl FnMut(&str) -> bool) -> usize {
        let mut stale = Vec::new();
        for room in self.rooms.values_mut() {
            let mut dropped = Vec::new();
            room.retain(|conn| {
                let live = is_live(conn);
                if !live {
                    dropped.push(conn.to_string());
                }
                live
            });
            for conn in dropped {
                self.subscriptions.remove(&conn, &room.id);
            }
            if room.is_empty() {
                stale.push(room.id.clone());
            }
        }
        for room_id in &stale {
            self.rooms.remove(room_id);
        }
        stale.len()
    }
}
