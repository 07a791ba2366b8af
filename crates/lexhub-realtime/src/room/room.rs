//! A single broadcast room.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use lexhub_core::types::{ConnectionId, RoomId};

/// Named set of member connections.
#[derive(Debug, Clone)]
pub struct Room {
    /// Room id.
    pub id: RoomId,
    /// Member connection ids.
    members: HashSet<ConnectionId>,
    /// When the room was first joined.
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Creates a new empty room.
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: HashSet::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a member; returns `false` if it was already present.
    pub fn join(&mut self, connection_id: ConnectionId) -> bool {
        self.members.insert(connection_id)
    }

    /// Removes a member; returns `false` if it was not present.
    pub fn leave(&mut self, connection_id: &str) -> bool {
        self.members.remove(connection_id)
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.members.contains(connection_id)
    }

    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.members.iter().cloned().collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Drop members for which `keep` returns false; returns how many went.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.members.len();
        self.members.retain(|c| keep(c.as_str()));
        before - self.members.len()
    }
}
