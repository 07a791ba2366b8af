//! Persisted presence record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use lexhub_core::types::{RoomId, UserId};

use super::status::PresenceStatus;

/// A user's live availability, as cached and as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPresence {
    pub user_id: UserId,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub active_rooms: BTreeSet<RoomId>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl UserPresence {
    /// A fresh online record.
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            status: PresenceStatus::Online,
            last_seen: Utc::now(),
            active_rooms: BTreeSet::new(),
            metadata: Map::new(),
        }
    }

    /// Whether the user was seen at or after `cutoff`.
    pub fn seen_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_seen >= cutoff
    }
}

/// Presence counters for the inspection surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStats {
    pub online: usize,
    pub away: usize,
    pub busy: usize,
    pub rooms: usize,
}
