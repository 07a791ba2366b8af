//! Broadcast wire format shared by every node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use lexhub_core::types::{RoomId, UserId};

use crate::message::{Envelope, MessageType};

/// A broadcast as published on the event channel.
///
/// Delivery scope: `user_ids` when present, else `room_id`, else every
/// connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub event_type: MessageType,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<UserId>>,
    /// Node that produced the broadcast.
    pub origin: String,
}

impl BroadcastMessage {
    pub fn new(
        event_type: MessageType,
        data: Value,
        user_ids: Option<Vec<UserId>>,
        room_id: Option<RoomId>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now(),
            room_id,
            user_ids,
            origin: origin.into(),
        }
    }

    /// Client-facing envelope; keeps the original timestamp.
    pub fn envelope(&self) -> Envelope {
        Envelope {
            message_type: self.event_type,
            data: self.data.clone(),
            timestamp: self.timestamp,
            room_id: self.room_id.clone(),
        }
    }
}
