//! Builder helpers for constructing outbound envelopes.

use chrono::Utc;
use serde_json::json;

use super::types::{Envelope, ErrorCode, MessageType};

/// Welcome message sent right after a connection is accepted.
pub fn build_welcome(connection_id: &str, user_id: &str) -> Envelope {
    Envelope::new(
        MessageType::Connect,
        json!({
            "connection_id": connection_id,
            "user_id": user_id,
            "server_time": Utc::now(),
        }),
    )
}

/// Server-initiated liveness probe.
pub fn build_ping() -> Envelope {
    Envelope::new(
        MessageType::Heartbeat,
        json!({ "status": "ping", "server_time": Utc::now() }),
    )
}

/// Reply to a client heartbeat.
pub fn build_pong() -> Envelope {
    Envelope::new(
        MessageType::Heartbeat,
        json!({ "status": "pong", "server_time": Utc::now() }),
    )
}

/// Build an error message
pub fn build_error(code: ErrorCode, message: &str) -> Envelope {
    Envelope::new(
        MessageType::Error,
        json!({ "code": code, "message": message }),
    )
}

/// Acknowledge a room join or leave.
pub fn build_room_update(room_id: &str, action: &str, member_count: usize) -> Envelope {
    Envelope::new(
        MessageType::RoomUpdate,
        json!({
            "room_id": room_id,
            "action": action,
            "member_count": member_count,
        }),
    )
    .in_room(room_id)
}

/// Chat payload relayed to the other members of a room.
pub fn build_chat(
    room_id: &str,
    user_id: &str,
    connection_id: &str,
    message: serde_json::Value,
) -> serde_json::Value {
    json!({
        "room_id": room_id,
        "user_id": user_id,
        "connection_id": connection_id,
        "message": message,
    })
}
