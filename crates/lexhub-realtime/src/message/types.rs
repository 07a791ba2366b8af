//! Inbound and outbound WebSocket message type definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use lexhub_core::types::RoomId;
use lexhub_core::{AppError, AppResult};

/// Closed set of message types the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Welcome message sent after a successful connect.
    Connect,
    /// Connection is being closed by the server.
    Disconnect,
    /// Liveness ping or pong.
    Heartbeat,
    /// A document in a room changed.
    DocumentUpdate,
    /// A user joined or left a room.
    UserPresence,
    /// Notification targeted at specific users.
    Notification,
    /// Chat message relayed to a room.
    ChatMessage,
    /// System-wide announcement.
    SystemMessage,
    /// Error reply to a malformed or rejected inbound message.
    Error,
    /// A user's presence status changed.
    PresenceUpdate,
    /// Acknowledgement of a room join or leave.
    RoomUpdate,
}

impl MessageType {
    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Heartbeat => "heartbeat",
            Self::DocumentUpdate => "document_update",
            Self::UserPresence => "user_presence",
            Self::Notification => "notification",
            Self::ChatMessage => "chat_message",
            Self::SystemMessage => "system_message",
            Self::Error => "error",
            Self::PresenceUpdate => "presence_update",
            Self::RoomUpdate => "room_update",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound message as written to a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Type-specific payload.
    #[serde(default)]
    pub data: Value,
    /// When the message was produced.
    pub timestamp: DateTime<Utc>,
    /// Room the message was addressed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

impl Envelope {
    /// Create an envelope stamped with the current time.
    pub fn new(message_type: MessageType, data: Value) -> Self {
        Self {
            message_type,
            data,
            timestamp: Utc::now(),
            room_id: None,
        }
    }

    /// Tag the envelope with the room it was addressed to.
    pub fn in_room(mut self, room_id: impl Into<RoomId>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    /// Serialize to the JSON text sent over the wire.
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Error codes carried in `error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Not valid JSON, empty, or oversized.
    InvalidMessage,
    /// Inbound type is neither built in nor registered.
    UnknownType,
    /// Chat sent to a room the connection has not joined.
    NotAMember,
    /// Missing or malformed room id, or room limit reached.
    InvalidRoom,
    /// A registered handler returned an error.
    HandlerFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::UnknownType => "UNKNOWN_TYPE",
            Self::NotAMember => "NOT_A_MEMBER",
            Self::InvalidRoom => "INVALID_ROOM",
            Self::HandlerFailed => "HANDLER_FAILED",
        }
    }
}

/// Raw inbound message shape: `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// Message type as sent by the client.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Payload, `null` when omitted.
    #[serde(default)]
    pub data: Value,
}

/// Built-in inbound commands plus a passthrough for registered types.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
    Heartbeat,
    JoinRoom { room_id: RoomId },
    LeaveRoom { room_id: RoomId },
    ChatMessage { room_id: RoomId, message: Value },
    Custom { message_type: String, data: Value },
}

impl InboundMessage {
    /// Parse raw JSON text.
    pub fn parse(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::validation(format!("Failed to parse message: {e}")))
    }

    /// Classify into a command.
    ///
    /// Room-bearing commands require a string `data.room_id`; the room id
    /// format itself is checked by the validator.
    pub fn into_command(self) -> AppResult<InboundCommand> {
        let Self { message_type, data } = self;
        match message_type.as_str() {
            "heartbeat" => Ok(InboundCommand::Heartbeat),
            "join_room" => Ok(InboundCommand::JoinRoom {
                room_id: required_room_id(&data)?,
            }),
            "leave_room" => Ok(InboundCommand::LeaveRoom {
                room_id: required_room_id(&data)?,
            }),
            "chat_message" => Ok(InboundCommand::ChatMessage {
                room_id: required_room_id(&data)?,
                message: data.get("message").cloned().unwrap_or(Value::Null),
            }),
            _ => Ok(InboundCommand::Custom { message_type, data }),
        }
    }
}

fn required_room_id(data: &Value) -> AppResult<RoomId> {
    data.get("room_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::validation("Missing room_id"))
}
