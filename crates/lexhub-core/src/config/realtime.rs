//! Real-time connection layer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection registry and event broadcaster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Identifier of this server process. Generated at startup when unset.
    #[serde(default)]
    pub node_id: Option<String>,
    /// Pub/sub channel carrying broadcasts between nodes.
    #[serde(default = "default_event_channel")]
    pub event_channel: String,
    /// Outbound buffer size of a channel-backed transport.
    #[serde(default = "default_send_buffer")]
    pub send_buffer_size: usize,
    /// Transport write timeout in milliseconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
    /// Heartbeat ping interval in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Seconds without a client heartbeat before a connection is reaped.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_seconds: u64,
    /// Interval of the empty-room cleanup sweep in seconds.
    #[serde(default = "default_room_cleanup_interval")]
    pub room_cleanup_interval_seconds: u64,
    /// Maximum live connections per user; the oldest is replaced beyond it.
    #[serde(default = "default_max_connections_per_user")]
    pub max_connections_per_user: usize,
    /// Maximum rooms a single connection may join.
    #[serde(default = "default_max_rooms")]
    pub max_rooms_per_connection: usize,
    /// Maximum accepted inbound message size in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            event_channel: default_event_channel(),
            send_buffer_size: default_send_buffer(),
            write_timeout_ms: default_write_timeout(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            heartbeat_timeout_seconds: default_heartbeat_timeout(),
            room_cleanup_interval_seconds: default_room_cleanup_interval(),
            max_connections_per_user: default_max_connections_per_user(),
            max_rooms_per_connection: default_max_rooms(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl RealtimeConfig {
    /// Heartbeat ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Idle time after which a connection is considered dead.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_seconds)
    }

    /// Empty-room cleanup interval.
    pub fn room_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.room_cleanup_interval_seconds)
    }

    /// Transport write timeout.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn default_event_channel() -> String {
    "lexhub:events".to_string()
}

fn default_send_buffer() -> usize {
    256
}

fn default_write_timeout() -> u64 {
    5_000
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_heartbeat_timeout() -> u64 {
    60
}

fn default_room_cleanup_interval() -> u64 {
    300
}

fn default_max_connections_per_user() -> usize {
    10
}

fn default_max_rooms() -> usize {
    100
}

fn default_max_message_bytes() -> usize {
    65_536
}
