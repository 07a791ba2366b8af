//! Individual client connection handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use lexhub_core::traits::Transport;
use lexhub_core::types::{ConnectionId, RoomId, UserId};
use lexhub_core::{AppError, AppResult};

use crate::message::Envelope;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting = 0,
    /// Accepted and registered.
    Connected = 1,
    /// Being torn down.
    Disconnecting = 2,
    /// Closed, or marked dead after a failed send.
    Disconnected = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Connected,
            2 => Self::Disconnecting,
            _ => Self::Disconnected,
        }
    }
}

/// A handle to a single client connection.
///
/// Sends are serialized through `send_lock`, so messages reach one
/// connection in the order they were sent.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection ID
    pub id: ConnectionId,
    /// User who owns this connection
    pub user_id: UserId,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    transport: Arc<dyn Transport>,
    state: AtomicU8,
    last_heartbeat: RwLock<Instant>,
    metadata: RwLock<Map<String, Value>>,
    send_lock: Mutex<()>,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        user_id: UserId,
        transport: Arc<dyn Transport>,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            user_id,
            connected_at: Utc::now(),
            transport,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            last_heartbeat: RwLock::new(Instant::now()),
            metadata: RwLock::new(metadata),
            send_lock: Mutex::new(()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Check if connection is accepting sends
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Mark connection as dead; it is reaped on the next heartbeat check.
    pub fn mark_dead(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    /// Record client liveness.
    pub async fn touch(&self) {
        *self.last_heartbeat.write().await = Instant::now();
    }

    /// Time since the last recorded liveness signal.
    pub async fn idle_for(&self) -> Duration {
        self.last_heartbeat.read().await.elapsed()
    }

    /// Serialize and send an envelope.
    pub async fn send(&self, envelope: &Envelope) -> AppResult<()> {
        let text = envelope.to_json()?;
        self.send_text(&text).await
    }

    /// Send pre-serialized text. A failed write marks the connection dead.
    pub async fn send_text(&self, text: &str) -> AppResult<()> {
        if !self.is_connected() {
            return Err(AppError::transport(format!(
                "Connection {} is not connected",
                self.id
            )));
        }

        let _guard = self.send_lock.lock().await;
        let result = self.transport.send(text).await;
        if result.is_err() {
            self.mark_dead();
        }
        result
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Snapshot of caller-supplied metadata.
    pub async fn metadata(&self) -> Map<String, Value> {
        self.metadata.read().await.clone()
    }

    /// Set a single metadata entry.
    pub async fn set_metadata(&self, key: impl Into<String>, value: Value) {
        self.metadata.write().await.insert(key.into(), value);
    }

    /// Get a snapshot of connection info
    pub async fn info(&self, rooms: Vec<RoomId>) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            state: self.state(),
            connected_at: self.connected_at,
            idle_seconds: self.idle_for().await.as_secs(),
            rooms,
            metadata: self.metadata().await,
        }
    }
}

/// Snapshot of connection info (serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub state: ConnectionState,
    pub connected_at: DateTime<Utc>,
    /// Seconds since the last heartbeat
    pub idle_seconds: u64,
    pub rooms: Vec<RoomId>,
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::connection::transport::ChannelTransport;
    use crate::message::MessageType;

    use super::*;

    #[tokio::test]
    async fn test_send_requires_connected_state() {
        let (transport, mut peer) = ChannelTransport::pair(8, Duration::from_secs(1));
        let conn = Connection::new("c1".into(), "u1".into(), transport, Map::new());

        let env = Envelope::new(MessageType::Heartbeat, json!({}));
        assert!(conn.send(&env).await.is_err());

        conn.set_state(ConnectionState::Connected);
        conn.send(&env).await.unwrap();
        assert_eq!(peer.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_marks_dead() {
        let (transport, peer) = ChannelTransport::pair(8, Duration::from_secs(1));
        let conn = Connection::new("c1".into(), "u1".into(), transport, Map::new());
        conn.set_state(ConnectionState::Connected);
        drop(peer);

        assert!(conn.send_text("{}").await.is_err());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_resets_idle_time() {
        let (transport, _peer) = ChannelTransport::pair(8, Duration::from_secs(1));
        let conn = Connection::new("c1".into(), "u1".into(), transport, Map::new());

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(conn.idle_for().await >= Duration::from_secs(40));

        conn.touch().await;
        assert!(conn.idle_for().await < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_info_snapshot() {
        let (transport, _peer) = ChannelTransport::pair(8, Duration::from_secs(1));
        let mut meta = Map::new();
        meta.insert("client".into(), json!("web"));
        let conn = Connection::new("c1".into(), "u1".into(), transport, meta);
        conn.set_metadata("tab", json!(3)).await;

        let info = conn.info(vec!["room:a".into()]).await;
        assert_eq!(info.state, ConnectionState::Connecting);
        assert_eq!(info.rooms, vec!["room:a".to_string()]);
        assert_eq!(info.metadata["client"], "web");
        assert_eq!(info.metadata["tab"], 3);
    }
}
