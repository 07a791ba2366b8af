//! Liveness classification for the periodic heartbeat check.

use std::time::Duration;

use super::handle::{Connection, ConnectionState};

/// What the heartbeat check should do with a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Healthy; send a ping.
    Alive,
    /// Idle past the timeout; force-disconnect.
    TimedOut,
    /// A previous send failed; reap.
    Dead,
    /// Still handshaking or already being torn down; leave alone.
    Skip,
}

/// Classify a connection against the heartbeat timeout.
pub async fn check_liveness(connection: &Connection, timeout: Duration) -> Liveness {
    match connection.state() {
        ConnectionState::Disconnected => Liveness::Dead,
        ConnectionState::Connecting | ConnectionState::Disconnecting => Liveness::Skip,
        ConnectionState::Connected => {
            if connection.idle_for().await > timeout {
                Liveness::TimedOut
            } else {
                Liveness::Alive
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use crate::connection::transport::ChannelTransport;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_classification() {
        let (transport, _peer) = ChannelTransport::pair(1, Duration::from_secs(1));
        let conn = Connection::new("c1".into(), "u1".into(), transport, Map::new());
        let timeout = Duration::from_secs(60);

        assert_eq!(check_liveness(&conn, timeout).await, Liveness::Skip);

        conn.set_state(ConnectionState::Connected);
        assert_eq!(check_liveness(&conn, timeout).await, Liveness::Alive);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(check_liveness(&conn, timeout).await, Liveness::TimedOut);

        conn.mark_dead();
        assert_eq!(check_liveness(&conn, timeout).await, Liveness::Dead);
    }
}
