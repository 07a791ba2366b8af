//! Connection pool: tracks registered connections indexed by id and user.
//!
//! The pool is plain data; the registry guards it together with the room
//! index under one lock so the two never disagree.

use std::collections::HashMap;
use std::sync::Arc;

use lexhub_core::types::{ConnectionId, UserId};

use super::handle::Connection;

#[derive(Debug, Default)]
pub struct ConnectionPool {
    by_id: HashMap<ConnectionId, Arc<Connection>>,
    /// Per user, in registration order (oldest first).
    by_user: HashMap<UserId, Vec<Arc<Connection>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to the pool.
    pub fn add(&mut self, connection: Arc<Connection>) {
        self.by_id.insert(connection.id.clone(), connection.clone());
        self.by_user
            .entry(connection.user_id.clone())
            .or_default()
            .push(connection);
    }

    /// Removes a connection; drops the user entry with its last connection.
    pub fn remove(&mut self, connection_id: &str) -> Option<Arc<Connection>> {
        let connection = self.by_id.remove(connection_id)?;
        if let Some(connections) = self.by_user.get_mut(&connection.user_id) {
            connections.retain(|c| c.id != connection_id);
            if connections.is_empty() {
                self.by_user.remove(&connection.user_id);
            }
        }
        Some(connection)
    }

    pub fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.by_id.get(connection_id).cloned()
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.by_id.contains_key(connection_id)
    }

    /// Gets all connections for a user, oldest first.
    pub fn user_connections(&self, user_id: &str) -> Vec<Arc<Connection>> {
        self.by_user.get(user_id).cloned().unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    pub fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.by_id.values().cloned().collect()
    }

    pub fn connected_user_ids(&self) -> Vec<UserId> {
        self.by_user.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Map;

    use crate::connection::transport::ChannelTransport;

    use super::*;

    fn conn(id: &str, user: &str) -> Arc<Connection> {
        let (transport, _peer) = ChannelTransport::pair(1, Duration::from_secs(1));
        Arc::new(Connection::new(id.into(), user.into(), transport, Map::new()))
    }

    #[test]
    fn test_user_index_tracks_connections() {
        let mut pool = ConnectionPool::new();
        pool.add(conn("c1", "alice"));
        pool.add(conn("c2", "alice"));
        pool.add(conn("c3", "bob"));

        assert_eq!(pool.connection_count(), 3);
        assert_eq!(pool.user_count(), 2);
        let alice: Vec<_> = pool.user_connections("alice").iter().map(|c| c.id.clone()).collect();
        assert_eq!(alice, vec!["c1", "c2"]);

        pool.remove("c1");
        assert_eq!(pool.user_connections("alice").len(), 1);
        pool.remove("c2");
        assert!(pool.user_connections("alice").is_empty());
        assert!(pool.remove("c2").is_none());
    }
}
