//! Identifier aliases and generators.
//!
//! User ids come from the credential resolver and room ids from clients,
//! so both are opaque strings. Connection and session ids are generated
//! here as UUIDv7 strings, which keeps them time-ordered in log output.

use uuid::Uuid;

/// Identifier of an authenticated user, as produced by the credential resolver.
pub type UserId = String;

/// Identifier of a single live transport connection.
pub type ConnectionId = String;

/// Identifier of a broadcast room (an opaque client-chosen string).
pub type RoomId = String;

/// Opaque session identifier.
pub type SessionId = String;

/// Generates a new connection identifier.
pub fn new_connection_id() -> ConnectionId {
    Uuid::now_v7().to_string()
}

/// Generates a new session identifier.
pub fn new_session_id() -> SessionId {
    Uuid::now_v7().to_string()
}

/// Generates a new node identifier used to tag distributed broadcasts.
pub fn new_node_id() -> String {
    format!("node-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(new_connection_id(), new_connection_id());
        assert_ne!(new_session_id(), new_session_id());
    }

    #[test]
    fn test_node_id_prefix() {
        assert!(new_node_id().starts_with("node-"));
    }
}
