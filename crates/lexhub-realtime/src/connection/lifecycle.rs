//! Hooks the registry fires as users come and go.

use async_trait::async_trait;

/// Observer of connection lifecycle transitions.
///
/// Calls for one user are serialized by the registry, so a listener sees
/// `user_connected` and `user_disconnected` in the order they happened.
/// Implementations must not call back into the registry's
/// connect/disconnect path for the same user.
#[async_trait]
pub trait LifecycleListener: Send + Sync {
    /// A connection for `user_id` was registered.
    async fn user_connected(&self, _user_id: &str, _connection_id: &str) {}

    /// The last connection of `user_id` went away.
    async fn user_disconnected(&self, _user_id: &str) {}

    /// A client heartbeat arrived.
    async fn heartbeat(&self, _user_id: &str) {}

    /// The user's first connection joined `room_id`.
    async fn room_joined(&self, _user_id: &str, _room_id: &str) {}

    /// The user's last connection left `room_id`.
    async fn room_left(&self, _user_id: &str, _room_id: &str) {}
}
