//! Publish/subscribe broker trait for cross-node fan-out.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::result::AppResult;

/// Stream of raw payloads received on a subscribed channel.
pub type MessageStream = BoxStream<'static, String>;

/// Trait for pub/sub backends (Redis or in-process).
///
/// Delivery is at-most-once and unordered across publishers. A publisher
/// may receive its own messages; consumers filter by origin.
#[async_trait]
pub trait PubSubBroker: Send + Sync + std::fmt::Debug + 'static {
    /// Publish a payload on a named channel.
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<()>;

    /// Subscribe to a named channel. The stream ends when the backend
    /// connection is lost.
    async fn subscribe(&self, channel: &str) -> AppResult<MessageStream>;
}
