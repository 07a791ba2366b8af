//! In-memory pub/sub for single-node deployments.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::warn;

use lexhub_core::result::AppResult;
use lexhub_core::traits::pubsub::{MessageStream, PubSubBroker};

/// In-memory pub/sub implementation.
///
/// Clones share the same channels, so two engines built over clones of one
/// broker behave like two nodes on one Redis.
#[derive(Debug, Clone)]
pub struct MemoryPubSub {
    /// Channel name → broadcast sender
    channels: Arc<DashMap<String, broadcast::Sender<String>>>,
    /// Buffer size for channels
    buffer_size: usize,
}

impl MemoryPubSub {
    /// Create a new in-memory pub/sub
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            buffer_size: buffer_size.max(1),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .clone()
    }
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl PubSubBroker for MemoryPubSub {
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<()> {
        // No subscribers is not an error; the message is simply dropped.
        let _ = self.sender(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> AppResult<MessageStream> {
        let rx = self.sender(channel).subscribe();
        let channel = channel.to_string();

        let stream = futures::stream::unfold(rx, move |mut rx| {
            let channel = channel.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(payload) => return Some((payload, rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(channel = %channel, skipped, "Subscriber lagged, messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_payloads_in_order() {
        let broker = MemoryPubSub::new(16);
        let mut stream = broker.subscribe("events").await.unwrap();

        broker.publish("events", "one").await.unwrap();
        broker.publish("events", "two").await.unwrap();

        assert_eq!(stream.next().await, Some("one".to_string()));
        assert_eq!(stream.next().await, Some("two".to_string()));
    }

    #[tokio::test]
    async fn test_clones_share_channels() {
        let broker = MemoryPubSub::new(16);
        let peer = broker.clone();
        let mut stream = peer.subscribe("events").await.unwrap();

        broker.publish("events", "hello").await.unwrap();
        assert_eq!(stream.next().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let broker = MemoryPubSub::new(16);
        assert!(broker.publish("nobody", "x").await.is_ok());
    }
}
