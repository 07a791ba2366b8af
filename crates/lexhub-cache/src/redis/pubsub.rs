//! Redis pub/sub broker for multi-node deployments.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use tracing::{debug, warn};

use lexhub_core::error::{AppError, ErrorKind};
use lexhub_core::result::AppResult;
use lexhub_core::traits::pubsub::{MessageStream, PubSubBroker};

use super::client::RedisClient;

/// Redis pub/sub broker for cross-node message relay.
///
/// Publishing goes through the shared multiplexed connection; every
/// subscription opens its own dedicated pub/sub connection.
#[derive(Debug, Clone)]
pub struct RedisPubSub {
    /// Redis client.
    client: RedisClient,
}

impl RedisPubSub {
    /// Creates a new Redis pub/sub broker.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PubSubBroker for RedisPubSub {
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<()> {
        let full_channel = self.client.prefixed_key(channel);
        let mut conn = self.client.conn_mut();
        let receivers: i64 = conn
            .publish(&full_channel, payload)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis PUBLISH failed", e))?;
        debug!(channel = %full_channel, receivers, "Published message");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> AppResult<MessageStream> {
        let full_channel = self.client.prefixed_key(channel);
        let mut pubsub = self
            .client
            .client()
            .get_async_pubsub()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Cache, "Failed to open Redis pub/sub", e)
            })?;

        pubsub
            .subscribe(&full_channel)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis SUBSCRIBE failed", e))?;

        let stream = pubsub.into_on_message().filter_map(|msg| {
            let payload = match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(error = %e, "Dropping non-text pub/sub payload");
                    None
                }
            };
            futures::future::ready(payload)
        });

        Ok(stream.boxed())
    }
}
