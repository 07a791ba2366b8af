//! Store manager that dispatches to the configured backend.

use std::sync::Arc;

use tracing::info;

use lexhub_core::config::store::StoreConfig;
use lexhub_core::error::AppError;
use lexhub_core::result::AppResult;
use lexhub_core::traits::pubsub::PubSubBroker;
use lexhub_core::traits::store::KeyValueStore;

/// Holds the key/value store and pub/sub broker selected by configuration.
///
/// Both halves always come from the same backend so that presence and
/// broadcast traffic share one coordination point.
#[derive(Debug, Clone)]
pub struct StoreManager {
    /// Key/value half.
    store: Arc<dyn KeyValueStore>,
    /// Pub/sub half.
    broker: Arc<dyn PubSubBroker>,
}

impl StoreManager {
    /// Create a new store manager from configuration.
    pub async fn new(config: &StoreConfig) -> AppResult<Self> {
        match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis store provider");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                Ok(Self {
                    store: Arc::new(crate::redis::RedisStore::new(client.clone())),
                    broker: Arc::new(crate::redis::RedisPubSub::new(client)),
                })
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory store provider");
                Ok(Self::in_memory(config))
            }
            other => Err(AppError::configuration(format!(
                "Unknown store provider: '{other}'. Supported: memory, redis"
            ))),
        }
    }

    /// Create an in-memory store manager.
    #[cfg(feature = "memory")]
    pub fn in_memory(config: &StoreConfig) -> Self {
        Self {
            store: Arc::new(crate::memory::MemoryStore::new(&config.memory)),
            broker: Arc::new(crate::memory::MemoryPubSub::new(
                config.memory.channel_capacity,
            )),
        }
    }

    /// Create a store manager from existing parts (for testing).
    pub fn from_parts(store: Arc<dyn KeyValueStore>, broker: Arc<dyn PubSubBroker>) -> Self {
        Self { store, broker }
    }

    /// The key/value store.
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    /// The pub/sub broker.
    pub fn broker(&self) -> Arc<dyn PubSubBroker> {
        Arc::clone(&self.broker)
    }
}
