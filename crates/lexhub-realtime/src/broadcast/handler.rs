//! Server-side event handlers run for every broadcast.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{error, warn};

use lexhub_core::AppResult;

use crate::message::MessageType;

use super::message::BroadcastMessage;

/// Reacts to broadcasts of one event type, locally produced or remote.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, message: &BroadcastMessage) -> AppResult<()>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(BroadcastMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    async fn handle(&self, message: &BroadcastMessage) -> AppResult<()> {
        (self.0)(message.clone()).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(BroadcastMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Handlers keyed by event type, kept in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<MessageType, Vec<Arc<dyn EventHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, event_type: MessageType, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .await
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    pub async fn handler_count(&self, event_type: MessageType) -> usize {
        self.handlers.read().await.get(&event_type).map_or(0, Vec::len)
    }

    /// Run every handler for the message's type in order.
    ///
    /// A failing or panicking handler is logged and does not stop the
    /// rest. Returns the number of handlers that failed.
    pub async fn dispatch(&self, message: &BroadcastMessage) -> usize {
        let handlers = match self.handlers.read().await.get(&message.event_type) {
            Some(handlers) => handlers.clone(),
            None => return 0,
        };

        let mut failed = 0;
        for handler in handlers {
            match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    warn!(event_type = %message.event_type, error = %e, "Event handler failed");
                }
                Err(_) => {
                    failed += 1;
                    error!(event_type = %message.event_type, "Event handler panicked");
                }
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use lexhub_core::AppError;
    use serde_json::json;

    use super::*;

    fn message(event_type: MessageType) -> BroadcastMessage {
        BroadcastMessage::new(event_type, json!({}), None, None, "node-test")
    }

    async fn explode(_: BroadcastMessage) -> AppResult<()> {
        panic!("second panics")
    }

    #[tokio::test]
    async fn test_handlers_run_in_order_despite_failures() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        registry
            .register(
                MessageType::DocumentUpdate,
                handler_fn(move |_| {
                    let log = log.clone();
                    async move {
                        log.lock().unwrap().push("first");
                        Err::<(), _>(AppError::internal("first fails"))
                    }
                }),
            )
            .await;
        registry
            .register(
                MessageType::DocumentUpdate,
                handler_fn(explode),
            )
            .await;
        let log = seen.clone();
        registry
            .register(
                MessageType::DocumentUpdate,
                handler_fn(move |_| {
                    let log = log.clone();
                    async move {
                        log.lock().unwrap().push("third");
                        Ok(())
                    }
                }),
            )
            .await;

        let failed = registry.dispatch(&message(MessageType::DocumentUpdate)).await;
        assert_eq!(failed, 2);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "third"]);
    }

    #[tokio::test]
    async fn test_dispatch_without_handlers() {
        let registry = HandlerRegistry::new();
        assert_eq!(registry.dispatch(&message(MessageType::ChatMessage)).await, 0);
        assert_eq!(registry.handler_count(MessageType::ChatMessage).await, 0);
    }
}
