//! Distributed event broadcaster.
//!
//! Every broadcast is delivered to matching local connections right away,
//! then published on the shared event channel so other nodes can deliver
//! it to theirs. Each node tags what it publishes with its node id and
//! skips those messages when they come back over the subscription.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lexhub_core::config::RealtimeConfig;
use lexhub_core::traits::{MessageStream, PubSubBroker};
use lexhub_core::types::id::new_node_id;
use lexhub_core::types::{RoomId, UserId};

use crate::connection::ConnectionRegistry;
use crate::message::MessageType;
use crate::metrics::RealtimeMetrics;
use crate::tasks::BackgroundTasks;

use super::handler::{EventHandler, HandlerRegistry};
use super::message::BroadcastMessage;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Fans events out to local connections and to peer nodes.
pub struct EventBroadcaster {
    registry: Arc<ConnectionRegistry>,
    broker: Arc<dyn PubSubBroker>,
    handlers: HandlerRegistry,
    node_id: String,
    channel: String,
    metrics: Arc<RealtimeMetrics>,
    tasks: BackgroundTasks,
}

impl fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("node_id", &self.node_id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl EventBroadcaster {
    pub fn new(
        config: &RealtimeConfig,
        registry: Arc<ConnectionRegistry>,
        broker: Arc<dyn PubSubBroker>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            registry,
            broker,
            handlers: HandlerRegistry::new(),
            node_id: config.node_id.clone().unwrap_or_else(new_node_id),
            channel: config.event_channel.clone(),
            metrics,
            tasks: BackgroundTasks::new(),
        }
    }

    /// Identifier stamped on every broadcast this node publishes.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Register a server-side handler for an event type.
    pub async fn on_event(&self, event_type: MessageType, handler: Arc<dyn EventHandler>) {
        self.handlers.register(event_type, handler).await;
    }

    /// Broadcast an event.
    ///
    /// Delivers to local connections, publishes for peer nodes, and runs
    /// the registered handlers. A publish failure degrades to local-only
    /// delivery. Returns the number of local deliveries.
    pub async fn broadcast(
        &self,
        event_type: MessageType,
        data: Value,
        user_ids: Option<Vec<UserId>>,
        room_id: Option<RoomId>,
    ) -> usize {
        let message = BroadcastMessage::new(event_type, data, user_ids, room_id, &self.node_id);

        let delivered = self.deliver_local(&message).await;
        self.publish(&message).await;
        self.handlers.dispatch(&message).await;

        debug!(
            event_type = %event_type,
            delivered,
            "Broadcast dispatched"
        );
        delivered
    }

    async fn deliver_local(&self, message: &BroadcastMessage) -> usize {
        let envelope = message.envelope();
        match (&message.user_ids, &message.room_id) {
            (Some(user_ids), _) => {
                let mut delivered = 0;
                for user_id in user_ids {
                    delivered += self.registry.deliver_to_user(user_id, &envelope).await;
                }
                delivered
            }
            (None, Some(room_id)) => self.registry.deliver_to_room(room_id, &envelope, None).await,
            (None, None) => self.registry.deliver_to_all(&envelope, None).await,
        }
    }

    async fn publish(&self, message: &BroadcastMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize broadcast");
                return;
            }
        };

        match self.broker.publish(&self.channel, &payload).await {
            Ok(()) => self.metrics.broadcast_published(),
            Err(e) => {
                self.metrics.publish_failed();
                warn!(
                    channel = %self.channel,
                    error = %e,
                    "Broadcast publish failed, delivered locally only"
                );
            }
        }
    }

    /// Handle a payload received from the event channel.
    ///
    /// Own broadcasts are skipped; everything else is delivered locally
    /// and passed to handlers, never republished.
    pub async fn handle_remote(&self, payload: &str) {
        let message: BroadcastMessage = match serde_json::from_str(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Discarding malformed broadcast");
                return;
            }
        };

        if message.origin == self.node_id {
            return;
        }

        let delivered = self.deliver_local(&message).await;
        self.handlers.dispatch(&message).await;
        self.metrics.broadcast_relayed();

        debug!(
            event_type = %message.event_type,
            origin = %message.origin,
            delivered,
            "Relayed remote broadcast"
        );
    }

    /// Subscribe to the event channel and start relaying.
    ///
    /// If the broker is unreachable the node keeps running local-only and
    /// retries in the background.
    pub async fn start(self: &Arc<Self>) {
        let initial = match self.broker.subscribe(&self.channel).await {
            Ok(stream) => {
                info!(channel = %self.channel, node_id = %self.node_id, "Subscribed to broadcast channel");
                Some(stream)
            }
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "Broadcast subscribe failed, running local-only");
                None
            }
        };

        let broadcaster = Arc::clone(self);
        self.tasks
            .spawn("broadcast_subscriber", move |cancel| async move {
                broadcaster.run_subscriber(initial, cancel).await;
            })
            .await;
    }

    pub async fn stop(&self) {
        self.tasks.shutdown().await;
    }

    async fn run_subscriber(&self, mut stream: Option<MessageStream>, cancel: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let mut current = match stream.take() {
                Some(current) => current,
                None => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    match self.broker.subscribe(&self.channel).await {
                        Ok(current) => {
                            info!(channel = %self.channel, "Resubscribed to broadcast channel");
                            backoff = INITIAL_BACKOFF;
                            current
                        }
                        Err(e) => {
                            warn!(error = %e, retry_in = ?backoff, "Broadcast resubscribe failed");
                            backoff = (backoff * 2).min(MAX_BACKOFF);
                            continue;
                        }
                    }
                }
            };

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    next = current.next() => match next {
                        Some(payload) => self.handle_remote(&payload).await,
                        None => {
                            warn!(channel = %self.channel, "Broadcast subscription ended");
                            break;
                        }
                    },
                }
            }
        }
    }
}
