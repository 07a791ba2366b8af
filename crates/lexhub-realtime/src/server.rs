//! Top-level real-time engine that ties together all subsystems.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use lexhub_core::AppResult;
use lexhub_core::config::AppConfig;
use lexhub_core::traits::{KeyValueStore, PubSubBroker};

use crate::activity::{ActivityTracker, StoreActivitySink};
use crate::broadcast::EventBroadcaster;
use crate::connection::registry::RegistryStats;
use crate::connection::{ConnectionRegistry, LifecycleListener};
use crate::metrics::{MetricsSnapshot, RealtimeMetrics};
use crate::presence::handler::STATUS_UPDATE;
use crate::presence::{PresenceService, PresenceStats, StatusUpdateHandler};
use crate::session::SessionStore;

/// Central real-time engine that coordinates every component.
#[derive(Clone)]
pub struct RealtimeEngine {
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub presence: Arc<PresenceService>,
    pub sessions: Arc<SessionStore>,
    pub activity: Arc<ActivityTracker>,
    pub metrics: Arc<RealtimeMetrics>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine")
            .field("node_id", &self.broadcaster.node_id())
            .finish_non_exhaustive()
    }
}

/// Read-only counters for operational tooling.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub node_id: String,
    pub registry: RegistryStats,
    pub presence: PresenceStats,
    pub active_sessions: usize,
    pub buffered_activity: usize,
    pub metrics: MetricsSnapshot,
}

impl RealtimeEngine {
    /// Wire every component over the given store and broker.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn KeyValueStore>,
        broker: Arc<dyn PubSubBroker>,
    ) -> AppResult<Self> {
        let metrics = Arc::new(RealtimeMetrics::new());
        let registry = Arc::new(ConnectionRegistry::new(
            config.realtime.clone(),
            metrics.clone(),
        ));
        let broadcaster = Arc::new(EventBroadcaster::new(
            &config.realtime,
            registry.clone(),
            broker,
            metrics.clone(),
        ));
        let presence = Arc::new(PresenceService::new(
            config.presence.clone(),
            store.clone(),
            broadcaster.clone(),
        ));
        let sessions = Arc::new(SessionStore::new(config.session.clone(), store.clone()));
        let sink = Arc::new(StoreActivitySink::new(store, &config.activity));
        let activity = Arc::new(ActivityTracker::new(
            config.activity.clone(),
            sink,
            metrics.clone(),
        ));

        let listener: Arc<dyn LifecycleListener> = presence.clone();
        registry.set_listener(Arc::downgrade(&listener));
        presence.attach_registry(&registry);
        registry.register_handler(STATUS_UPDATE, Arc::new(StatusUpdateHandler::new(&presence)))?;

        info!(node_id = %broadcaster.node_id(), "Real-time engine initialized");

        Ok(Self {
            registry,
            broadcaster,
            presence,
            sessions,
            activity,
            metrics,
        })
    }

    /// Start every background loop and the broadcast subscriber.
    pub async fn start(&self) {
        self.registry.start().await;
        self.broadcaster.start().await;
        self.presence.start().await;
        self.sessions.start().await;
        self.activity.start().await;
        info!("Real-time engine started");
    }

    /// Stop every loop, close remaining connections, and flush activity.
    pub async fn stop(&self) {
        info!("Shutting down real-time engine");

        self.registry.stop().await;
        let closed = self.registry.close_all().await;
        self.presence.stop().await;
        self.sessions.stop().await;
        self.broadcaster.stop().await;
        self.activity.stop().await;

        info!(closed, "Real-time engine shut down");
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            node_id: self.broadcaster.node_id().to_string(),
            registry: self.registry.stats().await,
            presence: self.presence.stats().await,
            active_sessions: self.sessions.active_session_count().await,
            buffered_activity: self.activity.buffered_len().await,
            metrics: self.metrics.snapshot(),
        }
    }
}
