//! Activity tracker: bounded event buffer with periodic flush to
//! per-day logs and periodic analytics checkpoints.
//!
//! The buffer is lossy: when it is full the oldest event is dropped.
//! Analytics are updated immediately on every tracked event.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use lexhub_core::config::ActivityConfig;
use lexhub_core::types::{SessionId, UserId};

use crate::metrics::RealtimeMetrics;
use crate::tasks::BackgroundTasks;

use super::analytics::{ActivityStats, UserAnalytics};
use super::event::{ActivityEvent, ActivityType};
use super::sink::ActivitySink;

/// Records user interaction events.
pub struct ActivityTracker {
    buffer: Mutex<VecDeque<ActivityEvent>>,
    analytics: RwLock<HashMap<UserId, UserAnalytics>>,
    sink: Arc<dyn ActivitySink>,
    metrics: Arc<RealtimeMetrics>,
    config: ActivityConfig,
    tasks: BackgroundTasks,
}

impl fmt::Debug for ActivityTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityTracker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ActivityTracker {
    pub fn new(
        config: ActivityConfig,
        sink: Arc<dyn ActivitySink>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(config.buffer_capacity.min(1024))),
            analytics: RwLock::new(HashMap::new()),
            sink,
            metrics,
            config,
            tasks: BackgroundTasks::new(),
        }
    }

    fn capacity(&self) -> usize {
        self.config.buffer_capacity.max(1)
    }

    /// Record one event: buffer it and fold it into the user's analytics.
    pub async fn track_activity(
        &self,
        user_id: &str,
        activity_type: ActivityType,
        page: Option<String>,
        element: Option<String>,
        metadata: Option<Map<String, Value>>,
        session_id: Option<SessionId>,
    ) -> ActivityEvent {
        let event = ActivityEvent::new(user_id, activity_type)
            .with_page(page)
            .with_element(element)
            .with_metadata(metadata)
            .with_session(session_id);
        self.record(event.clone()).await;
        event
    }

    async fn record(&self, event: ActivityEvent) {
        {
            let mut analytics = self.analytics.write().await;
            analytics
                .entry(event.user_id.clone())
                .or_insert_with(|| UserAnalytics::new(event.user_id.clone()))
                .record(&event);
        }

        let mut buffer = self.buffer.lock().await;
        if buffer.len() >= self.capacity() {
            buffer.pop_front();
            self.metrics.activity_dropped(1);
        }
        buffer.push_back(event);
    }

    // ── Wrappers ─────────────────────────────────────────────────────

    pub async fn track_page_view(
        &self,
        user_id: &str,
        page: &str,
        session_id: Option<SessionId>,
    ) -> ActivityEvent {
        self.track_activity(
            user_id,
            ActivityType::PageView,
            Some(page.to_string()),
            None,
            None,
            session_id,
        )
        .await
    }

    pub async fn track_click(&self, user_id: &str, page: &str, element: &str) -> ActivityEvent {
        self.track_activity(
            user_id,
            ActivityType::Click,
            Some(page.to_string()),
            Some(element.to_string()),
            None,
            None,
        )
        .await
    }

    pub async fn track_document_open(&self, user_id: &str, document_id: &str) -> ActivityEvent {
        self.track_document(user_id, ActivityType::DocumentOpen, document_id, None)
            .await
    }

    pub async fn track_document_edit(
        &self,
        user_id: &str,
        document_id: &str,
        changes: Option<Value>,
    ) -> ActivityEvent {
        self.track_document(user_id, ActivityType::DocumentEdit, document_id, changes)
            .await
    }

    pub async fn track_document_save(&self, user_id: &str, document_id: &str) -> ActivityEvent {
        self.track_document(user_id, ActivityType::DocumentSave, document_id, None)
            .await
    }

    async fn track_document(
        &self,
        user_id: &str,
        activity_type: ActivityType,
        document_id: &str,
        changes: Option<Value>,
    ) -> ActivityEvent {
        let mut metadata = Map::new();
        metadata.insert("document_id".into(), json!(document_id));
        if let Some(changes) = changes {
            metadata.insert("changes".into(), changes);
        }
        self.track_activity(
            user_id,
            activity_type,
            Some(format!("/documents/{document_id}")),
            None,
            Some(metadata),
            None,
        )
        .await
    }

    pub async fn track_search(&self, user_id: &str, query: &str, results: usize) -> ActivityEvent {
        let mut metadata = Map::new();
        metadata.insert("query".into(), json!(query));
        metadata.insert("results_count".into(), json!(results));
        self.track_activity(user_id, ActivityType::Search, None, None, Some(metadata), None)
            .await
    }

    pub async fn track_error(
        &self,
        user_id: &str,
        error_message: &str,
        page: Option<String>,
    ) -> ActivityEvent {
        let mut metadata = Map::new();
        metadata.insert("error_message".into(), json!(error_message));
        self.track_activity(user_id, ActivityType::Error, page, None, Some(metadata), None)
            .await
    }

    pub async fn track_feature_use(&self, user_id: &str, feature: &str) -> ActivityEvent {
        self.track_activity(
            user_id,
            ActivityType::FeatureUse,
            None,
            Some(feature.to_string()),
            None,
            None,
        )
        .await
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Drain the buffer into per-day partitions.
    ///
    /// Days that fail to write go back to the front of the buffer for the
    /// next flush. Returns the number of events written.
    pub async fn flush(&self) -> usize {
        let drained: Vec<ActivityEvent> = self.buffer.lock().await.drain(..).collect();
        if drained.is_empty() {
            return 0;
        }

        let mut by_day: BTreeMap<NaiveDate, Vec<ActivityEvent>> = BTreeMap::new();
        for event in drained {
            by_day
                .entry(event.timestamp.date_naive())
                .or_default()
                .push(event);
        }

        let mut written = 0;
        let mut failed = Vec::new();
        for (day, events) in by_day {
            match self.sink.append_day(day, &events).await {
                Ok(()) => written += events.len(),
                Err(e) => {
                    warn!(%day, count = events.len(), error = %e, "Activity flush failed, requeueing");
                    failed.extend(events);
                }
            }
        }

        if !failed.is_empty() {
            self.requeue(failed).await;
        }
        if written > 0 {
            debug!(written, "Flushed activity buffer");
        }
        written
    }

    async fn requeue(&self, failed: Vec<ActivityEvent>) {
        let mut buffer = self.buffer.lock().await;
        for event in failed.into_iter().rev() {
            buffer.push_front(event);
        }
        let overflow = buffer.len().saturating_sub(self.capacity());
        if overflow > 0 {
            buffer.drain(..overflow);
            self.metrics.activity_dropped(overflow as u64);
        }
    }

    /// Persist every in-process analytics snapshot. Returns how many were saved.
    pub async fn checkpoint(&self) -> usize {
        let snapshots: Vec<UserAnalytics> =
            self.analytics.read().await.values().cloned().collect();

        let mut saved = 0;
        for analytics in &snapshots {
            match self.sink.save_analytics(analytics).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    warn!(user_id = %analytics.user_id, error = %e, "Analytics checkpoint failed")
                }
            }
        }
        debug!(saved, "Checkpointed analytics");
        saved
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// A user's analytics, from memory or the last checkpoint.
    pub async fn get_user_analytics(&self, user_id: &str) -> Option<UserAnalytics> {
        if let Some(analytics) = self.analytics.read().await.get(user_id) {
            return Some(analytics.clone());
        }

        let loaded = match self.sink.load_analytics(user_id).await {
            Ok(loaded) => loaded?,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to load analytics checkpoint");
                return None;
            }
        };
        let mut analytics = self.analytics.write().await;
        Some(
            analytics
                .entry(user_id.to_string())
                .or_insert(loaded)
                .clone(),
        )
    }

    /// Aggregate over `from..=to` from in-process analytics.
    pub async fn get_activity_stats(&self, from: NaiveDate, to: NaiveDate) -> ActivityStats {
        let mut stats = ActivityStats::default();
        for analytics in self.analytics.read().await.values() {
            stats.add_user(analytics, from, to);
        }
        stats
    }

    /// A user's most recent events, newest first.
    ///
    /// Covers the unflushed buffer and the per-day logs of the lookback
    /// window.
    pub async fn get_user_activity_history(
        &self,
        user_id: &str,
        limit: usize,
        activity_type: Option<ActivityType>,
    ) -> Vec<ActivityEvent> {
        let matches = |event: &ActivityEvent| {
            event.user_id == user_id && activity_type.is_none_or(|t| event.activity_type == t)
        };

        let mut history: Vec<ActivityEvent> = self
            .buffer
            .lock()
            .await
            .iter()
            .rev()
            .filter(|e| matches(e))
            .take(limit)
            .cloned()
            .collect();

        let today = Utc::now().date_naive();
        for offset in 0..=self.config.history_lookback_days {
            if history.len() >= limit {
                break;
            }
            let day = today - ChronoDuration::days(offset as i64);
            let events = match self.sink.read_day(day).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(%day, error = %e, "Failed to read activity log");
                    continue;
                }
            };
            let remaining = limit - history.len();
            history.extend(events.into_iter().rev().filter(|e| matches(e)).take(remaining));
        }

        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history
    }

    /// Events waiting for the next flush.
    pub async fn buffered_len(&self) -> usize {
        self.buffer.lock().await.len()
    }

    pub async fn start(self: &Arc<Self>) {
        let tracker = Arc::clone(self);
        self.tasks
            .spawn_periodic("activity_flush", self.config.flush_interval(), move || {
                let tracker = tracker.clone();
                async move {
                    tracker.flush().await;
                    Ok(())
                }
            })
            .await;

        let tracker = Arc::clone(self);
        self.tasks
            .spawn_periodic(
                "activity_checkpoint",
                self.config.checkpoint_interval(),
                move || {
                    let tracker = tracker.clone();
                    async move {
                        tracker.checkpoint().await;
                        Ok(())
                    }
                },
            )
            .await;
    }

    /// Stop the loops, then write out whatever is still buffered.
    pub async fn stop(&self) {
        self.tasks.shutdown().await;
        let flushed = self.flush().await;
        let saved = self.checkpoint().await;
        info!(flushed, saved, "Activity tracker stopped");
    }
}
