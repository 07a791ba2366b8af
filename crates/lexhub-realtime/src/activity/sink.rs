//! Durable destination for flushed activity and analytics snapshots.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use lexhub_cache::keys;
use lexhub_core::AppResult;
use lexhub_core::config::ActivityConfig;
use lexhub_core::traits::{KeyValueStore, KeyValueStoreExt};

use super::analytics::UserAnalytics;
use super::event::ActivityEvent;

/// Where the tracker writes per-day logs and analytics checkpoints.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Append events to the partition of `day`.
    async fn append_day(&self, day: NaiveDate, events: &[ActivityEvent]) -> AppResult<()>;

    /// Every event in the partition of `day`, oldest first.
    async fn read_day(&self, day: NaiveDate) -> AppResult<Vec<ActivityEvent>>;

    async fn save_analytics(&self, analytics: &UserAnalytics) -> AppResult<()>;

    async fn load_analytics(&self, user_id: &str) -> AppResult<Option<UserAnalytics>>;
}

/// [`ActivitySink`] over the distributed key/value store.
///
/// Day partitions are lists whose expiry is pushed forward on every
/// append; analytics snapshots are plain JSON values.
pub struct StoreActivitySink {
    store: Arc<dyn KeyValueStore>,
    log_retention: Duration,
    analytics_retention: Duration,
}

impl fmt::Debug for StoreActivitySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreActivitySink")
            .field("log_retention", &self.log_retention)
            .field("analytics_retention", &self.analytics_retention)
            .finish_non_exhaustive()
    }
}

impl StoreActivitySink {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &ActivityConfig) -> Self {
        Self {
            store,
            log_retention: config.log_retention(),
            analytics_retention: config.analytics_retention(),
        }
    }
}

#[async_trait]
impl ActivitySink for StoreActivitySink {
    async fn append_day(&self, day: NaiveDate, events: &[ActivityEvent]) -> AppResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let lines = events
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let key = keys::activity_log(day);
        self.store.list_push(&key, &lines).await?;
        // The events are stored at this point; failing here would requeue
        // and duplicate them.
        if let Err(e) = self.store.expire(&key, self.log_retention).await {
            warn!(%day, error = %e, "Failed to refresh activity log TTL");
        }
        Ok(())
    }

    async fn read_day(&self, day: NaiveDate) -> AppResult<Vec<ActivityEvent>> {
        let lines = self.store.list_range(&keys::activity_log(day)).await?;
        let events = lines
            .iter()
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(%day, error = %e, "Skipping malformed activity entry");
                    None
                }
            })
            .collect();
        Ok(events)
    }

    async fn save_analytics(&self, analytics: &UserAnalytics) -> AppResult<()> {
        self.store
            .set_json(
                &keys::user_analytics(&analytics.user_id),
                analytics,
                self.analytics_retention,
            )
            .await
    }

    async fn load_analytics(&self, user_id: &str) -> AppResult<Option<UserAnalytics>> {
        self.store.get_json(&keys::user_analytics(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use lexhub_cache::memory::MemoryStore;

    use crate::activity::event::ActivityType;

    use super::*;

    #[tokio::test]
    async fn test_day_partition_appends_in_order() {
        let store = Arc::new(MemoryStore::default());
        let sink = StoreActivitySink::new(store.clone(), &ActivityConfig::default());
        let day = Utc::now().date_naive();

        let first = ActivityEvent::new("u1", ActivityType::Login);
        let second = ActivityEvent::new("u2", ActivityType::Search);
        sink.append_day(day, std::slice::from_ref(&first)).await.unwrap();
        sink.append_day(day, std::slice::from_ref(&second)).await.unwrap();

        store
            .list_push(&keys::activity_log(day), &["not json".to_string()])
            .await
            .unwrap();

        let events = sink.read_day(day).await.unwrap();
        assert_eq!(events, vec![first, second]);
    }
}
