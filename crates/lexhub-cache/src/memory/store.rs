//! In-memory key/value store using the moka crate.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use moka::Expiry;
use moka::future::Cache;

use lexhub_core::config::store::MemoryStoreConfig;
use lexhub_core::result::AppResult;
use lexhub_core::traits::store::KeyValueStore;

/// A cached string value together with the TTL it was written with.
#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    ttl: Duration,
}

/// Per-entry expiry policy: every write restarts the entry's own TTL.
struct WriteTtl;

impl Expiry<String, StoredValue> for WriteTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// A set or list with an optional deadline.
#[derive(Debug, Default)]
struct Collection<T> {
    items: T,
    expires_at: Option<Instant>,
}

impl<T> Collection<T> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory store. Strings live in moka with per-entry TTL; sets and
/// lists live in dashmaps and expire lazily on access.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    /// The underlying moka cache.
    values: Cache<String, StoredValue>,
    /// Set collections.
    sets: std::sync::Arc<DashMap<String, Collection<HashSet<String>>>>,
    /// List collections.
    lists: std::sync::Arc<DashMap<String, Collection<VecDeque<String>>>>,
}

impl MemoryStore {
    /// Create a new in-memory store from configuration.
    pub fn new(config: &MemoryStoreConfig) -> Self {
        let values = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(WriteTtl)
            .build();

        Self {
            values,
            sets: std::sync::Arc::new(DashMap::new()),
            lists: std::sync::Arc::new(DashMap::new()),
        }
    }

    /// Drop a set if its deadline has passed.
    fn evict_expired_set(&self, key: &str) {
        let now = Instant::now();
        self.sets.remove_if(key, |_, set| set.is_expired(now));
    }

    /// Drop a list if its deadline has passed.
    fn evict_expired_list(&self, key: &str) {
        let now = Instant::now();
        self.lists.remove_if(key, |_, list| list.is_expired(now));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&MemoryStoreConfig::default())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.values.get(key).await.map(|stored| stored.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.values
            .insert(
                key.to_string(),
                StoredValue {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let value = self.values.remove(key).await.is_some();
        let set = self.sets.remove(key).is_some();
        let list = self.lists.remove(key).is_some();
        Ok(value || set || list)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        if let Some(mut stored) = self.values.get(key).await {
            stored.ttl = ttl;
            self.values.insert(key.to_string(), stored).await;
            return Ok(true);
        }

        self.evict_expired_set(key);
        self.evict_expired_list(key);
        let deadline = Some(Instant::now() + ttl);
        if let Some(mut set) = self.sets.get_mut(key) {
            set.expires_at = deadline;
            return Ok(true);
        }
        if let Some(mut list) = self.lists.get_mut(key) {
            list.expires_at = deadline;
            return Ok(true);
        }
        Ok(false)
    }

    async fn set_add(&self, key: &str, member: &str) -> AppResult<()> {
        self.evict_expired_set(key);
        self.sets
            .entry(key.to_string())
            .or_default()
            .items
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> AppResult<()> {
        self.evict_expired_set(key);
        let now_empty = match self.sets.get_mut(key) {
            Some(mut set) => {
                set.items.remove(member);
                set.items.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.sets.remove_if(key, |_, set| set.items.is_empty());
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> AppResult<Vec<String>> {
        self.evict_expired_set(key);
        Ok(self
            .sets
            .get(key)
            .map(|set| set.items.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_push(&self, key: &str, values: &[String]) -> AppResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.evict_expired_list(key);
        self.lists
            .entry(key.to_string())
            .or_default()
            .items
            .extend(values.iter().cloned());
        Ok(())
    }

    async fn list_range(&self, key: &str) -> AppResult<Vec<String>> {
        self.evict_expired_list(key);
        Ok(self
            .lists
            .get(key)
            .map(|list| list.items.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexhub_core::traits::store::KeyValueStoreExt;

    fn make_store() -> MemoryStore {
        MemoryStore::new(&MemoryStoreConfig {
            max_capacity: 1000,
            channel_capacity: 16,
        })
    }

    #[tokio::test]
    async fn test_set_get() {
        let store = make_store();
        store
            .set("key1", "value1", Duration::from_secs(60))
            .await
            .unwrap();
        let val = store.get("key1").await.unwrap();
        assert_eq!(val, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let store = make_store();
        store
            .set("key2", "value2", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.delete("key2").await.unwrap());
        assert!(!store.delete("key2").await.unwrap());
        assert_eq!(store.get("key2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_expires_after_its_own_ttl() {
        let store = make_store();
        store
            .set("short", "v", Duration::from_millis(30))
            .await
            .unwrap();
        store
            .set("long", "v", Duration::from_secs(60))
            .await
            .unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.get("long").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_set_members_and_removal_prunes_empty_set() {
        let store = make_store();
        store.set_add("room", "a").await.unwrap();
        store.set_add("room", "b").await.unwrap();
        store.set_add("room", "a").await.unwrap();
        let mut members = store.set_members("room").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);

        store.set_remove("room", "a").await.unwrap();
        store.set_remove("room", "b").await.unwrap();
        assert!(store.set_members("room").await.unwrap().is_empty());
        assert!(!store.expire("room", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_set_is_dropped() {
        let store = make_store();
        store.set_add("tmp", "x").await.unwrap();
        assert!(store.expire("tmp", Duration::from_millis(10)).await.unwrap());
        std::thread::sleep(Duration::from_millis(30));
        assert!(store.set_members("tmp").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_push_preserves_order() {
        let store = make_store();
        store
            .list_push("log", &["1".to_string(), "2".to_string()])
            .await
            .unwrap();
        store.list_push("log", &["3".to_string()]).await.unwrap();
        assert_eq!(
            store.list_range("log").await.unwrap(),
            vec!["1".to_string(), "2".to_string(), "3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_json_helpers_through_trait_object() {
        let store: std::sync::Arc<dyn KeyValueStore> = std::sync::Arc::new(make_store());
        let data = serde_json::json!({"name": "test", "count": 42});
        store
            .set_json("json_key", &data, Duration::from_secs(60))
            .await
            .unwrap();
        let result: Option<serde_json::Value> = store.get_json("json_key").await.unwrap();
        assert_eq!(result, Some(data));
    }
}
