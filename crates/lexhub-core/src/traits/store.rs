//! Key/value store trait for the distributed coordination backend.

use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;

/// Trait for the shared key/value store (Redis or in-memory).
///
/// All values are strings (JSON). Implementations are responsible for key
/// prefixing and TTL enforcement. Callers treat every method as fallible
/// and eventually consistent.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug + 'static {
    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Set a value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Delete a key. Returns `true` if something was removed.
    async fn delete(&self, key: &str) -> AppResult<bool>;

    /// Set the TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool>;

    /// Add a member to the set stored at `key`.
    async fn set_add(&self, key: &str, member: &str) -> AppResult<()>;

    /// Remove a member from the set stored at `key`.
    async fn set_remove(&self, key: &str, member: &str) -> AppResult<()>;

    /// Return all members of the set stored at `key`.
    async fn set_members(&self, key: &str) -> AppResult<Vec<String>>;

    /// Append values to the list stored at `key`.
    async fn list_push(&self, key: &str, values: &[String]) -> AppResult<()>;

    /// Return the whole list stored at `key`, oldest first.
    async fn list_range(&self, key: &str) -> AppResult<Vec<String>>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}

/// Typed JSON helpers available on every [`KeyValueStore`], including trait objects.
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    /// Get a typed value by deserializing from JSON.
    async fn get_json<T>(&self, key: &str) -> AppResult<Option<T>>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    /// Set a typed value by serializing to JSON.
    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> AppResult<()>
    where
        T: serde::Serialize + Send + Sync,
    {
        let json = serde_json::to_string(value)?;
        self.set(key, &json, ttl).await
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
