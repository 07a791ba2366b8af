//! Session store: in-process cache over the distributed store.
//!
//! The distributed copy of each session is written with a TTL and each
//! user owns a set of session ids. Reads fall back to the store and
//! rehydrate the local user index; writes always go through to the store.
//! Updates, deletes and store reloads of one session are serialized by a
//! per-session lock, so the store sees them in the order they applied.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use lexhub_cache::keys;
use lexhub_core::config::SessionConfig;
use lexhub_core::traits::{KeyValueStore, KeyValueStoreExt};
use lexhub_core::types::{SessionId, UserId};
use lexhub_core::{AppError, AppResult};

use crate::tasks::BackgroundTasks;

use super::model::Session;

#[derive(Debug, Default)]
struct SessionState {
    sessions: HashMap<SessionId, Session>,
    by_user: HashMap<UserId, HashSet<SessionId>>,
}

impl SessionState {
    fn insert(&mut self, session: Session) {
        self.by_user
            .entry(session.user_id.clone())
            .or_default()
            .insert(session.session_id.clone());
        self.sessions.insert(session.session_id.clone(), session);
    }

    fn remove(&mut self, session_id: &str) -> Option<Session> {
        let session = self.sessions.remove(session_id)?;
        let empty = match self.by_user.get_mut(&session.user_id) {
            Some(ids) => {
                ids.remove(session_id);
                ids.is_empty()
            }
            None => false,
        };
        if empty {
            self.by_user.remove(&session.user_id);
        }
        Some(session)
    }
}

/// Persists user sessions across reconnects.
pub struct SessionStore {
    state: RwLock<SessionState>,
    session_locks: DashMap<SessionId, Arc<Mutex<()>>>,
    store: Arc<dyn KeyValueStore>,
    config: SessionConfig,
    tasks: BackgroundTasks,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(config: SessionConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            state: RwLock::new(SessionState::default()),
            session_locks: DashMap::new(),
            store,
            config,
            tasks: BackgroundTasks::new(),
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    fn release_session_lock(&self, session_id: &str) {
        self.session_locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Run `op` under the session's lock.
    async fn with_session_lock<T, F, Fut>(&self, session_id: &str, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.session_lock(session_id);
        let result = {
            let _guard = lock.lock().await;
            op().await
        };
        drop(lock);
        self.release_session_lock(session_id);
        result
    }

    fn expiry_window(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.ttl_seconds as i64)
    }

    async fn persist(&self, session: &Session) {
        let ttl = self.config.ttl();
        if let Err(e) = self
            .store
            .set_json(&keys::session(&session.session_id), session, ttl)
            .await
        {
            warn!(session_id = %session.session_id, error = %e, "Failed to persist session");
            return;
        }

        let index = keys::user_sessions(&session.user_id);
        if let Err(e) = self.store.set_add(&index, &session.session_id).await {
            warn!(user_id = %session.user_id, error = %e, "Failed to index session");
        } else if let Err(e) = self.store.expire(&index, ttl).await {
            warn!(user_id = %session.user_id, error = %e, "Failed to refresh session index TTL");
        }
    }

    /// Create and persist a new session.
    pub async fn create_session(
        &self,
        user_id: &str,
        preferences: Option<Map<String, Value>>,
        metadata: Option<Map<String, Value>>,
    ) -> Session {
        let session = Session::new(
            user_id,
            preferences.unwrap_or_default(),
            metadata.unwrap_or_default(),
        );
        self.state.write().await.insert(session.clone());
        self.persist(&session).await;

        info!(session_id = %session.session_id, user_id = %user_id, "Session created");
        session
    }

    /// Look up a session, loading it from the store on a cache miss.
    ///
    /// Sessions idle past the expiry window are treated as absent.
    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        if let Some(session) = self.cached(session_id).await {
            return Some(session);
        }
        self.with_session_lock(session_id, || self.load_locked(session_id))
            .await
    }

    async fn cached(&self, session_id: &str) -> Option<Session> {
        let state = self.state.read().await;
        state
            .sessions
            .get(session_id)
            .filter(|s| !s.is_expired(self.expiry_window(), Utc::now()))
            .cloned()
    }

    /// Cache, else store. Caller holds the session lock.
    async fn load_locked(&self, session_id: &str) -> Option<Session> {
        if let Some(session) = self.cached(session_id).await {
            return Some(session);
        }

        let stored: Option<Session> = match self.store.get_json(&keys::session(session_id)).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to load session from store");
                None
            }
        };

        let mut state = self.state.write().await;
        match stored {
            Some(session) if !session.is_expired(self.expiry_window(), Utc::now()) => {
                state.insert(session.clone());
                Some(session)
            }
            _ => {
                state.remove(session_id);
                None
            }
        }
    }

    /// Apply `change` to a session, bump its activity, and re-persist.
    async fn modify<F>(&self, session_id: &str, change: F) -> AppResult<Session>
    where
        F: FnOnce(&mut Session),
    {
        self.with_session_lock(session_id, || async {
            let not_found = || AppError::not_found(format!("Session {session_id} not found"));
            self.load_locked(session_id).await.ok_or_else(not_found)?;

            let updated = {
                let mut state = self.state.write().await;
                let mut session = state.sessions.get(session_id).cloned().ok_or_else(not_found)?;
                change(&mut session);
                session.touch();
                state.insert(session.clone());
                session
            };
            self.persist(&updated).await;
            Ok::<_, AppError>(updated)
        })
        .await
    }

    /// Record activity on a session.
    pub async fn update_session_activity(&self, session_id: &str) -> AppResult<Session> {
        self.modify(session_id, |_| {}).await
    }

    /// Merge `preferences` into the session's preferences.
    pub async fn update_session_preferences(
        &self,
        session_id: &str,
        preferences: Map<String, Value>,
    ) -> AppResult<Session> {
        self.modify(session_id, |session| session.preferences.extend(preferences))
            .await
    }

    /// Set one metadata entry on a session.
    pub async fn set_session_metadata(
        &self,
        session_id: &str,
        key: &str,
        value: Value,
    ) -> AppResult<Session> {
        self.modify(session_id, |session| {
            session.metadata.insert(key.to_string(), value);
        })
        .await
    }

    /// Delete a session everywhere. Returns `false` if it was unknown.
    pub async fn delete_session(&self, session_id: &str) -> bool {
        self.with_session_lock(session_id, || self.delete_locked(session_id))
            .await
    }

    async fn delete_locked(&self, session_id: &str) -> bool {
        let cached = self.state.write().await.remove(session_id);
        let owner = match cached {
            Some(session) => Some(session.user_id),
            None => match self.store.get_json::<Session>(&keys::session(session_id)).await {
                Ok(stored) => stored.map(|s| s.user_id),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to load session for delete");
                    None
                }
            },
        };

        let removed_stored = match self.store.delete(&keys::session(session_id)).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to delete session from store");
                false
            }
        };
        let Some(user_id) = owner else {
            return removed_stored;
        };
        if let Err(e) = self
            .store
            .set_remove(&keys::user_sessions(&user_id), session_id)
            .await
        {
            warn!(user_id = %user_id, error = %e, "Failed to unindex session");
        }

        debug!(session_id = %session_id, user_id = %user_id, "Session deleted");
        true
    }

    /// Every live session of a user, most recently active first.
    pub async fn get_user_sessions(&self, user_id: &str) -> Vec<Session> {
        let mut ids: BTreeSet<SessionId> = self
            .state
            .read()
            .await
            .by_user
            .get(user_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        let index = keys::user_sessions(user_id);
        match self.store.set_members(&index).await {
            Ok(stored) => ids.extend(stored),
            Err(e) => warn!(user_id = %user_id, error = %e, "Failed to read session index"),
        }

        let mut sessions = Vec::with_capacity(ids.len());
        for session_id in ids {
            match self.get_session(&session_id).await {
                Some(session) if session.user_id == user_id => sessions.push(session),
                _ => {
                    if let Err(e) = self.store.set_remove(&index, &session_id).await {
                        debug!(session_id = %session_id, error = %e, "Failed to drop stale index entry");
                    }
                }
            }
        }
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        sessions
    }

    /// Keep the `keep_latest` most recently active sessions of a user and
    /// delete the rest. Returns how many were deleted.
    pub async fn cleanup_user_sessions(&self, user_id: &str, keep_latest: usize) -> usize {
        let sessions = self.get_user_sessions(user_id).await;
        let mut deleted = 0;
        for session in sessions.into_iter().skip(keep_latest) {
            if self.delete_session(&session.session_id).await {
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!(user_id = %user_id, deleted, "Pruned old sessions");
        }
        deleted
    }

    /// Drop cached sessions past the expiry window.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let window = self.expiry_window();
        let mut state = self.state.write().await;
        let expired: Vec<SessionId> = state
            .sessions
            .values()
            .filter(|s| s.is_expired(window, now))
            .map(|s| s.session_id.clone())
            .collect();
        for session_id in &expired {
            state.remove(session_id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Swept expired sessions");
        }
        expired.len()
    }

    /// Sessions currently cached on this node.
    pub async fn active_session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn start(self: &Arc<Self>) {
        let sessions = Arc::clone(self);
        self.tasks
            .spawn_periodic("session_sweep", self.config.sweep_interval(), move || {
                let sessions = sessions.clone();
                async move {
                    sessions.sweep_expired().await;
                    Ok(())
                }
            })
            .await;
    }

    pub async fn stop(&self) {
        self.tasks.shutdown().await;
    }
}
