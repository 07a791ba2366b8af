//! Presence service: per-user status and room membership, cached
//! in-process and mirrored to the distributed store with a TTL.
//!
//! Every mutation for one user runs under that user's async lock, so an
//! online transition can never interleave with the offline transition
//! of the same user.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use lexhub_cache::keys;
use lexhub_core::config::PresenceConfig;
use lexhub_core::traits::{KeyValueStore, KeyValueStoreExt};
use lexhub_core::types::{RoomId, UserId};

use crate::broadcast::EventBroadcaster;
use crate::connection::{ConnectionRegistry, LifecycleListener};
use crate::message::MessageType;
use crate::tasks::BackgroundTasks;

use super::model::{PresenceStats, UserPresence};
use super::status::PresenceStatus;

#[derive(Debug, Default)]
struct PresenceState {
    users: HashMap<UserId, UserPresence>,
    rooms: HashMap<RoomId, HashSet<UserId>>,
}

impl PresenceState {
    fn index_rooms(&mut self, presence: &UserPresence) {
        for room_id in &presence.active_rooms {
            self.rooms
                .entry(room_id.clone())
                .or_default()
                .insert(presence.user_id.clone());
        }
    }

    fn unindex_room(&mut self, room_id: &str, user_id: &str) {
        let empty = match self.rooms.get_mut(room_id) {
            Some(members) => {
                members.remove(user_id);
                members.is_empty()
            }
            None => false,
        };
        if empty {
            self.rooms.remove(room_id);
        }
    }
}

/// Tracks presence state for all users seen by this node.
pub struct PresenceService {
    state: RwLock<PresenceState>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    registry: OnceLock<Weak<ConnectionRegistry>>,
    store: Arc<dyn KeyValueStore>,
    broadcaster: Arc<EventBroadcaster>,
    config: PresenceConfig,
    tasks: BackgroundTasks,
}

impl fmt::Debug for PresenceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PresenceService {
    pub fn new(
        config: PresenceConfig,
        store: Arc<dyn KeyValueStore>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            state: RwLock::new(PresenceState::default()),
            user_locks: DashMap::new(),
            registry: OnceLock::new(),
            store,
            broadcaster,
            config,
            tasks: BackgroundTasks::new(),
        }
    }

    /// Attach the local registry so liveness checks can see open
    /// connections. Only the first call takes effect.
    pub fn attach_registry(&self, registry: &Arc<ConnectionRegistry>) -> bool {
        self.registry.set(Arc::downgrade(registry)).is_ok()
    }

    /// Whether the user still has a live connection on this node.
    async fn has_live_connection(&self, user_id: &str) -> bool {
        match self.registry.get().and_then(Weak::upgrade) {
            Some(registry) => registry.is_user_online(user_id).await,
            None => false,
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    fn release_user_lock(&self, user_id: &str) {
        self.user_locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn activity_window(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.activity_window_seconds as i64)
    }

    fn inactivity_timeout(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.inactivity_timeout_seconds as i64)
    }

    // ── Store access ─────────────────────────────────────────────────

    async fn load_stored(&self, user_id: &str) -> Option<UserPresence> {
        match self.store.get_json(&keys::presence(user_id)).await {
            Ok(presence) => presence,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to load presence from store");
                None
            }
        }
    }

    /// In-process record, else the stored copy.
    async fn load(&self, user_id: &str) -> Option<UserPresence> {
        if let Some(presence) = self.state.read().await.users.get(user_id) {
            return Some(presence.clone());
        }
        self.load_stored(user_id).await
    }

    async fn persist(&self, presence: &UserPresence) {
        let key = keys::presence(&presence.user_id);
        if let Err(e) = self.store.set_json(&key, presence, self.config.ttl()).await {
            warn!(user_id = %presence.user_id, error = %e, "Failed to persist presence");
        }
    }

    async fn cache(&self, presence: &UserPresence) {
        let mut state = self.state.write().await;
        state.index_rooms(presence);
        state
            .users
            .insert(presence.user_id.clone(), presence.clone());
    }

    /// Broadcast a status change to every room the user is in and to the
    /// user's own connections.
    async fn broadcast_update(&self, presence: &UserPresence) {
        let data = json!({
            "user_id": presence.user_id,
            "status": presence.status,
            "last_seen": presence.last_seen,
            "active_rooms": presence.active_rooms,
            "metadata": presence.metadata,
        });
        for room_id in &presence.active_rooms {
            self.broadcaster
                .broadcast(
                    MessageType::PresenceUpdate,
                    data.clone(),
                    None,
                    Some(room_id.clone()),
                )
                .await;
        }
        self.broadcaster
            .broadcast(
                MessageType::PresenceUpdate,
                data,
                Some(vec![presence.user_id.clone()]),
                None,
            )
            .await;
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Mark a user online (or away/busy) and broadcast the change.
    pub async fn set_user_online(
        &self,
        user_id: &str,
        status: PresenceStatus,
        metadata: Option<Map<String, Value>>,
    ) -> UserPresence {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if status == PresenceStatus::Offline {
            return match self.offline_locked(user_id).await {
                Some(presence) => presence,
                None => UserPresence {
                    status: PresenceStatus::Offline,
                    ..UserPresence::new(user_id)
                },
            };
        }
        self.online_locked(user_id, status, metadata).await
    }

    /// Change a user's status, keeping everything else.
    pub async fn update_status(&self, user_id: &str, status: PresenceStatus) -> UserPresence {
        self.set_user_online(user_id, status, None).await
    }

    async fn online_locked(
        &self,
        user_id: &str,
        status: PresenceStatus,
        metadata: Option<Map<String, Value>>,
    ) -> UserPresence {
        let mut presence = self
            .load(user_id)
            .await
            .unwrap_or_else(|| UserPresence::new(user_id));
        presence.status = status;
        presence.last_seen = Utc::now();
        if let Some(metadata) = metadata {
            presence.metadata.extend(metadata);
        }

        self.cache(&presence).await;
        self.persist(&presence).await;
        self.broadcast_update(&presence).await;

        debug!(user_id = %user_id, status = %status, "Presence updated");
        presence
    }

    /// Mark a user offline. Returns `false` if no online presence existed.
    pub async fn set_user_offline(&self, user_id: &str) -> bool {
        let lock = self.user_lock(user_id);
        let went_offline = {
            let _guard = lock.lock().await;
            self.offline_locked(user_id).await.is_some()
        };
        drop(lock);
        self.release_user_lock(user_id);
        went_offline
    }

    /// Leave every room, mark offline, persist, broadcast once, evict.
    async fn offline_locked(&self, user_id: &str) -> Option<UserPresence> {
        let mut presence = self.load(user_id).await?;
        if !presence.status.is_online() {
            self.state.write().await.users.remove(user_id);
            return None;
        }

        let rooms: Vec<RoomId> = presence.active_rooms.iter().cloned().collect();
        for room_id in rooms {
            self.leave_room_locked(&mut presence, &room_id).await;
        }

        presence.status = PresenceStatus::Offline;
        presence.last_seen = Utc::now();
        self.persist(&presence).await;
        self.broadcast_update(&presence).await;
        self.state.write().await.users.remove(user_id);

        info!(user_id = %user_id, "User went offline");
        Some(presence)
    }

    // ── Rooms ────────────────────────────────────────────────────────

    /// Add a user to a room, creating an online presence if needed.
    ///
    /// Returns `false` if the user was already in the room.
    pub async fn join_room(
        &self,
        user_id: &str,
        room_id: &str,
        metadata: Option<Map<String, Value>>,
    ) -> bool {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut presence = match self.load(user_id).await {
            Some(presence) if presence.status.is_online() => presence,
            _ => {
                self.online_locked(user_id, PresenceStatus::Online, None)
                    .await
            }
        };
        if let Some(metadata) = metadata {
            presence.metadata.extend(metadata);
        }
        if !presence.active_rooms.insert(room_id.to_string()) {
            return false;
        }
        presence.last_seen = Utc::now();
        self.cache(&presence).await;

        let room_key = keys::presence_room(room_id);
        if let Err(e) = self.store.set_add(&room_key, user_id).await {
            warn!(room_id = %room_id, error = %e, "Failed to add room member in store");
        } else if let Err(e) = self.store.expire(&room_key, self.config.ttl()).await {
            warn!(room_id = %room_id, error = %e, "Failed to refresh room TTL");
        }
        self.persist(&presence).await;
        self.broadcaster.broadcast_presence_join(room_id, user_id).await;

        debug!(user_id = %user_id, room_id = %room_id, "User joined room");
        true
    }

    /// Remove a user from a room. Returns `false` if not in it.
    pub async fn leave_room(&self, user_id: &str, room_id: &str) -> bool {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let Some(mut presence) = self.load(user_id).await else {
            return false;
        };
        if !self.leave_room_locked(&mut presence, room_id).await {
            return false;
        }
        if presence.status.is_online() {
            self.state
                .write()
                .await
                .users
                .insert(user_id.to_string(), presence.clone());
        }
        self.persist(&presence).await;
        true
    }

    async fn leave_room_locked(&self, presence: &mut UserPresence, room_id: &str) -> bool {
        if !presence.active_rooms.remove(room_id) {
            return false;
        }
        self.state
            .write()
            .await
            .unindex_room(room_id, &presence.user_id);

        if let Err(e) = self
            .store
            .set_remove(&keys::presence_room(room_id), &presence.user_id)
            .await
        {
            warn!(room_id = %room_id, error = %e, "Failed to remove room member in store");
        }
        self.broadcaster
            .broadcast_presence_leave(room_id, &presence.user_id)
            .await;

        debug!(user_id = %presence.user_id, room_id = %room_id, "User left room");
        true
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Current presence, from cache or store.
    pub async fn get_user_presence(&self, user_id: &str) -> Option<UserPresence> {
        self.load(user_id).await
    }

    /// Online members of a room across all nodes, sorted by user id.
    ///
    /// Entries not seen within the activity window are left out.
    pub async fn get_room_members(&self, room_id: &str) -> Vec<UserPresence> {
        let mut user_ids: BTreeSet<UserId> = self
            .state
            .read()
            .await
            .rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();

        match self.store.set_members(&keys::presence_room(room_id)).await {
            Ok(stored) => user_ids.extend(stored),
            Err(e) => warn!(room_id = %room_id, error = %e, "Failed to read room members from store"),
        }

        let cutoff = Utc::now() - self.activity_window();
        let mut members = Vec::new();
        for user_id in user_ids {
            if let Some(presence) = self.load(&user_id).await
                && presence.status.is_online()
                && presence.active_rooms.contains(room_id)
                && presence.seen_since(cutoff)
            {
                members.push(presence);
            }
        }
        members
    }

    /// Every user currently online on this node, sorted by user id.
    pub async fn get_online_users(&self) -> Vec<UserPresence> {
        let mut users: Vec<UserPresence> = self
            .state
            .read()
            .await
            .users
            .values()
            .filter(|p| p.status.is_online())
            .cloned()
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub async fn get_user_rooms(&self, user_id: &str) -> Vec<RoomId> {
        self.load(user_id)
            .await
            .map(|p| p.active_rooms.into_iter().collect())
            .unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.load(user_id)
            .await
            .is_some_and(|p| p.status.is_online())
    }

    pub async fn stats(&self) -> PresenceStats {
        let state = self.state.read().await;
        let mut stats = PresenceStats {
            rooms: state.rooms.len(),
            ..PresenceStats::default()
        };
        for presence in state.users.values() {
            match presence.status {
                PresenceStatus::Online => stats.online += 1,
                PresenceStatus::Away => stats.away += 1,
                PresenceStatus::Busy => stats.busy += 1,
                PresenceStatus::Offline => {}
            }
        }
        stats
    }

    // ── Liveness ─────────────────────────────────────────────────────

    /// Refresh `last_seen` for an online user.
    ///
    /// A user with a live local connection but no online presence (evicted
    /// or swept) is brought back online.
    pub async fn touch(&self, user_id: &str) {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.touch_locked(user_id).await;
    }

    /// Returns `false` if there was nothing to refresh.
    async fn touch_locked(&self, user_id: &str) -> bool {
        let refreshed = {
            let mut state = self.state.write().await;
            match state.users.get_mut(user_id) {
                Some(presence) if presence.status.is_online() => {
                    presence.last_seen = Utc::now();
                    Some(presence.clone())
                }
                _ => None,
            }
        };
        match refreshed {
            Some(presence) => {
                self.persist(&presence).await;
                true
            }
            None if self.has_live_connection(user_id).await => {
                self.online_locked(user_id, PresenceStatus::Online, None)
                    .await;
                true
            }
            None => false,
        }
    }

    /// Force users idle past the inactivity timeout offline.
    ///
    /// Users that still hold a live local connection are refreshed
    /// instead. Returns how many were transitioned.
    pub async fn sweep_inactive(&self) -> usize {
        let cutoff = Utc::now() - self.inactivity_timeout();
        let stale: Vec<UserId> = self
            .state
            .read()
            .await
            .users
            .values()
            .filter(|p| p.status.is_online() && !p.seen_since(cutoff))
            .map(|p| p.user_id.clone())
            .collect();

        let mut swept = 0;
        for user_id in stale {
            let lock = self.user_lock(&user_id);
            let _guard = lock.lock().await;

            let still_stale = self
                .state
                .read()
                .await
                .users
                .get(&user_id)
                .is_some_and(|p| p.status.is_online() && !p.seen_since(cutoff));
            if !still_stale {
                continue;
            }
            if self.has_live_connection(&user_id).await {
                debug!(user_id = %user_id, "Idle presence kept alive by open connection");
                self.touch_locked(&user_id).await;
                continue;
            }
            if self.offline_locked(&user_id).await.is_some() {
                info!(user_id = %user_id, "Swept inactive user offline");
                swept += 1;
            }
        }
        swept
    }

    pub async fn start(self: &Arc<Self>) {
        let presence = Arc::clone(self);
        self.tasks
            .spawn_periodic("presence_sweep", self.config.sweep_interval(), move || {
                let presence = presence.clone();
                async move {
                    presence.sweep_inactive().await;
                    Ok(())
                }
            })
            .await;
    }

    pub async fn stop(&self) {
        self.tasks.shutdown().await;
    }
}

#[async_trait]
impl LifecycleListener for PresenceService {
    async fn user_connected(&self, user_id: &str, _connection_id: &str) {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let status = match self.state.read().await.users.get(user_id) {
            Some(presence) if presence.status.is_online() => presence.status,
            _ => PresenceStatus::Online,
        };
        self.online_locked(user_id, status, None).await;
    }

    async fn user_disconnected(&self, user_id: &str) {
        self.set_user_offline(user_id).await;
    }

    async fn heartbeat(&self, user_id: &str) {
        self.touch(user_id).await;
    }

    async fn room_joined(&self, user_id: &str, room_id: &str) {
        self.join_room(user_id, room_id, None).await;
    }

    async fn room_left(&self, user_id: &str, room_id: &str) {
        self.leave_room(user_id, room_id).await;
    }
}
