//! Connection registry: handles connection lifecycle (connect, disconnect,
//! room membership) and message routing for this node.
//!
//! Registry state (the pool and the room index) lives behind one lock
//! that is never held across a transport write. Connect, disconnect, and
//! room changes for a user are additionally serialized by a per-user
//! lock, which is what makes the online/offline signals exactly-once.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use lexhub_core::config::RealtimeConfig;
use lexhub_core::traits::Transport;
use lexhub_core::types::id::new_connection_id;
use lexhub_core::types::{ConnectionId, RoomId, UserId};
use lexhub_core::{AppError, AppResult};

use crate::message::builder;
use crate::message::validator::{validate_inbound, validate_room_id};
use crate::message::{Envelope, ErrorCode, InboundCommand, InboundMessage, MessageType};
use crate::metrics::RealtimeMetrics;
use crate::room::RoomIndex;
use crate::tasks::BackgroundTasks;

use super::handle::{Connection, ConnectionInfo, ConnectionState};
use super::handler::InboundHandler;
use super::heartbeat::{Liveness, check_liveness};
use super::lifecycle::LifecycleListener;
use super::pool::ConnectionPool;

/// Inbound types handled natively; they cannot be overridden.
const BUILTIN_TYPES: [&str; 4] = ["heartbeat", "join_room", "leave_room", "chat_message"];

#[derive(Debug, Default)]
struct RegistryState {
    pool: ConnectionPool,
    rooms: RoomIndex,
}

/// Result of removing a connection from registry state.
struct Teardown {
    connection: Arc<Connection>,
    /// Rooms no other connection of the same user is still in.
    released_rooms: Vec<RoomId>,
    /// Whether this was the user's last connection.
    user_empty: bool,
}

/// Registry counters for health and stats endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub connections: usize,
    pub users: usize,
    pub rooms: usize,
}

/// Tracks every live connection on this node.
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    listener: OnceLock<Weak<dyn LifecycleListener>>,
    handlers: DashMap<String, Arc<dyn InboundHandler>>,
    metrics: Arc<RealtimeMetrics>,
    config: RealtimeConfig,
    tasks: BackgroundTasks,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    /// Creates a new connection registry.
    pub fn new(config: RealtimeConfig, metrics: Arc<RealtimeMetrics>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            user_locks: DashMap::new(),
            listener: OnceLock::new(),
            handlers: DashMap::new(),
            metrics,
            config,
            tasks: BackgroundTasks::new(),
        }
    }

    /// Install the lifecycle listener. Only the first call takes effect.
    pub fn set_listener(&self, listener: Weak<dyn LifecycleListener>) -> bool {
        self.listener.set(listener).is_ok()
    }

    /// Register a handler for an application-defined inbound type.
    pub fn register_handler(
        &self,
        message_type: impl Into<String>,
        handler: Arc<dyn InboundHandler>,
    ) -> AppResult<()> {
        let message_type = message_type.into();
        if BUILTIN_TYPES.contains(&message_type.as_str()) {
            return Err(AppError::validation(format!(
                "'{message_type}' is a built-in message type"
            )));
        }
        if self.handlers.insert(message_type.clone(), handler).is_some() {
            warn!(message_type = %message_type, "Replaced existing inbound handler");
        }
        Ok(())
    }

    fn listener(&self) -> Option<Arc<dyn LifecycleListener>> {
        self.listener.get().and_then(Weak::upgrade)
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

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Accept a transport and register it for `user_id`.
    ///
    /// Handshake failures are returned and nothing is registered. When the
    /// user is at `max_connections_per_user`, the oldest connection is
    /// replaced.
    pub async fn connect(
        &self,
        transport: Arc<dyn Transport>,
        user_id: &str,
        connection_id: Option<ConnectionId>,
        metadata: Option<Map<String, Value>>,
    ) -> AppResult<Arc<Connection>> {
        let connection_id = connection_id.unwrap_or_else(new_connection_id);
        let connection = Arc::new(Connection::new(
            connection_id.clone(),
            user_id.to_string(),
            transport,
            metadata.unwrap_or_default(),
        ));

        if let Err(e) = connection.transport().accept().await {
            connection.mark_dead();
            warn!(conn_id = %connection_id, user_id = %user_id, error = %e, "Transport handshake failed");
            return Err(e);
        }

        if self.contains(&connection_id).await {
            warn!(conn_id = %connection_id, "Connection id already registered, replacing");
            self.disconnect(&connection_id).await;
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let existing = self.user_connections(user_id).await;
        let max = self.config.max_connections_per_user.max(1);
        let excess = (existing.len() + 1).saturating_sub(max);
        for oldest in existing.iter().take(excess) {
            warn!(
                user_id = %user_id,
                conn_id = %oldest.id,
                max = max,
                "User at max connections, replacing oldest"
            );
            if let Some(teardown) = self.remove_locked(&oldest.id).await {
                self.finish_teardown(teardown, false).await;
            }
        }

        {
            let mut state = self.state.write().await;
            connection.set_state(ConnectionState::Connected);
            state.pool.add(connection.clone());
        }
        self.metrics.connection_opened();

        if let Err(e) = connection
            .send(&builder::build_welcome(&connection_id, user_id))
            .await
        {
            warn!(conn_id = %connection_id, error = %e, "Failed to send welcome message");
        }

        if let Some(listener) = self.listener() {
            listener.user_connected(user_id, &connection_id).await;
        }

        info!(conn_id = %connection_id, user_id = %user_id, "Connection registered");
        Ok(connection)
    }

    /// Tear down a connection. Returns `false` if it was not registered.
    pub async fn disconnect(&self, connection_id: &str) -> bool {
        let Some(connection) = self.connection(connection_id).await else {
            return false;
        };
        let user_id = connection.user_id.clone();
        drop(connection);

        let lock = self.user_lock(&user_id);
        let removed = {
            let _guard = lock.lock().await;
            match self.remove_locked(connection_id).await {
                Some(teardown) => {
                    self.finish_teardown(teardown, true).await;
                    true
                }
                None => false,
            }
        };
        drop(lock);
        self.release_user_lock(&user_id);
        removed
    }

    /// Remove a connection from the pool and every room. Caller holds the
    /// user lock.
    async fn remove_locked(&self, connection_id: &str) -> Option<Teardown> {
        let mut state = self.state.write().await;
        let connection = state.pool.get(connection_id)?;
        connection.set_state(ConnectionState::Disconnecting);

        let left_rooms = state.rooms.leave_all(connection_id);
        state.pool.remove(connection_id);

        let remaining = state.pool.user_connections(&connection.user_id);
        let released_rooms = left_rooms
            .into_iter()
            .filter(|room| !remaining.iter().any(|c| state.rooms.is_member(room, &c.id)))
            .collect();

        Some(Teardown {
            connection,
            released_rooms,
            user_empty: remaining.is_empty(),
        })
    }

    async fn finish_teardown(&self, teardown: Teardown, signal_offline: bool) {
        let Teardown {
            connection,
            released_rooms,
            user_empty,
        } = teardown;

        if let Some(listener) = self.listener() {
            for room_id in &released_rooms {
                listener.room_left(&connection.user_id, room_id).await;
            }
            if user_empty && signal_offline {
                listener.user_disconnected(&connection.user_id).await;
            }
        }

        if let Err(e) = connection.transport().close().await {
            debug!(conn_id = %connection.id, error = %e, "Transport close failed");
        }
        connection.set_state(ConnectionState::Disconnected);
        self.metrics.connection_closed();

        info!(
            conn_id = %connection.id,
            user_id = %connection.user_id,
            "Connection unregistered"
        );
    }

    /// Disconnect every registered connection.
    pub async fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self
            .state
            .read()
            .await
            .pool
            .all_connections()
            .iter()
            .map(|c| c.id.clone())
            .collect();

        let mut closed = 0;
        for id in ids {
            if self.disconnect(&id).await {
                closed += 1;
            }
        }
        closed
    }

    // ── Rooms ────────────────────────────────────────────────────────

    /// Add a connection to a room. Returns `false` if already a member.
    pub async fn join_room(&self, connection_id: &str, room_id: &str) -> AppResult<bool> {
        validate_room_id(room_id)?;
        let connection = self
            .connection(connection_id)
            .await
            .ok_or_else(|| AppError::not_found(format!("Connection {connection_id} not found")))?;

        let lock = self.user_lock(&connection.user_id);
        let _guard = lock.lock().await;

        let first_for_user = {
            let mut state = self.state.write().await;
            if !state.pool.contains(connection_id) {
                return Err(AppError::not_found(format!(
                    "Connection {connection_id} not found"
                )));
            }
            if state.rooms.is_member(room_id, connection_id) {
                return Ok(false);
            }
            if state.rooms.room_count_of(connection_id) >= self.config.max_rooms_per_connection {
                return Err(AppError::validation(format!(
                    "Maximum rooms ({}) reached",
                    self.config.max_rooms_per_connection
                )));
            }
            let first = !state
                .pool
                .user_connections(&connection.user_id)
                .iter()
                .any(|c| state.rooms.is_member(room_id, &c.id));
            state.rooms.join(room_id, connection_id);
            first
        };

        if first_for_user && let Some(listener) = self.listener() {
            listener.room_joined(&connection.user_id, room_id).await;
        }

        debug!(conn_id = %connection_id, room_id = %room_id, "Joined room");
        Ok(true)
    }

    /// Remove a connection from a room. Returns `false` if not a member.
    pub async fn leave_room(&self, connection_id: &str, room_id: &str) -> bool {
        let Some(connection) = self.connection(connection_id).await else {
            return false;
        };

        let lock = self.user_lock(&connection.user_id);
        let _guard = lock.lock().await;

        let last_for_user = {
            let mut state = self.state.write().await;
            if !state.rooms.leave(room_id, connection_id) {
                return false;
            }
            !state
                .pool
                .user_connections(&connection.user_id)
                .iter()
                .any(|c| state.rooms.is_member(room_id, &c.id))
        };

        if last_for_user && let Some(listener) = self.listener() {
            listener.room_left(&connection.user_id, room_id).await;
        }

        debug!(conn_id = %connection_id, room_id = %room_id, "Left room");
        true
    }

    /// Drop room members that are no longer registered and prune empty
    /// rooms. Returns the number of rooms removed.
    pub async fn cleanup_rooms(&self) -> usize {
        let mut state = self.state.write().await;
        let RegistryState { pool, rooms } = &mut *state;
        let removed = rooms.prune(|conn| pool.contains(conn));
        if removed > 0 {
            debug!(removed, "Pruned empty rooms");
        }
        removed
    }

    // ── Delivery ─────────────────────────────────────────────────────

    /// Write one envelope to every target concurrently.
    ///
    /// Returns the number of successful writes. A failed write marks that
    /// connection dead and does not affect the others.
    async fn deliver(&self, targets: Vec<Arc<Connection>>, envelope: &Envelope) -> usize {
        if targets.is_empty() {
            return 0;
        }
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(message_type = %envelope.message_type, error = %e, "Failed to serialize envelope");
                return 0;
            }
        };

        let sends = targets
            .iter()
            .filter(|c| c.is_connected())
            .map(|c| {
                let text = text.as_str();
                async move { (c, c.send_text(text).await) }
            });

        let mut delivered = 0;
        for (connection, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.message_sent();
                }
                Err(e) => {
                    self.metrics.message_failed();
                    warn!(conn_id = %connection.id, error = %e, "Send failed, connection marked dead");
                }
            }
        }
        delivered
    }

    /// Send an envelope to one connection.
    pub async fn send_to_connection(&self, connection_id: &str, envelope: &Envelope) -> bool {
        match self.connection(connection_id).await {
            Some(connection) => self.deliver(vec![connection], envelope).await == 1,
            None => false,
        }
    }

    /// Send to every connection of a user. Returns the delivered count.
    pub async fn send_to_user(&self, user_id: &str, message_type: MessageType, data: Value) -> usize {
        self.deliver_to_user(user_id, &Envelope::new(message_type, data))
            .await
    }

    /// Deliver a prepared envelope to every connection of a user.
    pub async fn deliver_to_user(&self, user_id: &str, envelope: &Envelope) -> usize {
        let targets = self.user_connections(user_id).await;
        self.deliver(targets, envelope).await
    }

    /// Send to every member of a room except `exclude`.
    pub async fn broadcast_to_room(
        &self,
        room_id: &str,
        message_type: MessageType,
        data: Value,
        exclude: Option<&str>,
    ) -> usize {
        let envelope = Envelope::new(message_type, data).in_room(room_id);
        self.deliver_to_room(room_id, &envelope, exclude).await
    }

    /// Deliver a prepared envelope to every member of a room.
    pub async fn deliver_to_room(
        &self,
        room_id: &str,
        envelope: &Envelope,
        exclude: Option<&str>,
    ) -> usize {
        let targets: Vec<Arc<Connection>> = {
            let state = self.state.read().await;
            state
                .rooms
                .members(room_id)
                .iter()
                .filter(|id| exclude != Some(id.as_str()))
                .filter_map(|id| state.pool.get(id))
                .collect()
        };
        self.deliver(targets, envelope).await
    }

    /// Send to every connection on this node except `exclude`.
    pub async fn broadcast_to_all(
        &self,
        message_type: MessageType,
        data: Value,
        exclude: Option<&str>,
    ) -> usize {
        self.deliver_to_all(&Envelope::new(message_type, data), exclude)
            .await
    }

    /// Deliver a prepared envelope to every connection on this node.
    pub async fn deliver_to_all(&self, envelope: &Envelope, exclude: Option<&str>) -> usize {
        let targets: Vec<Arc<Connection>> = self
            .state
            .read()
            .await
            .pool
            .all_connections()
            .into_iter()
            .filter(|c| exclude != Some(c.id.as_str()))
            .collect();
        self.deliver(targets, envelope).await
    }

    async fn reply(&self, connection: &Connection, envelope: &Envelope) {
        match connection.send(envelope).await {
            Ok(()) => self.metrics.message_sent(),
            Err(e) => {
                self.metrics.message_failed();
                debug!(conn_id = %connection.id, error = %e, "Reply failed");
            }
        }
    }

    async fn reply_error(&self, connection: &Connection, code: ErrorCode, message: &str) {
        debug!(conn_id = %connection.id, code = code.as_str(), reason = message, "Rejecting inbound message");
        self.reply(connection, &builder::build_error(code, message))
            .await;
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Processes an inbound message from a client.
    pub async fn handle_message(&self, connection_id: &str, raw: &str) {
        let Some(connection) = self.connection(connection_id).await else {
            warn!(conn_id = %connection_id, "Message from unknown connection");
            return;
        };

        self.metrics.message_received();
        connection.touch().await;

        if let Err(e) = validate_inbound(raw, self.config.max_message_bytes) {
            self.reply_error(&connection, ErrorCode::InvalidMessage, &e.message)
                .await;
            return;
        }

        let message = match InboundMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                self.reply_error(&connection, ErrorCode::InvalidMessage, &e.message)
                    .await;
                return;
            }
        };

        let command = match message.into_command() {
            Ok(command) => command,
            Err(e) => {
                self.reply_error(&connection, ErrorCode::InvalidRoom, &e.message)
                    .await;
                return;
            }
        };

        match command {
            InboundCommand::Heartbeat => {
                if let Some(listener) = self.listener() {
                    listener.heartbeat(&connection.user_id).await;
                }
                self.reply(&connection, &builder::build_pong()).await;
            }
            InboundCommand::JoinRoom { room_id } => {
                match self.join_room(connection_id, &room_id).await {
                    Ok(_) => {
                        let count = self.room_member_count(&room_id).await;
                        self.reply(&connection, &builder::build_room_update(&room_id, "joined", count))
                            .await;
                    }
                    Err(e) => {
                        self.reply_error(&connection, ErrorCode::InvalidRoom, &e.message)
                            .await;
                    }
                }
            }
            InboundCommand::LeaveRoom { room_id } => {
                self.leave_room(connection_id, &room_id).await;
                let count = self.room_member_count(&room_id).await;
                self.reply(&connection, &builder::build_room_update(&room_id, "left", count))
                    .await;
            }
            InboundCommand::ChatMessage { room_id, message } => {
                if !self.is_room_member(&room_id, connection_id).await {
                    self.reply_error(
                        &connection,
                        ErrorCode::NotAMember,
                        &format!("Not a member of room {room_id}"),
                    )
                    .await;
                    return;
                }
                let data = builder::build_chat(&room_id, &connection.user_id, connection_id, message);
                self.broadcast_to_room(&room_id, MessageType::ChatMessage, data, Some(connection_id))
                    .await;
            }
            InboundCommand::Custom { message_type, data } => {
                self.dispatch_custom(&connection, &message_type, data).await;
            }
        }
    }

    async fn dispatch_custom(&self, connection: &Connection, message_type: &str, data: Value) {
        let handler = self.handlers.get(message_type).map(|h| h.value().clone());
        let Some(handler) = handler else {
            self.reply_error(
                connection,
                ErrorCode::UnknownType,
                &format!("Unknown message type: {message_type}"),
            )
            .await;
            return;
        };

        match handler.handle(connection, data).await {
            Ok(Some(reply)) => self.reply(connection, &reply).await,
            Ok(None) => {}
            Err(e) => {
                warn!(conn_id = %connection.id, message_type, error = %e, "Inbound handler failed");
                self.reply_error(connection, ErrorCode::HandlerFailed, &e.message)
                    .await;
            }
        }
    }

    // ── Heartbeat ────────────────────────────────────────────────────

    /// Ping every healthy connection and reap idle or dead ones.
    ///
    /// Returns the number of connections disconnected.
    pub async fn check_heartbeats(&self) -> usize {
        let timeout = self.config.heartbeat_timeout();
        let connections = self.state.read().await.pool.all_connections();
        let ping = builder::build_ping();

        let mut reap = Vec::new();
        for connection in connections {
            match check_liveness(&connection, timeout).await {
                Liveness::Alive => {
                    if connection.send(&ping).await.is_err() {
                        debug!(conn_id = %connection.id, "Ping send failed");
                        reap.push(connection.id.clone());
                    }
                }
                Liveness::TimedOut => {
                    warn!(
                        conn_id = %connection.id,
                        user_id = %connection.user_id,
                        "Heartbeat timeout, disconnecting"
                    );
                    reap.push(connection.id.clone());
                }
                Liveness::Dead => reap.push(connection.id.clone()),
                Liveness::Skip => {}
            }
        }

        let mut reaped = 0;
        for connection_id in reap {
            if self.disconnect(&connection_id).await {
                reaped += 1;
            }
        }
        reaped
    }

    /// Start the heartbeat and room-cleanup loops.
    pub async fn start(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        self.tasks
            .spawn_periodic("heartbeat", self.config.heartbeat_interval(), move || {
                let registry = registry.clone();
                async move {
                    let reaped = registry.check_heartbeats().await;
                    if reaped > 0 {
                        info!(reaped, "Reaped idle connections");
                    }
                    Ok(())
                }
            })
            .await;

        let registry = Arc::clone(self);
        self.tasks
            .spawn_periodic("room_cleanup", self.config.room_cleanup_interval(), move || {
                let registry = registry.clone();
                async move {
                    registry.cleanup_rooms().await;
                    Ok(())
                }
            })
            .await;
    }

    /// Stop background loops. Connections stay registered.
    pub async fn stop(&self) {
        self.tasks.shutdown().await;
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub async fn connection(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.state.read().await.pool.get(connection_id)
    }

    pub async fn contains(&self, connection_id: &str) -> bool {
        self.state.read().await.pool.contains(connection_id)
    }

    pub async fn connection_info(&self, connection_id: &str) -> Option<ConnectionInfo> {
        let (connection, rooms) = {
            let state = self.state.read().await;
            let connection = state.pool.get(connection_id)?;
            (connection, state.rooms.rooms_of(connection_id))
        };
        Some(connection.info(rooms).await)
    }

    /// Rooms a connection has joined, sorted.
    pub async fn connection_rooms(&self, connection_id: &str) -> Vec<RoomId> {
        self.state.read().await.rooms.rooms_of(connection_id)
    }

    /// Connections of a user, oldest first.
    pub async fn user_connections(&self, user_id: &str) -> Vec<Arc<Connection>> {
        self.state.read().await.pool.user_connections(user_id)
    }

    /// Whether the user has at least one live connection on this node.
    pub async fn is_user_online(&self, user_id: &str) -> bool {
        self.user_connections(user_id)
            .await
            .iter()
            .any(|c| c.is_connected())
    }

    pub async fn connected_user_ids(&self) -> Vec<UserId> {
        self.state.read().await.pool.connected_user_ids()
    }

    /// Member connection ids of a room, sorted.
    pub async fn room_members(&self, room_id: &str) -> Vec<ConnectionId> {
        let mut members = self.state.read().await.rooms.members(room_id);
        members.sort();
        members
    }

    pub async fn room_member_count(&self, room_id: &str) -> usize {
        self.state.read().await.rooms.member_count(room_id)
    }

    pub async fn is_room_member(&self, room_id: &str, connection_id: &str) -> bool {
        self.state.read().await.rooms.is_member(room_id, connection_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.pool.connection_count()
    }

    pub async fn user_count(&self) -> usize {
        self.state.read().await.pool.user_count()
    }

    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.room_count()
    }

    pub async fn stats(&self) -> RegistryStats {
        let state = self.state.read().await;
        RegistryStats {
            connections: state.pool.connection_count(),
            users: state.pool.user_count(),
            rooms: state.rooms.room_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::connection::transport::{ChannelPeer, ChannelTransport};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.events().iter().filter(|e| e.starts_with(prefix)).count()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[async_trait]
    impl LifecycleListener for Recorder {
        async fn user_connected(&self, user_id: &str, _connection_id: &str) {
            self.push(format!("online:{user_id}"));
        }
        async fn user_disconnected(&self, user_id: &str) {
            self.push(format!("offline:{user_id}"));
        }
        async fn heartbeat(&self, user_id: &str) {
            self.push(format!("heartbeat:{user_id}"));
        }
        async fn room_joined(&self, user_id: &str, room_id: &str) {
            self.push(format!("join:{user_id}:{room_id}"));
        }
        async fn room_left(&self, user_id: &str, room_id: &str) {
            self.push(format!("leave:{user_id}:{room_id}"));
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl InboundHandler for EchoHandler {
        async fn handle(&self, connection: &Connection, data: Value) -> AppResult<Option<Envelope>> {
            if data.get("fail").is_some() {
                return Err(AppError::internal("handler exploded"));
            }
            Ok(Some(Envelope::new(
                MessageType::SystemMessage,
                json!({ "echo": data, "user_id": connection.user_id }),
            )))
        }
    }

    fn registry_with(config: RealtimeConfig) -> (Arc<ConnectionRegistry>, Arc<Recorder>) {
        let registry = Arc::new(ConnectionRegistry::new(config, Arc::new(RealtimeMetrics::new())));
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn LifecycleListener> = recorder.clone();
        registry.set_listener(Arc::downgrade(&listener));
        (registry, recorder)
    }

    fn registry() -> (Arc<ConnectionRegistry>, Arc<Recorder>) {
        registry_with(RealtimeConfig::default())
    }

    async fn connect(registry: &ConnectionRegistry, user: &str, id: &str) -> ChannelPeer {
        let (transport, mut peer) = ChannelTransport::pair(64, Duration::from_secs(1));
        registry
            .connect(transport, user, Some(id.to_string()), None)
            .await
            .unwrap();
        let welcome = peer.drain_json();
        assert_eq!(welcome[0]["type"], "connect");
        peer
    }

    #[tokio::test]
    async fn test_connect_registers_and_welcomes() {
        let (registry, recorder) = registry();
        let (transport, mut peer) = ChannelTransport::pair(8, Duration::from_secs(1));
        let conn = registry
            .connect(transport, "alice", None, None)
            .await
            .unwrap();

        assert!(conn.is_connected());
        assert!(registry.is_user_online("alice").await);
        assert_eq!(registry.connection_count().await, 1);

        let messages = peer.drain_json();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["type"], "connect");
        assert_eq!(messages[0]["data"]["connection_id"], conn.id.as_str());
        assert_eq!(recorder.events(), vec!["online:alice"]);
    }

    #[tokio::test]
    async fn test_failed_handshake_registers_nothing() {
        let (registry, recorder) = registry();
        let (transport, peer) = ChannelTransport::pair(8, Duration::from_secs(1));
        drop(peer);

        assert!(registry.connect(transport, "alice", None, None).await.is_err());
        assert_eq!(registry.connection_count().await, 0);
        assert!(!registry.is_user_online("alice").await);
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn test_offline_only_after_last_connection() {
        let (registry, recorder) = registry();
        let _p1 = connect(&registry, "alice", "c1").await;
        let _p2 = connect(&registry, "alice", "c2").await;

        assert!(registry.disconnect("c1").await);
        assert!(registry.is_user_online("alice").await);
        assert_eq!(recorder.count("offline"), 0);

        assert!(registry.disconnect("c2").await);
        assert!(!registry.is_user_online("alice").await);
        assert_eq!(recorder.count("offline"), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (registry, recorder) = registry();
        let _peer = connect(&registry, "alice", "c1").await;

        assert!(registry.disconnect("c1").await);
        assert!(!registry.disconnect("c1").await);
        assert!(!registry.disconnect("never-existed").await);
        assert_eq!(recorder.count("offline"), 1);
    }

    #[tokio::test]
    async fn test_disconnect_removes_from_rooms() {
        let (registry, recorder) = registry();
        let _peer = connect(&registry, "alice", "c1").await;
        registry.join_room("c1", "case:1").await.unwrap();
        registry.join_room("c1", "case:2").await.unwrap();

        registry.disconnect("c1").await;
        assert_eq!(registry.room_count().await, 0);
        assert!(registry.room_members("case:1").await.is_empty());
        assert_eq!(recorder.count("leave:alice"), 2);
        let events = recorder.events();
        assert_eq!(events.last().map(String::as_str), Some("offline:alice"));
    }

    #[tokio::test]
    async fn test_join_and_leave_are_idempotent() {
        let (registry, recorder) = registry();
        let _peer = connect(&registry, "alice", "c1").await;

        assert!(registry.join_room("c1", "doc:1").await.unwrap());
        assert!(!registry.join_room("c1", "doc:1").await.unwrap());
        assert_eq!(registry.room_members("doc:1").await, vec!["c1".to_string()]);

        assert!(registry.leave_room("c1", "doc:1").await);
        assert!(!registry.leave_room("c1", "doc:1").await);
        assert_eq!(registry.room_count().await, 0);

        assert_eq!(recorder.count("join:alice:doc:1"), 1);
        assert_eq!(recorder.count("leave:alice:doc:1"), 1);
    }

    #[tokio::test]
    async fn test_room_signals_fire_per_user_not_per_connection() {
        let (registry, recorder) = registry();
        let _p1 = connect(&registry, "alice", "c1").await;
        let _p2 = connect(&registry, "alice", "c2").await;

        registry.join_room("c1", "doc:1").await.unwrap();
        registry.join_room("c2", "doc:1").await.unwrap();
        assert_eq!(recorder.count("join:alice"), 1);

        registry.leave_room("c1", "doc:1").await;
        assert_eq!(recorder.count("leave:alice"), 0);
        registry.disconnect("c2").await;
        assert_eq!(recorder.count("leave:alice"), 1);
    }

    #[tokio::test]
    async fn test_join_rejects_bad_room_and_unknown_connection() {
        let (registry, _) = registry();
        let _peer = connect(&registry, "alice", "c1").await;

        assert!(registry.join_room("c1", "bad room").await.is_err());
        assert!(registry.join_room("ghost", "doc:1").await.is_err());
    }

    #[tokio::test]
    async fn test_room_limit() {
        let config = RealtimeConfig {
            max_rooms_per_connection: 2,
            ..RealtimeConfig::default()
        };
        let (registry, _) = registry_with(config);
        let _peer = connect(&registry, "alice", "c1").await;

        registry.join_room("c1", "a").await.unwrap();
        registry.join_room("c1", "b").await.unwrap();
        assert!(registry.join_room("c1", "c").await.is_err());
        assert!(!registry.join_room("c1", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_broadcast_to_room_respects_exclude() {
        let (registry, _) = registry();
        let mut p1 = connect(&registry, "alice", "c1").await;
        let mut p2 = connect(&registry, "bob", "c2").await;
        let mut p3 = connect(&registry, "carol", "c3").await;
        registry.join_room("c1", "doc:1").await.unwrap();
        registry.join_room("c2", "doc:1").await.unwrap();

        let delivered = registry
            .broadcast_to_room("doc:1", MessageType::DocumentUpdate, json!({"v": 1}), Some("c1"))
            .await;

        assert_eq!(delivered, 1);
        assert!(p1.drain().is_empty());
        let received = p2.drain_json();
        assert_eq!(received[0]["type"], "document_update");
        assert_eq!(received[0]["room_id"], "doc:1");
        assert!(p3.drain().is_empty());
    }

    #[tokio::test]
    async fn test_send_to_user_skips_dead_connection() {
        let (registry, _) = registry();
        let mut p1 = connect(&registry, "alice", "c1").await;
        let p2 = connect(&registry, "alice", "c2").await;
        drop(p2);

        let delivered = registry
            .send_to_user("alice", MessageType::Notification, json!({"title": "Filed"}))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(p1.drain_json()[0]["data"]["title"], "Filed");
        let dead = registry.connection("c2").await.unwrap();
        assert_eq!(dead.state(), ConnectionState::Disconnected);

        let again = registry
            .send_to_user("alice", MessageType::Notification, json!({}))
            .await;
        assert_eq!(again, 1);
    }

    #[tokio::test]
    async fn test_broadcast_to_all_counts_live_connections() {
        let (registry, _) = registry();
        let _p1 = connect(&registry, "alice", "c1").await;
        let _p2 = connect(&registry, "bob", "c2").await;

        let delivered = registry
            .broadcast_to_all(MessageType::SystemMessage, json!({"message": "maintenance"}), None)
            .await;
        assert_eq!(delivered, 2);
    }

    #[tokio::test]
    async fn test_heartbeat_message_gets_pong() {
        let (registry, recorder) = registry();
        let mut peer = connect(&registry, "alice", "c1").await;

        registry.handle_message("c1", r#"{"type":"heartbeat"}"#).await;

        let reply = peer.drain_json();
        assert_eq!(reply[0]["type"], "heartbeat");
        assert_eq!(reply[0]["data"]["status"], "pong");
        assert_eq!(recorder.count("heartbeat:alice"), 1);
    }

    #[tokio::test]
    async fn test_malformed_inputs_get_error_replies() {
        let (registry, _) = registry();
        let mut peer = connect(&registry, "alice", "c1").await;

        registry.handle_message("c1", "{not json").await;
        registry.handle_message("c1", "   ").await;
        registry.handle_message("c1", r#"{"type":"teleport"}"#).await;
        registry
            .handle_message("c1", r#"{"type":"join_room","data":{"room_id":"no spaces"}}"#)
            .await;
        registry.handle_message("c1", r#"{"type":"join_room","data":{}}"#).await;

        let codes: Vec<String> = peer
            .drain_json()
            .iter()
            .map(|m| m["data"]["code"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            codes,
            vec!["INVALID_MESSAGE", "INVALID_MESSAGE", "UNKNOWN_TYPE", "INVALID_ROOM", "INVALID_ROOM"]
        );
        assert!(registry.is_user_online("alice").await);
    }

    #[tokio::test]
    async fn test_join_room_message_acknowledged() {
        let (registry, _) = registry();
        let mut peer = connect(&registry, "alice", "c1").await;

        registry
            .handle_message("c1", r#"{"type":"join_room","data":{"room_id":"case:7"}}"#)
            .await;
        let reply = peer.drain_json();
        assert_eq!(reply[0]["type"], "room_update");
        assert_eq!(reply[0]["data"]["action"], "joined");
        assert_eq!(reply[0]["data"]["member_count"], 1);

        registry
            .handle_message("c1", r#"{"type":"leave_room","data":{"room_id":"case:7"}}"#)
            .await;
        let reply = peer.drain_json();
        assert_eq!(reply[0]["data"]["action"], "left");
        assert_eq!(reply[0]["data"]["member_count"], 0);
    }

    #[tokio::test]
    async fn test_chat_requires_membership_and_skips_sender() {
        let (registry, _) = registry();
        let mut p1 = connect(&registry, "alice", "c1").await;
        let mut p2 = connect(&registry, "bob", "c2").await;
        registry.join_room("c2", "case:7").await.unwrap();

        let chat = r#"{"type":"chat_message","data":{"room_id":"case:7","message":"hello"}}"#;
        registry.handle_message("c1", chat).await;
        assert_eq!(p1.drain_json()[0]["data"]["code"], "NOT_A_MEMBER");
        assert!(p2.drain().is_empty());

        registry.join_room("c1", "case:7").await.unwrap();
        registry.handle_message("c1", chat).await;
        assert!(p1.drain().is_empty());
        let relayed = p2.drain_json();
        assert_eq!(relayed[0]["type"], "chat_message");
        assert_eq!(relayed[0]["data"]["message"], "hello");
        assert_eq!(relayed[0]["data"]["user_id"], "alice");
    }

    #[tokio::test]
    async fn test_registered_handler_dispatch() {
        let (registry, _) = registry();
        registry.register_handler("echo", Arc::new(EchoHandler)).unwrap();
        assert!(registry.register_handler("heartbeat", Arc::new(EchoHandler)).is_err());
        let mut peer = connect(&registry, "alice", "c1").await;

        registry
            .handle_message("c1", r#"{"type":"echo","data":{"x":1}}"#)
            .await;
        let reply = peer.drain_json();
        assert_eq!(reply[0]["type"], "system_message");
        assert_eq!(reply[0]["data"]["echo"]["x"], 1);

        registry
            .handle_message("c1", r#"{"type":"echo","data":{"fail":true}}"#)
            .await;
        assert_eq!(peer.drain_json()[0]["data"]["code"], "HANDLER_FAILED");
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let config = RealtimeConfig {
            max_message_bytes: 32,
            ..RealtimeConfig::default()
        };
        let (registry, _) = registry_with(config);
        let mut peer = connect(&registry, "alice", "c1").await;

        let big = format!(r#"{{"type":"heartbeat","data":{{"pad":"{}"}}}}"#, "x".repeat(64));
        registry.handle_message("c1", &big).await;
        assert_eq!(peer.drain_json()[0]["data"]["code"], "INVALID_MESSAGE");
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_check_pings_and_reaps() {
        let (registry, recorder) = registry();
        let mut idle = connect(&registry, "alice", "idle").await;
        let mut active = connect(&registry, "bob", "active").await;

        tokio::time::advance(Duration::from_secs(45)).await;
        registry.handle_message("active", r#"{"type":"heartbeat"}"#).await;
        active.drain();

        assert_eq!(registry.check_heartbeats().await, 0);
        assert_eq!(idle.drain_json()[0]["data"]["status"], "ping");
        assert_eq!(active.drain_json()[0]["data"]["status"], "ping");

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(registry.check_heartbeats().await, 1);
        assert!(!registry.contains("idle").await);
        assert!(registry.contains("active").await);
        assert_eq!(recorder.count("offline:alice"), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_check_reaps_dead_connections() {
        let (registry, _) = registry();
        let peer = connect(&registry, "alice", "c1").await;
        drop(peer);
        registry.send_to_user("alice", MessageType::Notification, json!({})).await;

        assert_eq!(registry.check_heartbeats().await, 1);
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_oldest_connection_replaced_at_limit() {
        let config = RealtimeConfig {
            max_connections_per_user: 2,
            ..RealtimeConfig::default()
        };
        let (registry, recorder) = registry_with(config);
        let _p1 = connect(&registry, "alice", "c1").await;
        let _p2 = connect(&registry, "alice", "c2").await;
        let _p3 = connect(&registry, "alice", "c3").await;

        assert!(!registry.contains("c1").await);
        assert_eq!(registry.user_connections("alice").await.len(), 2);
        assert_eq!(recorder.count("offline"), 0);
    }

    #[tokio::test]
    async fn test_cleanup_rooms_without_members_is_noop() {
        let (registry, _) = registry();
        let _peer = connect(&registry, "alice", "c1").await;
        registry.join_room("c1", "doc:1").await.unwrap();
        assert_eq!(registry.cleanup_rooms().await, 0);
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_connection_info_lists_rooms() {
        let (registry, _) = registry();
        let _peer = connect(&registry, "alice", "c1").await;
        registry.join_room("c1", "b").await.unwrap();
        registry.join_room("c1", "a").await.unwrap();

        let info = registry.connection_info("c1").await.unwrap();
        assert_eq!(info.rooms, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(info.state, ConnectionState::Connected);
        assert_eq!(
            registry.stats().await,
            RegistryStats {
                connections: 1,
                users: 1,
                rooms: 2
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connect_disconnect_single_offline() {
        let (registry, recorder) = registry();
        let mut peers = Vec::new();
        for i in 0..8 {
            let (transport, peer) = ChannelTransport::pair(64, Duration::from_secs(1));
            peers.push(peer);
            registry
                .connect(transport, "alice", Some(format!("c{i}")), None)
                .await
                .unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.disconnect(&format!("c{i}")).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert!(!registry.is_user_online("alice").await);
        assert_eq!(recorder.count("offline:alice"), 1);
    }
}
