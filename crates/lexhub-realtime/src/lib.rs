//! # lexhub-realtime
//!
//! Real-time collaboration layer for LexHub. Provides:
//!
//! - Connection registry with rooms, heartbeat reaping, and inbound dispatch
//! - Distributed event broadcast over a pub/sub broker with echo suppression
//! - User presence (online/away/busy/offline) mirrored to the shared store
//! - Session records that survive reconnects
//! - Buffered activity tracking with per-day logs and rolling analytics

pub mod activity;
pub mod broadcast;
pub mod connection;
pub mod message;
pub mod metrics;
pub mod presence;
pub mod room;
pub mod server;
pub mod session;
pub mod tasks;

pub use activity::ActivityTracker;
pub use broadcast::EventBroadcaster;
pub use connection::ConnectionRegistry;
pub use presence::PresenceService;
pub use server::{EngineStats, RealtimeEngine};
pub use session::SessionStore;
