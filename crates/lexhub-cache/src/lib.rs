//! # lexhub-cache
//!
//! Distributed store backends for LexHub. Supports two modes:
//!
//! - **memory**: in-process key/value store using [moka](https://crates.io/crates/moka)
//!   with per-entry TTL, plus a `tokio::sync::broadcast` pub/sub broker
//! - **redis**: Redis-backed store and pub/sub using the [redis](https://crates.io/crates/redis) crate
//!
//! The backend is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::StoreManager;
