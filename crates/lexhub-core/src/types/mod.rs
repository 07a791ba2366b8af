//! Shared identifier types.

pub mod id;

pub use id::{ConnectionId, RoomId, SessionId, UserId};
