//! User presence tracking: online status and room membership.

pub mod handler;
pub mod model;
pub mod service;
pub mod status;

pub use handler::StatusUpdateHandler;
pub use model::{PresenceStats, UserPresence};
pub use service::PresenceService;
pub use status::PresenceStatus;
