//! Cross-node event fan-out over the pub/sub broker.

pub mod broadcaster;
pub mod events;
pub mod handler;
pub mod message;

pub use broadcaster::EventBroadcaster;
pub use handler::{EventHandler, handler_fn};
pub use message::BroadcastMessage;
