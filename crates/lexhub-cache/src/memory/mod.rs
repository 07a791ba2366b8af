//! In-process store and broker for single-node deployments and tests.

pub mod pubsub;
pub mod store;

pub use pubsub::MemoryPubSub;
pub use store::MemoryStore;
