//! Collaborator traits defined in `lexhub-core` and implemented by other crates.

pub mod credential;
pub mod pubsub;
pub mod store;
pub mod transport;

pub use credential::CredentialResolver;
pub use pubsub::{MessageStream, PubSubBroker};
pub use store::{KeyValueStore, KeyValueStoreExt};
pub use transport::Transport;
