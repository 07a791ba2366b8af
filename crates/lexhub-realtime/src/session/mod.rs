//! Per-user session records that survive reconnects.

pub mod model;
pub mod store;

pub use model::Session;
pub use store::SessionStore;
