//! # lexhub-core
//!
//! Core crate for LexHub. Contains the collaborator traits the real-time
//! layer is written against (transport, credential resolution, distributed
//! key/value store, pub/sub broker), configuration schemas, identifier
//! helpers, and the unified error system.
//!
//! This crate has **no** internal dependencies on other LexHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
