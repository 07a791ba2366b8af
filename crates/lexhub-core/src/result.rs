//! Convenience result type alias for LexHub.

use crate::error::AppError;

/// A specialized `Result` type for LexHub operations.
pub type AppResult<T> = Result<T, AppError>;
