//! Credential resolution collaborator.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::UserId;

/// Resolves a client credential (e.g. a bearer token) into a user id.
///
/// Implementations return an `Authentication` error for invalid or
/// expired credentials.
#[async_trait]
pub trait CredentialResolver: Send + Sync + std::fmt::Debug {
    /// Decode the credential and return the user it belongs to.
    async fn resolve(&self, credential: &str) -> AppResult<UserId>;
}
