//! WebSocket authentication: resolves the connect credential to a user.

use std::sync::Arc;

use lexhub_core::traits::CredentialResolver;
use lexhub_core::types::UserId;
use lexhub_core::{AppError, AppResult};

/// Authenticates connections through a pluggable credential resolver.
#[derive(Debug, Clone)]
pub struct WsAuthenticator {
    resolver: Arc<dyn CredentialResolver>,
}

impl WsAuthenticator {
    /// Creates a new WebSocket authenticator.
    pub fn new(resolver: Arc<dyn CredentialResolver>) -> Self {
        Self { resolver }
    }

    /// Authenticates a connection using a token (typically from query parameter).
    pub async fn authenticate(&self, token: Option<&str>) -> AppResult<UserId> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::authentication("Missing credential"))?;

        let user_id = self.resolver.resolve(token).await?;
        if user_id.is_empty() {
            return Err(AppError::authentication("Credential resolved to an empty user"));
        }
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use lexhub_core::error::ErrorKind;

    use super::*;

    #[derive(Debug)]
    struct StaticResolver;

    #[async_trait]
    impl CredentialResolver for StaticResolver {
        async fn resolve(&self, credential: &str) -> AppResult<UserId> {
            match credential {
                "good" => Ok("user-1".into()),
                "blank" => Ok(String::new()),
                _ => Err(AppError::authentication("bad token")),
            }
        }
    }

    #[tokio::test]
    async fn test_authenticate() {
        let auth = WsAuthenticator::new(Arc::new(StaticResolver));
        assert_eq!(auth.authenticate(Some("good")).await.unwrap(), "user-1");
        assert!(auth.authenticate(Some("nope")).await.unwrap_err().is(ErrorKind::Authentication));
        assert!(auth.authenticate(Some("  ")).await.is_err());
        assert!(auth.authenticate(None).await.is_err());
        assert!(auth.authenticate(Some("blank")).await.is_err());
    }
}
