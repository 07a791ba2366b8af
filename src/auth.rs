//! JWT credential resolution for WebSocket connects.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use lexhub_core::config::AuthConfig;
use lexhub_core::traits::CredentialResolver;
use lexhub_core::types::UserId;
use lexhub_core::{AppError, AppResult};

/// Claims this server reads from an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
}

/// Resolves HS256 bearer tokens into user ids.
#[derive(Clone)]
pub struct JwtResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtResolver")
            .field("validation", &self.validation)
            .finish()
    }
}

impl JwtResolver {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl CredentialResolver for JwtResolver {
    async fn resolve(&self, credential: &str) -> AppResult<UserId> {
        let data = decode::<Claims>(credential, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                JwtErrorKind::ExpiredSignature => AppError::authentication("Token has expired"),
                JwtErrorKind::InvalidSignature => {
                    AppError::authentication("Invalid token signature")
                }
                _ => AppError::authentication(format!("Token validation failed: {e}")),
            },
        )?;
        Ok(data.claims.sub)
    }
}
