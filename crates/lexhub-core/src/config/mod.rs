//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod activity;
pub mod app;
pub mod auth;
pub mod logging;
pub mod presence;
pub mod realtime;
pub mod session;
pub mod store;

use serde::{Deserialize, Serialize};

pub use self::activity::ActivityConfig;
pub use self::app::ServerConfig;
pub use self::auth::AuthConfig;
pub use self::logging::LoggingConfig;
pub use self::presence::PresenceConfig;
pub use self::realtime::RealtimeConfig;
pub use self::session::SessionConfig;
pub use self::store::StoreConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Distributed store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Connection registry and broadcaster settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Presence service settings.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Session store settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Activity tracker settings.
    #[serde(default)]
    pub activity: ActivityConfig,
    /// Credential resolution settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `LEXHUB__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("LEXHUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.realtime.heartbeat_interval_seconds, 30);
        assert_eq!(config.realtime.heartbeat_timeout_seconds, 60);
        assert_eq!(config.realtime.room_cleanup_interval_seconds, 300);
        assert_eq!(config.presence.ttl_seconds, 3_600);
        assert_eq!(config.presence.inactivity_timeout_seconds, 600);
        assert_eq!(config.presence.activity_window_seconds, 300);
        assert_eq!(config.session.ttl_seconds, 86_400);
        assert_eq!(config.activity.flush_interval_seconds, 30);
        assert_eq!(config.activity.log_retention_days, 30);
        assert_eq!(config.activity.analytics_retention_days, 7);
    }

    #[test]
    fn test_partial_section_uses_field_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "realtime": { "heartbeat_timeout_seconds": 90 },
            "store": { "provider": "redis" }
        }))
        .unwrap();
        assert_eq!(config.realtime.heartbeat_timeout_seconds, 90);
        assert_eq!(config.realtime.heartbeat_interval_seconds, 30);
        assert_eq!(config.store.provider, "redis");
        assert_eq!(config.store.redis.key_prefix, "lexhub:");
    }
}
