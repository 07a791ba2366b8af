//! Presence tracking configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Presence service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// TTL of persisted presence records in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Interval of the inactivity sweep in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Seconds without activity before a presence is forced offline.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_seconds: u64,
    /// Window in seconds within which a room member counts as present.
    #[serde(default = "default_activity_window")]
    pub activity_window_seconds: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
            inactivity_timeout_seconds: default_inactivity_timeout(),
            activity_window_seconds: default_activity_window(),
        }
    }
}

impl PresenceConfig {
    /// TTL of persisted presence records.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Inactivity sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

fn default_ttl() -> u64 {
    3_600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_inactivity_timeout() -> u64 {
    600
}

fn default_activity_window() -> u64 {
    300
}
