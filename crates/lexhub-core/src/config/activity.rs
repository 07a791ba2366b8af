//! Activity tracking configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Activity tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Capacity of the in-process event buffer; oldest events drop beyond it.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Interval between buffer flushes in seconds.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_seconds: u64,
    /// Interval between analytics checkpoints in seconds.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_seconds: u64,
    /// Retention of per-day activity logs in days.
    #[serde(default = "default_log_retention")]
    pub log_retention_days: u64,
    /// Retention of analytics snapshots in days.
    #[serde(default = "default_analytics_retention")]
    pub analytics_retention_days: u64,
    /// How many days back history queries look.
    #[serde(default = "default_history_lookback")]
    pub history_lookback_days: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            flush_interval_seconds: default_flush_interval(),
            checkpoint_interval_seconds: default_checkpoint_interval(),
            log_retention_days: default_log_retention(),
            analytics_retention_days: default_analytics_retention(),
            history_lookback_days: default_history_lookback(),
        }
    }
}

impl ActivityConfig {
    /// Flush interval.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds)
    }

    /// Checkpoint interval.
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_seconds)
    }

    /// Retention of per-day logs.
    pub fn log_retention(&self) -> Duration {
        Duration::from_secs(self.log_retention_days * 86_400)
    }

    /// Retention of analytics snapshots.
    pub fn analytics_retention(&self) -> Duration {
        Duration::from_secs(self.analytics_retention_days * 86_400)
    }
}

fn default_buffer_capacity() -> usize {
    10_000
}

fn default_flush_interval() -> u64 {
    30
}

fn default_checkpoint_interval() -> u64 {
    300
}

fn default_log_retention() -> u64 {
    30
}

fn default_analytics_retention() -> u64 {
    7
}

fn default_history_lookback() -> u64 {
    7
}
