//! Presence status definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use lexhub_core::AppError;

/// User presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Connected and available.
    Online,
    /// Connected but stepped away.
    Away,
    /// Connected, do not disturb.
    Busy,
    /// No live connection.
    Offline,
}

impl PresenceStatus {
    /// Converts to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }

    pub fn is_online(&self) -> bool {
        !matches!(self, Self::Offline)
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" | "active" => Ok(Self::Online),
            "away" | "idle" => Ok(Self::Away),
            "busy" | "dnd" | "do_not_disturb" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            other => Err(AppError::validation(format!("Unknown presence status: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("DND".parse::<PresenceStatus>().unwrap(), PresenceStatus::Busy);
        assert_eq!("idle".parse::<PresenceStatus>().unwrap(), PresenceStatus::Away);
        assert!("sleeping".parse::<PresenceStatus>().is_err());
        assert_eq!(serde_json::to_value(PresenceStatus::Busy).unwrap(), "busy");
    }
}
