use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use lexhub_core::types::id::new_session_id;
use lexhub_core::types::{SessionId, UserId};

/// A user's session: preferences and continuity across reconnects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    /// Never moves backwards.
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub preferences: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Session {
    pub fn new(
        user_id: impl Into<UserId>,
        preferences: Map<String, Value>,
        metadata: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: new_session_id(),
            user_id: user_id.into(),
            created_at: now,
            last_activity: now,
            preferences,
            metadata,
        }
    }

    /// Bump `last_activity` to now, keeping it monotonic.
    pub fn touch(&mut self) {
        self.last_activity = self.last_activity.max(Utc::now());
    }

    /// Whether the session has been idle longer than `ttl` at `now`.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut session = Session::new("u1", Map::new(), Map::new());
        let future = Utc::now() + Duration::hours(1);
        session.last_activity = future;
        session.touch();
        assert_eq!(session.last_activity, future);
    }

    #[test]
    fn test_expiry_window() {
        let mut session = Session::new("u1", Map::new(), Map::new());
        let now = Utc::now();
        session.last_activity = now - Duration::hours(25);
        assert!(session.is_expired(Duration::hours(24), now));
        session.last_activity = now - Duration::hours(23);
        assert!(!session.is_expired(Duration::hours(24), now));
    }
}
