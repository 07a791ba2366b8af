//! Store key builders for every record the real-time layer persists.
//!
//! Centralising key construction prevents typos and makes it easy
//! to find every key the application uses. Backend-level prefixes
//! (e.g. `lexhub:` on Redis) are applied by the backend, not here.

use chrono::NaiveDate;

// ── Presence keys ──────────────────────────────────────────

/// Key for a user's persisted presence record.
pub fn presence(user_id: &str) -> String {
    format!("presence:user:{user_id}")
}

/// Key for the set of users present in a room.
pub fn presence_room(room_id: &str) -> String {
    format!("presence:room:{room_id}")
}

// ── Session keys ───────────────────────────────────────────

/// Key for a session record.
pub fn session(session_id: &str) -> String {
    format!("session:{session_id}")
}

/// Key for the set of session ids owned by a user.
pub fn user_sessions(user_id: &str) -> String {
    format!("session:user:{user_id}")
}

// ── Activity keys ──────────────────────────────────────────

/// Key for the activity log partition of one calendar day.
pub fn activity_log(day: NaiveDate) -> String {
    format!("activity:log:{}", day.format("%Y-%m-%d"))
}

/// Key for a user's analytics snapshot.
pub fn user_analytics(user_id: &str) -> String {
    format!("activity:analytics:{user_id}")
}
