//! Message validation rules.

use lexhub_core::{AppError, AppResult};

/// Maximum room id length in bytes.
pub const MAX_ROOM_ID_LEN: usize = 256;

/// Validates raw inbound text before parsing.
pub fn validate_inbound(raw: &str, max_bytes: usize) -> AppResult<()> {
    if raw.len() > max_bytes {
        return Err(AppError::validation(format!(
            "Message exceeds maximum size of {max_bytes} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::validation("Empty message"));
    }

    Ok(())
}

/// Validates room id format: 1..=256 chars of `[A-Za-z0-9:_.-]`.
pub fn validate_room_id(room_id: &str) -> AppResult<()> {
    if room_id.is_empty() || room_id.len() > MAX_ROOM_ID_LEN {
        return Err(AppError::validation("Invalid room id length"));
    }

    let valid = room_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_' | '.'));

    if !valid {
        return Err(AppError::validation(format!(
            "Room id contains invalid characters: {room_id}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_oversized() {
        assert!(validate_inbound("   ", 100).is_err());
        assert!(validate_inbound(&"x".repeat(101), 100).is_err());
        assert!(validate_inbound(r#"{"type":"heartbeat"}"#, 100).is_ok());
    }

    #[test]
    fn test_room_id_rules() {
        assert!(validate_room_id("document:abc-123_v2.1").is_ok());
        assert!(validate_room_id("").is_err());
        assert!(validate_room_id("has space").is_err());
        assert!(validate_room_id("slash/room").is_err());
        assert!(validate_room_id(&"a".repeat(MAX_ROOM_ID_LEN)).is_ok());
        assert!(validate_room_id(&"a".repeat(MAX_ROOM_ID_LEN + 1)).is_err());
    }
}
