//! Domain broadcasts for documents, comments, notifications, presence,
//! and system announcements.

use serde_json::{Value, json};

use lexhub_core::types::UserId;

use crate::message::MessageType;

use super::broadcaster::EventBroadcaster;

/// Room that collaborators of a document join.
pub fn document_room(document_id: &str) -> String {
    format!("document:{document_id}")
}

impl EventBroadcaster {
    /// Handle a document change made by `user_id`.
    pub async fn broadcast_document_update(
        &self,
        document_id: &str,
        user_id: &str,
        changes: Value,
    ) -> usize {
        let data = json!({
            "document_id": document_id,
            "user_id": user_id,
            "update_type": "edit",
            "changes": changes,
        });
        self.broadcast(
            MessageType::DocumentUpdate,
            data,
            None,
            Some(document_room(document_id)),
        )
        .await
    }

    /// Handle a new comment on a document.
    pub async fn broadcast_comment(&self, document_id: &str, user_id: &str, comment: Value) -> usize {
        let data = json!({
            "document_id": document_id,
            "user_id": user_id,
            "update_type": "comment",
            "comment": comment,
        });
        self.broadcast(
            MessageType::DocumentUpdate,
            data,
            None,
            Some(document_room(document_id)),
        )
        .await
    }

    /// Push a notification to specific users wherever they are connected.
    pub async fn send_notification(
        &self,
        user_ids: Vec<UserId>,
        title: &str,
        message: &str,
        payload: Option<Value>,
    ) -> usize {
        let data = json!({
            "title": title,
            "message": message,
            "payload": payload,
        });
        self.broadcast(MessageType::Notification, data, Some(user_ids), None)
            .await
    }

    /// Announce that a user joined a room.
    pub async fn broadcast_presence_join(&self, room_id: &str, user_id: &str) -> usize {
        self.broadcast_room_presence(room_id, user_id, "joined").await
    }

    /// Announce that a user left a room.
    pub async fn broadcast_presence_leave(&self, room_id: &str, user_id: &str) -> usize {
        self.broadcast_room_presence(room_id, user_id, "left").await
    }

    async fn broadcast_room_presence(&self, room_id: &str, user_id: &str, action: &str) -> usize {
        let data = json!({
            "user_id": user_id,
            "room_id": room_id,
            "action": action,
        });
        self.broadcast(
            MessageType::UserPresence,
            data,
            None,
            Some(room_id.to_string()),
        )
        .await
    }

    /// System-wide announcement to every connection.
    pub async fn broadcast_system_message(&self, message: &str, level: &str) -> usize {
        let data = json!({ "message": message, "level": level });
        self.broadcast(MessageType::SystemMessage, data, None, None)
            .await
    }
}
