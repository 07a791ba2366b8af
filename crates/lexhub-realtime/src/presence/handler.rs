//! Inbound `status_update` messages from clients.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;

use lexhub_core::{AppError, AppResult};

use crate::connection::{Connection, InboundHandler};
use crate::message::Envelope;

use super::service::PresenceService;
use super::status::PresenceStatus;

/// Inbound type this handler is registered under.
pub const STATUS_UPDATE: &str = "status_update";

/// Lets a client switch between online, away, and busy.
///
/// Going offline is only possible by disconnecting.
pub struct StatusUpdateHandler {
    presence: Weak<PresenceService>,
}

impl StatusUpdateHandler {
    pub fn new(presence: &Arc<PresenceService>) -> Self {
        Self {
            presence: Arc::downgrade(presence),
        }
    }
}

#[async_trait]
impl InboundHandler for StatusUpdateHandler {
    async fn handle(&self, connection: &Connection, data: Value) -> AppResult<Option<Envelope>> {
        let status: PresenceStatus = data
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::validation("status_update requires a 'status' string"))?
            .parse()?;
        if status == PresenceStatus::Offline {
            return Err(AppError::validation(
                "Cannot set status to offline while connected",
            ));
        }

        let presence = self
            .presence
            .upgrade()
            .ok_or_else(|| AppError::service_unavailable("Presence service stopped"))?;
        presence.update_status(&connection.user_id, status).await;
        Ok(None)
    }
}
