//! Application-defined inbound message handlers.

use async_trait::async_trait;
use serde_json::Value;

use lexhub_core::AppResult;

use crate::message::Envelope;

use super::handle::Connection;

/// Handles one inbound message type the registry does not know natively.
///
/// Returning `Ok(Some(envelope))` sends the envelope back to the sender;
/// an error is reported to the client as `HANDLER_FAILED`.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, connection: &Connection, data: Value) -> AppResult<Option<Envelope>>;
}
