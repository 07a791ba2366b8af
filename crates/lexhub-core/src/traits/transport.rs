//! Bidirectional client transport abstraction.

use async_trait::async_trait;

use crate::result::AppResult;

/// A single client message channel (a WebSocket in production).
///
/// The registry borrows the transport for the lifetime of a connection; it
/// never owns the underlying socket.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Complete the handshake. Fails if the peer is already gone.
    async fn accept(&self) -> AppResult<()>;

    /// Send one serialized JSON message.
    async fn send(&self, message: &str) -> AppResult<()>;

    /// Receive the next text message, or `None` once the peer has closed.
    async fn receive(&self) -> AppResult<Option<String>>;

    /// Close the transport.
    async fn close(&self) -> AppResult<()>;
}
