//! In-process channel-backed transport.
//!
//! Bridges a socket task (or a test) to the registry: the registry writes
//! into a bounded outbound queue that the peer drains, and the peer feeds
//! inbound text the registry reads through [`Transport::receive`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use lexhub_core::traits::Transport;
use lexhub_core::{AppError, AppResult};

/// Server side of an mpsc-backed connection.
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: mpsc::Sender<String>,
    inbound: Mutex<mpsc::Receiver<String>>,
    write_timeout: Duration,
    closed: AtomicBool,
}

/// Client side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelPeer {
    /// Messages written by the server.
    pub outbound: mpsc::Receiver<String>,
    /// Messages to deliver to the server.
    pub inbound: mpsc::Sender<String>,
}

impl ChannelTransport {
    /// Create a connected transport/peer pair.
    pub fn pair(buffer: usize, write_timeout: Duration) -> (Arc<Self>, ChannelPeer) {
        let (out_tx, out_rx) = mpsc::channel(buffer.max(1));
        let (in_tx, in_rx) = mpsc::channel(buffer.max(1));
        let transport = Arc::new(Self {
            outbound: out_tx,
            inbound: Mutex::new(in_rx),
            write_timeout,
            closed: AtomicBool::new(false),
        });
        (
            transport,
            ChannelPeer {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn accept(&self) -> AppResult<()> {
        if self.is_closed() || self.outbound.is_closed() {
            return Err(AppError::transport("Peer went away before handshake"));
        }
        Ok(())
    }

    async fn send(&self, message: &str) -> AppResult<()> {
        if self.is_closed() {
            return Err(AppError::transport("Transport is closed"));
        }
        match tokio::time::timeout(self.write_timeout, self.outbound.send(message.to_string())).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(AppError::transport("Peer closed the connection")),
            Err(_) => Err(AppError::transport(format!(
                "Write timed out after {:?}",
                self.write_timeout
            ))),
        }
    }

    async fn receive(&self) -> AppResult<Option<String>> {
        if self.is_closed() {
            return Ok(None);
        }
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> AppResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inbound.lock().await.close();
        Ok(())
    }
}

impl ChannelPeer {
    /// Take every message currently queued by the server.
    pub fn drain(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Take every queued message and parse it as JSON.
    pub fn drain_json(&mut self) -> Vec<serde_json::Value> {
        self.drain()
            .iter()
            .filter_map(|m| serde_json::from_str(m).ok())
            .collect()
    }
}
