//! Realtime engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide counters shared by every realtime component.
#[derive(Debug, Default)]
pub struct RealtimeMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    messages_sent: AtomicU64,
    messages_failed: AtomicU64,
    messages_received: AtomicU64,
    broadcasts_published: AtomicU64,
    broadcasts_relayed: AtomicU64,
    publish_failures: AtomicU64,
    activity_dropped: AtomicU64,
}

impl RealtimeMetrics {
    /// Create new zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_failed(&self) {
        self.messages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_published(&self) {
        self.broadcasts_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_relayed(&self) {
        self.broadcasts_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record activity events evicted from a full buffer.
    pub fn activity_dropped(&self, count: u64) {
        self.activity_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let opened = self.connections_opened.load(Ordering::Relaxed);
        let closed = self.connections_closed.load(Ordering::Relaxed);
        MetricsSnapshot {
            connections_opened: opened,
            connections_closed: closed,
            connections_active: opened.saturating_sub(closed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            broadcasts_published: self.broadcasts_published.load(Ordering::Relaxed),
            broadcasts_relayed: self.broadcasts_relayed.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            activity_dropped: self.activity_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub connections_active: u64,
    pub messages_sent: u64,
    pub messages_failed: u64,
    pub messages_received: u64,
    pub broadcasts_published: u64,
    pub broadcasts_relayed: u64,
    pub publish_failures: u64,
    pub activity_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_connections_derived_from_counters() {
        let metrics = RealtimeMetrics::new();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();
        metrics.activity_dropped(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.connections_opened, 2);
        assert_eq!(snap.connections_active, 1);
        assert_eq!(snap.activity_dropped, 3);
    }
}
