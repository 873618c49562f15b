// SPDX-License-Identifier: MIT
//! Push-event fan-out for status changes.
//!
//! The watch channel in [`crate::resolver`] is the canonical surface:
//! lossless, replay-latest. This broadcaster is the push-style complement
//! for consumers (UI indicator, tunnel health check) that want serialized
//! change notifications instead. Lossy for receivers that fall behind.

use crate::resolver::ConnectivityStatus;
use serde_json::json;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 64;

/// Fans out serialized `connectivity_changed` notifications to all
/// subscribed receivers.
pub struct StatusBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    /// Notify all receivers of a status change.
    pub fn status_changed(&self, status: ConnectivityStatus) {
        let notification = json!({
            "event": "connectivity_changed",
            "params": {
                "ipv4": status.ipv4,
                "ipv6": status.ipv6,
            },
        });
        // No subscribers is fine.
        let _ = self
            .tx
            .send(serde_json::to_string(&notification).unwrap_or_default());
    }

    /// Subscribe to future status-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}
