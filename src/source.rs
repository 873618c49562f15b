// SPDX-License-Identifier: MIT
//! Network event source — bridges OS default-network callbacks into the
//! resolver pipeline.
//!
//! The platform layer implements [`DefaultNetworkCallbacks`] and delivers
//! events through the [`EventTap`] handed to it at registration time. The
//! tap's send is non-blocking: OS callback threads must never stall on a
//! slow consumer. Dropping the [`EventSubscription`] unregisters the
//! callbacks, including on error paths.

use crate::event::NetworkEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Opaque registration handle returned by the platform layer.
///
/// Returned to [`DefaultNetworkCallbacks::unregister`] on teardown so the
/// platform can match the unregistration to the original registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(pub u64);

/// Platform seam: registration and teardown of OS default-network callbacks.
///
/// Registration failure is a platform misconfiguration; it is propagated to
/// the caller rather than absorbed.
pub trait DefaultNetworkCallbacks: Send + Sync {
    /// Register for default-network change notifications, delivering them
    /// through `tap`.
    fn register(&self, tap: EventTap) -> anyhow::Result<CallbackToken>;

    /// Tear down a previous registration. Must be idempotent.
    fn unregister(&self, token: CallbackToken);
}

/// Cloneable delivery handle held by the OS callback context.
#[derive(Clone)]
pub struct EventTap {
    tx: mpsc::Sender<NetworkEvent>,
}

impl EventTap {
    /// Hand an event to the pipeline without blocking.
    ///
    /// A full buffer drops the event with a warning; bursts beyond the
    /// buffer are collapsed by the debounce stage anyway. A closed channel
    /// means the subscriber is gone (delivery raced with teardown) and is
    /// silent.
    pub fn deliver(&self, event: NetworkEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "event buffer full, dropping network event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("network event delivered after teardown, ignoring");
            }
        }
    }
}

/// Errors from subscribing to the event source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("event source already has an active subscription")]
    AlreadySubscribed,
    #[error("callback registration failed: {0}")]
    Registration(#[source] anyhow::Error),
}

/// Wraps the platform callbacks into a single ordered event channel.
pub struct NetworkEventSource {
    callbacks: Arc<dyn DefaultNetworkCallbacks>,
    subscribed: Arc<AtomicBool>,
}

impl NetworkEventSource {
    pub fn new(callbacks: Arc<dyn DefaultNetworkCallbacks>) -> Self {
        Self {
            callbacks,
            subscribed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register the OS callbacks and return the single ordered consumer.
    ///
    /// At most one subscription may be active per source; a second call
    /// fails with [`SourceError::AlreadySubscribed`] until the previous
    /// subscription has been dropped.
    pub fn subscribe(&self, buffer: usize) -> Result<EventSubscription, SourceError> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(SourceError::AlreadySubscribed);
        }

        let (tx, rx) = mpsc::channel(buffer.max(1));
        let tap = EventTap { tx };
        let token = match self.callbacks.register(tap) {
            Ok(token) => token,
            Err(e) => {
                self.subscribed.store(false, Ordering::SeqCst);
                return Err(SourceError::Registration(e));
            }
        };
        debug!(token = token.0, "network callbacks registered");

        Ok(EventSubscription {
            rx,
            token,
            callbacks: Arc::clone(&self.callbacks),
            active: ActiveGuard {
                flag: Arc::clone(&self.subscribed),
            },
        })
    }
}

/// Clears the source's subscribed flag when the subscription drops.
struct ActiveGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Single ordered consumer of network events.
///
/// Dropping the subscription unregisters the OS callbacks deterministically;
/// any event still in flight on a callback thread hits a closed channel and
/// is discarded silently.
pub struct EventSubscription {
    rx: mpsc::Receiver<NetworkEvent>,
    token: CallbackToken,
    callbacks: Arc<dyn DefaultNetworkCallbacks>,
    #[allow(dead_code)]
    active: ActiveGuard,
}

impl EventSubscription {
    /// Receive the next event in delivery order. `None` once the source side
    /// is gone and the buffer is drained.
    pub async fn recv(&mut self) -> Option<NetworkEvent> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        debug!(token = self.token.0, "unregistering network callbacks");
        self.callbacks.unregister(self.token);
    }
}
