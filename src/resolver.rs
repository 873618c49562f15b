// SPDX-License-Identifier: MIT
//! Connectivity status resolver.
//!
//! Composes the event source, the raw state reducer, and the underlying
//! probe into a single status stream:
//!
//! ```text
//! OS callbacks ──► EventTap ──► reduce ──► debounce ──► resolve ──► dedupe ──► watch
//!                                                         │
//!                                          VPN? ──► UnderlyingProbe
//! ```
//!
//! Network-change callbacks arrive as noisy bursts during interface
//! transitions; reacting to each one would flicker the user-visible
//! indicator and could briefly declare the app offline mid-handover. The
//! pipeline therefore folds a whole burst silently and resolves only once
//! the debounce window elapses with no further event.
//!
//! The stream never terminates with an error: every internal failure is
//! absorbed into a (possibly less favorable) status value. An indicator
//! that stops updating on error is worse than one that briefly
//! under-reports connectivity.

use crate::config::ResolverConfig;
use crate::notify::StatusBroadcaster;
use crate::probe::{SocketProtector, UnderlyingProbe};
use crate::source::{DefaultNetworkCallbacks, EventSubscription, NetworkEventSource};
use crate::state::{reduce, RawNetworkState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// Dual-stack connectivity verdict. The sole externally observable output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityStatus {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl ConnectivityStatus {
    pub fn any(&self) -> bool {
        self.ipv4 || self.ipv6
    }
}

impl std::fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.ipv4, self.ipv6) {
            (true, true) => write!(f, "dual-stack"),
            (true, false) => write!(f, "ipv4-only"),
            (false, true) => write!(f, "ipv6-only"),
            (false, false) => write!(f, "offline"),
        }
    }
}

/// Running resolver instance.
///
/// Owns the pipeline task. Dropping the resolver (or calling
/// [`StatusResolver::shutdown`]) stops the task; the event subscription
/// drops with it and unregisters the OS callbacks deterministically. A
/// blocking probe already inside a syscall cannot be interrupted; its
/// result is discarded.
pub struct StatusResolver {
    status_rx: watch::Receiver<ConnectivityStatus>,
    broadcaster: Arc<StatusBroadcaster>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StatusResolver {
    /// Subscribe to the OS callbacks and start the pipeline.
    ///
    /// `callbacks` is the platform registration seam; `protector` is the
    /// socket-protect capability of the active VPN tunnel. Registration
    /// failure is a platform misconfiguration and is propagated.
    pub fn spawn(
        callbacks: Arc<dyn DefaultNetworkCallbacks>,
        protector: Arc<dyn SocketProtector>,
        config: ResolverConfig,
    ) -> anyhow::Result<Self> {
        let source = NetworkEventSource::new(callbacks);
        let subscription = source.subscribe(config.event_buffer)?;

        let probe = UnderlyingProbe::new(protector)
            .with_targets(config.probe_ipv4_target()?, config.probe_ipv6_target()?);

        // Subscribers observe the latest value immediately; before the
        // first resolution that is "offline" (null snapshot).
        let (status_tx, status_rx) = watch::channel(ConnectivityStatus::default());
        let broadcaster = Arc::new(StatusBroadcaster::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let pipeline = Pipeline {
            subscription,
            probe,
            debounce_window: config.debounce_window(),
            status_tx,
            broadcaster: Arc::clone(&broadcaster),
        };
        let task = tokio::spawn(pipeline.run(shutdown_rx));

        info!(
            debounce_ms = config.debounce_window_ms,
            buffer = config.event_buffer,
            "connectivity resolver started"
        );

        Ok(Self {
            status_rx,
            broadcaster,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Latest resolved status.
    pub fn current(&self) -> ConnectivityStatus {
        *self.status_rx.borrow()
    }

    /// Watch-channel subscription: yields the latest value on subscribe,
    /// then every change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.status_rx.clone()
    }

    /// The same subscription as a `Stream`.
    pub fn status_stream(&self) -> WatchStream<ConnectivityStatus> {
        WatchStream::new(self.status_rx.clone())
    }

    /// Push-event fan-out of status changes (serialized notifications).
    pub fn broadcaster(&self) -> Arc<StatusBroadcaster> {
        Arc::clone(&self.broadcaster)
    }

    /// Stop the pipeline and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!("connectivity resolver stopped");
    }
}

impl Drop for StatusResolver {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            // Last resort if the runtime never polls the shutdown signal.
            task.abort();
        }
    }
}

/// Single-consumer pipeline state. Probe invocations are serialized by
/// construction: the probe is awaited inline in the consumer loop, so a
/// new burst arriving mid-probe queues in the bounded channel and starts
/// the next cycle only after this one emits.
struct Pipeline {
    subscription: EventSubscription,
    probe: UnderlyingProbe,
    debounce_window: std::time::Duration,
    status_tx: watch::Sender<ConnectivityStatus>,
    broadcaster: Arc<StatusBroadcaster>,
}

impl Pipeline {
    async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut state: Option<RawNetworkState> = None;
        let mut last = ConnectivityStatus::default();
        let mut source_gone = false;

        'pipeline: while !source_gone {
            // Wait for the first event of a burst.
            let event = tokio::select! {
                _ = &mut shutdown_rx => break 'pipeline,
                event = self.subscription.recv() => match event {
                    Some(event) => event,
                    None => break 'pipeline,
                },
            };
            debug!(?event, "network event");
            state = reduce(state.take(), event);

            // Fold the rest of the burst until the window stays quiet.
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break 'pipeline,
                    _ = tokio::time::sleep(self.debounce_window) => break,
                    event = self.subscription.recv() => match event {
                        Some(event) => {
                            debug!(?event, "network event (debounced)");
                            state = reduce(state.take(), event);
                        }
                        // Resolve what we have, then stop.
                        None => {
                            source_gone = true;
                            break;
                        }
                    },
                }
            }

            let status = self.resolve(state.as_ref()).await;
            if status != last {
                info!(ipv4 = status.ipv4, ipv6 = status.ipv6, status = %status, "connectivity changed");
                // send() only errors with no receivers; ours lives in the
                // resolver handle, and even then the value is retained.
                let _ = self.status_tx.send(status);
                self.broadcaster.status_changed(status);
                last = status;
            } else {
                debug!(status = %status, "connectivity unchanged, suppressing emission");
            }
        }
        // Dropping the subscription here unregisters the OS callbacks.
    }

    /// One resolution cycle over the debounced snapshot.
    async fn resolve(&self, state: Option<&RawNetworkState>) -> ConnectivityStatus {
        let Some(snapshot) = state else {
            return ConnectivityStatus::default();
        };

        if snapshot.is_vpn() {
            // Link properties describe the tunnel interface; ask the
            // routing table about the physical network instead.
            debug!(network = %snapshot.network_id, "default network is a VPN, probing underlying network");
            self.probe.check().await
        } else {
            match &snapshot.link_properties {
                Some(props) => ConnectivityStatus {
                    ipv4: props.has_ipv4(),
                    ipv6: props.has_ipv6(),
                },
                None => {
                    warn!(network = %snapshot.network_id, "no link properties on tracked network");
                    ConnectivityStatus::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{
        Capability, LinkProperties, NetworkCapabilities, NetworkEvent, NetworkId,
    };
    use crate::source::{CallbackToken, EventTap};
    use std::net::{IpAddr, Ipv4Addr, UdpSocket};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    #[derive(Default)]
    struct FakePlatform {
        tap: Mutex<Option<EventTap>>,
        registered: AtomicBool,
    }

    impl DefaultNetworkCallbacks for FakePlatform {
        fn register(&self, tap: EventTap) -> anyhow::Result<CallbackToken> {
            *self.tap.lock().unwrap() = Some(tap);
            self.registered.store(true, Ordering::SeqCst);
            Ok(CallbackToken(1))
        }

        fn unregister(&self, _token: CallbackToken) {
            self.registered.store(false, Ordering::SeqCst);
        }
    }

    impl FakePlatform {
        fn tap(&self) -> EventTap {
            self.tap.lock().unwrap().clone().unwrap()
        }
    }

    struct CountingProtector {
        calls: AtomicUsize,
    }

    impl CountingProtector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl SocketProtector for CountingProtector {
        fn protect(&self, _socket: &UdpSocket) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn test_config() -> ResolverConfig {
        ResolverConfig {
            debounce_window_ms: 300,
            ..ResolverConfig::default()
        }
    }

    fn v4_addr() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))
    }

    fn v6_addr() -> IpAddr {
        "2001:db8::1".parse().unwrap()
    }

    fn link_props(addrs: Vec<IpAddr>) -> LinkProperties {
        LinkProperties {
            interface_name: Some("wlan0".into()),
            addresses: addrs,
        }
    }

    fn not_vpn_caps() -> NetworkCapabilities {
        NetworkCapabilities::new([Capability::NotVpn, Capability::Internet])
    }

    fn vpn_caps() -> NetworkCapabilities {
        NetworkCapabilities::new([Capability::Internet])
    }

    async fn past_debounce() {
        // Paused clock: advance just past the debounce window.
        tokio::time::advance(Duration::from_millis(350)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn non_vpn_status_derives_from_link_addresses() {
        let platform = Arc::new(FakePlatform::default());
        let protector = CountingProtector::new();
        let resolver =
            StatusResolver::spawn(platform.clone(), protector.clone(), test_config()).unwrap();
        let mut stream = resolver.status_stream();
        // Initial replayed value.
        assert_eq!(stream.next().await, Some(ConnectivityStatus::default()));

        let id = NetworkId(1);
        let tap = platform.tap();
        tap.deliver(NetworkEvent::Available { id });
        tap.deliver(NetworkEvent::CapabilitiesChanged {
            id,
            capabilities: not_vpn_caps(),
        });
        tap.deliver(NetworkEvent::LinkPropertiesChanged {
            id,
            properties: link_props(vec![v4_addr()]),
        });
        past_debounce().await;

        assert_eq!(
            stream.next().await,
            Some(ConnectivityStatus {
                ipv4: true,
                ipv6: false
            })
        );
        // Non-VPN branch never invokes the probe.
        assert_eq!(protector.calls.load(Ordering::SeqCst), 0);

        resolver.shutdown().await;
        assert!(!platform.registered.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_collapses_bursts_to_the_last_state() {
        let platform = Arc::new(FakePlatform::default());
        let resolver =
            StatusResolver::spawn(platform.clone(), CountingProtector::new(), test_config())
                .unwrap();
        let mut stream = resolver.status_stream();
        assert_eq!(stream.next().await, Some(ConnectivityStatus::default()));

        let id = NetworkId(1);
        let tap = platform.tap();
        // Burst: e1 at t=0, e2 at t=50. Only e2's resulting state resolves.
        tap.deliver(NetworkEvent::Available { id });
        tap.deliver(NetworkEvent::CapabilitiesChanged {
            id,
            capabilities: not_vpn_caps(),
        });
        tokio::time::advance(Duration::from_millis(50)).await;
        tap.deliver(NetworkEvent::LinkPropertiesChanged {
            id,
            properties: link_props(vec![v4_addr()]),
        });
        past_debounce().await;
        assert_eq!(
            stream.next().await,
            Some(ConnectivityStatus {
                ipv4: true,
                ipv6: false
            })
        );

        // e3 arrives alone after the window and resolves separately.
        tap.deliver(NetworkEvent::LinkPropertiesChanged {
            id,
            properties: link_props(vec![v4_addr(), v6_addr()]),
        });
        past_debounce().await;
        assert_eq!(
            stream.next().await,
            Some(ConnectivityStatus {
                ipv4: true,
                ipv6: true
            })
        );

        resolver.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_statuses_are_suppressed() {
        let platform = Arc::new(FakePlatform::default());
        let resolver =
            StatusResolver::spawn(platform.clone(), CountingProtector::new(), test_config())
                .unwrap();
        let mut rx = resolver.subscribe();

        let id = NetworkId(1);
        let tap = platform.tap();
        tap.deliver(NetworkEvent::Available { id });
        tap.deliver(NetworkEvent::CapabilitiesChanged {
            id,
            capabilities: not_vpn_caps(),
        });
        tap.deliver(NetworkEvent::LinkPropertiesChanged {
            id,
            properties: link_props(vec![v4_addr()]),
        });
        past_debounce().await;
        rx.changed().await.unwrap();
        assert_eq!(
            *rx.borrow_and_update(),
            ConnectivityStatus {
                ipv4: true,
                ipv6: false
            }
        );

        // A different burst resolving to the same status emits nothing.
        tap.deliver(NetworkEvent::BlockedStatusChanged { id, blocked: true });
        past_debounce().await;
        assert!(
            tokio::time::timeout(Duration::from_secs(5), rx.changed())
                .await
                .is_err(),
            "same status must not re-emit"
        );

        resolver.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn lost_network_resolves_to_offline() {
        let platform = Arc::new(FakePlatform::default());
        let resolver =
            StatusResolver::spawn(platform.clone(), CountingProtector::new(), test_config())
                .unwrap();
        let mut rx = resolver.subscribe();

        let id = NetworkId(1);
        let tap = platform.tap();
        tap.deliver(NetworkEvent::Available { id });
        tap.deliver(NetworkEvent::CapabilitiesChanged {
            id,
            capabilities: not_vpn_caps(),
        });
        tap.deliver(NetworkEvent::LinkPropertiesChanged {
            id,
            properties: link_props(vec![v4_addr(), v6_addr()]),
        });
        past_debounce().await;
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().any());

        tap.deliver(NetworkEvent::Lost { id });
        past_debounce().await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectivityStatus::default());

        resolver.shutdown().await;
    }

    // Real sockets, so no paused clock here. The VPN branch must delegate
    // to the probe even though the tunnel's link properties carry a
    // public-looking IPv6 address that direct inspection would report as
    // ipv6-only.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn vpn_branch_delegates_to_the_probe() {
        let platform = Arc::new(FakePlatform::default());
        let protector = CountingProtector::new();
        let config = ResolverConfig {
            debounce_window_ms: 50,
            // Loopback route resolves; multicast-without-scope fails.
            probe_ipv4: "127.0.0.1:9".into(),
            probe_ipv6: "[ff02::1]:9".into(),
            ..ResolverConfig::default()
        };
        let resolver = StatusResolver::spawn(platform.clone(), protector.clone(), config).unwrap();
        let mut rx = resolver.subscribe();

        let id = NetworkId(1);
        let tap = platform.tap();
        tap.deliver(NetworkEvent::Available { id });
        tap.deliver(NetworkEvent::CapabilitiesChanged {
            id,
            capabilities: vpn_caps(),
        });
        tap.deliver(NetworkEvent::LinkPropertiesChanged {
            id,
            properties: link_props(vec![v6_addr()]),
        });

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("resolution within timeout")
            .unwrap();
        let status = *rx.borrow_and_update();
        // Probe verdict, not link inspection (which would say ipv6-only).
        assert_eq!(
            status,
            ConnectivityStatus {
                ipv4: true,
                ipv6: false
            }
        );
        assert!(protector.calls.load(Ordering::SeqCst) >= 2);

        resolver.shutdown().await;
        assert!(!platform.registered.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn new_subscriber_replays_latest_status() {
        let platform = Arc::new(FakePlatform::default());
        let resolver =
            StatusResolver::spawn(platform.clone(), CountingProtector::new(), test_config())
                .unwrap();
        let mut rx = resolver.subscribe();

        let id = NetworkId(1);
        let tap = platform.tap();
        tap.deliver(NetworkEvent::Available { id });
        tap.deliver(NetworkEvent::CapabilitiesChanged {
            id,
            capabilities: not_vpn_caps(),
        });
        tap.deliver(NetworkEvent::LinkPropertiesChanged {
            id,
            properties: link_props(vec![v4_addr()]),
        });
        past_debounce().await;
        // The pipeline has emitted once the first subscriber observes it.
        rx.changed().await.unwrap();

        let mut late = resolver.status_stream();
        assert_eq!(
            late.next().await,
            Some(ConnectivityStatus {
                ipv4: true,
                ipv6: false
            })
        );
        assert_eq!(resolver.current(), ConnectivityStatus {
            ipv4: true,
            ipv6: false
        });

        resolver.shutdown().await;
    }

    #[test]
    fn status_display_names_the_stack() {
        let dual = ConnectivityStatus {
            ipv4: true,
            ipv6: true,
        };
        assert_eq!(dual.to_string(), "dual-stack");
        assert_eq!(ConnectivityStatus::default().to_string(), "offline");
        assert!(dual.any());
        assert!(!ConnectivityStatus::default().any());
    }
}
