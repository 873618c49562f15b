// SPDX-License-Identifier: MIT
//! Underlying connectivity probe.
//!
//! When the default network is a VPN, the snapshot's link properties
//! describe the tunnel interface and say nothing about the physical
//! network underneath. The probe answers the real question by opening a
//! protected UDP socket per IP version and calling `connect()` on it
//! against a fixed public address. No packet is sent: UDP connect only
//! resolves a local route, so this is a routing-table query disguised as
//! a connection attempt, not a reachability test of the remote host.

use crate::resolver::ConnectivityStatus;
use once_cell::sync::Lazy;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use tracing::{debug, warn};

/// Public anycast addresses on a throwaway port. The port never matters;
/// connect() succeeds or fails on route resolution alone.
pub static DEFAULT_IPV4_TARGET: Lazy<SocketAddr> = Lazy::new(|| "1.1.1.1:1".parse().expect("valid IPv4 target"));
pub static DEFAULT_IPV6_TARGET: Lazy<SocketAddr> =
    Lazy::new(|| "[2606:4700:4700::1111]:1".parse().expect("valid IPv6 target"));

/// Injected capability that re-routes a socket outside the VPN tunnel.
///
/// Supplied by the active VPN tunnel implementation (e.g. the platform's
/// `VpnService.protect`). Returns `false` when protection could not be
/// applied; the probe proceeds anyway and logs the condition.
pub trait SocketProtector: Send + Sync {
    fn protect(&self, socket: &UdpSocket) -> bool;
}

/// Blanket impl so closures can serve as protectors in wiring and tests.
impl<F> SocketProtector for F
where
    F: Fn(&UdpSocket) -> bool + Send + Sync,
{
    fn protect(&self, socket: &UdpSocket) -> bool {
        self(socket)
    }
}

/// Dual-stack reachability probe over protected UDP sockets.
#[derive(Clone)]
pub struct UnderlyingProbe {
    protector: Arc<dyn SocketProtector>,
    ipv4_target: SocketAddr,
    ipv6_target: SocketAddr,
}

impl UnderlyingProbe {
    pub fn new(protector: Arc<dyn SocketProtector>) -> Self {
        Self {
            protector,
            ipv4_target: *DEFAULT_IPV4_TARGET,
            ipv6_target: *DEFAULT_IPV6_TARGET,
        }
    }

    /// Override the probe targets (config-driven).
    pub fn with_targets(mut self, ipv4: SocketAddr, ipv6: SocketAddr) -> Self {
        self.ipv4_target = ipv4;
        self.ipv6_target = ipv6;
        self
    }

    /// Probe both IP versions, blocking on two socket operations.
    ///
    /// Each version fails independently; an error on one side never aborts
    /// the other. There is no retry here, callers re-invoke the probe per
    /// resolution cycle.
    pub fn probe(&self) -> ConnectivityStatus {
        ConnectivityStatus {
            ipv4: self.probe_target("0.0.0.0:0", self.ipv4_target),
            ipv6: self.probe_target("[::]:0", self.ipv6_target),
        }
    }

    /// Run the blocking probe on the blocking pool.
    ///
    /// A join failure degrades to `{false, false}` rather than propagating;
    /// the status stream never errors.
    pub async fn check(&self) -> ConnectivityStatus {
        let probe = self.clone();
        match tokio::task::spawn_blocking(move || probe.probe()).await {
            Ok(status) => status,
            Err(e) => {
                warn!(err = %e, "underlying probe task failed");
                ConnectivityStatus::default()
            }
        }
    }

    /// `true` iff a route to `target` exists on the underlying network.
    ///
    /// The socket is dropped unconditionally on every path out of here.
    fn probe_target(&self, bind_addr: &str, target: SocketAddr) -> bool {
        let socket = match UdpSocket::bind(bind_addr) {
            Ok(socket) => socket,
            Err(e) => {
                debug!(target = %target, err = %e, "probe socket bind failed");
                return false;
            }
        };

        if !self.protector.protect(&socket) {
            // Informative only while a VPN is active: an unprotected socket
            // would be routed through the tunnel and answer the wrong
            // question.
            warn!(target = %target, "socket protection failed, probing anyway");
        }

        match socket.connect(target) {
            Ok(()) => {
                debug!(target = %target, "underlying route present");
                true
            }
            Err(e) => {
                debug!(target = %target, err = %e, "no underlying route");
                false
            }
        }
    }
}
