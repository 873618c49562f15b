// SPDX-License-Identifier: MIT
//! Raw network state and the pure event fold that maintains it.
//!
//! The reducer is a pure function of `(previous state, event)`: no side
//! effects, no I/O, no hidden state. The snapshot is an immutable value
//! replaced wholesale on every step; nothing ever patches it in place.
//!
//! The null state is absorbing: once the tracked network is lost, only a
//! fresh `Available` event can create a new snapshot. Patch events for an
//! untracked network are dropped.

use crate::event::{LinkProperties, NetworkCapabilities, NetworkEvent, NetworkId};
use serde::Serialize;

/// Point-in-time snapshot of the current default network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawNetworkState {
    pub network_id: NetworkId,
    pub link_properties: Option<LinkProperties>,
    pub capabilities: Option<NetworkCapabilities>,
    pub blocked_status: bool,
    pub max_ms_to_live: Option<u64>,
}

impl RawNetworkState {
    /// Fresh snapshot for a newly available network, all other fields default.
    pub fn new(network_id: NetworkId) -> Self {
        Self {
            network_id,
            link_properties: None,
            capabilities: None,
            blocked_status: false,
            max_ms_to_live: None,
        }
    }

    /// `true` when the capability set explicitly lacks the not-VPN flag.
    ///
    /// A snapshot without a reported capability set is treated as not-VPN:
    /// link properties are then the best available signal.
    pub fn is_vpn(&self) -> bool {
        self.capabilities
            .as_ref()
            .map(NetworkCapabilities::is_vpn)
            .unwrap_or(false)
    }
}

/// Fold one event into the snapshot.
///
/// Reduction rules:
/// - `Available(id)` replaces any prior state unconditionally; a new default
///   network supersedes the old even if the old network's `Lost` never
///   arrived.
/// - `Lost` / `Unavailable` reset the state to `None` unconditionally.
/// - All other events patch their field when the tracked network matches,
///   and are dropped otherwise.
pub fn reduce(state: Option<RawNetworkState>, event: NetworkEvent) -> Option<RawNetworkState> {
    match event {
        NetworkEvent::Available { id } => Some(RawNetworkState::new(id)),
        NetworkEvent::Unavailable | NetworkEvent::Lost { .. } => None,
        NetworkEvent::LinkPropertiesChanged { id, properties } => {
            patch(state, id, |prev| RawNetworkState {
                link_properties: Some(properties),
                ..prev
            })
        }
        NetworkEvent::CapabilitiesChanged { id, capabilities } => {
            patch(state, id, |prev| RawNetworkState {
                capabilities: Some(capabilities),
                ..prev
            })
        }
        NetworkEvent::BlockedStatusChanged { id, blocked } => {
            patch(state, id, |prev| RawNetworkState {
                blocked_status: blocked,
                ..prev
            })
        }
        NetworkEvent::Losing { id, max_ms_to_live } => patch(state, id, |prev| RawNetworkState {
            max_ms_to_live: Some(max_ms_to_live),
            ..prev
        }),
    }
}

/// Apply `f` when `id` matches the tracked network; drop the event otherwise.
fn patch(
    state: Option<RawNetworkState>,
    id: NetworkId,
    f: impl FnOnce(RawNetworkState) -> RawNetworkState,
) -> Option<RawNetworkState> {
    match state {
        Some(prev) if prev.network_id == id => Some(f(prev)),
        other => other,
    }
}

/// Fold a whole event sequence from an initial state.
pub fn reduce_all<I>(state: Option<RawNetworkState>, events: I) -> Option<RawNetworkState>
where
    I: IntoIterator<Item = NetworkEvent>,
{
    events.into_iter().fold(state, reduce)
}
