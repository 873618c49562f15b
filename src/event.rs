// SPDX-License-Identifier: MIT
//! Typed network-change events and the properties they carry.
//!
//! The platform layer translates raw OS default-network callbacks into
//! [`NetworkEvent`] values and hands them to the event source. Events are
//! consumed exactly once, in delivery order, by the raw state reducer.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Opaque handle identifying an OS network. Comparable only for identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u64);

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "net-{}", self.0)
    }
}

/// Link-layer properties of a network: interface name and assigned addresses.
///
/// For a VPN default network these describe the tunnel interface, not the
/// physical network underneath it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkProperties {
    /// Interface name as reported by the OS (e.g. `wlan0`, `tun0`).
    pub interface_name: Option<String>,
    /// Addresses assigned to the link.
    pub addresses: Vec<IpAddr>,
}

impl LinkProperties {
    /// `true` if any assigned link address is an IPv4 address.
    pub fn has_ipv4(&self) -> bool {
        self.addresses.iter().any(|addr| addr.is_ipv4())
    }

    /// `true` if any assigned link address is an IPv6 address.
    pub fn has_ipv6(&self) -> bool {
        self.addresses.iter().any(|addr| addr.is_ipv6())
    }
}

/// A single network capability flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// The network is not a VPN. Its absence marks a VPN network.
    NotVpn,
    /// The network is expected to provide internet access.
    Internet,
    /// The OS has validated that the network actually reaches the internet.
    Validated,
}

/// Capability set reported by the OS for a network.
///
/// Platforms without a native "not-VPN" capability synthesize it from
/// interface-type inspection before delivering the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCapabilities {
    capabilities: Vec<Capability>,
}

impl NetworkCapabilities {
    pub fn new(capabilities: impl Into<Vec<Capability>>) -> Self {
        Self {
            capabilities: capabilities.into(),
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// A network whose capability set explicitly lacks `NotVpn` is a VPN.
    pub fn is_vpn(&self) -> bool {
        !self.has(Capability::NotVpn)
    }
}

/// Default-network change notification, in the order the OS delivered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NetworkEvent {
    /// A new default network became available. Supersedes any tracked network.
    Available { id: NetworkId },
    /// No default network is available.
    Unavailable,
    /// Link properties of the tracked network changed.
    LinkPropertiesChanged {
        id: NetworkId,
        properties: LinkProperties,
    },
    /// Capability set of the tracked network changed.
    CapabilitiesChanged {
        id: NetworkId,
        capabilities: NetworkCapabilities,
    },
    /// Blocked status of the tracked network changed.
    BlockedStatusChanged { id: NetworkId, blocked: bool },
    /// The network is about to be lost; it stays usable for at most
    /// `max_ms_to_live` milliseconds.
    Losing { id: NetworkId, max_ms_to_live: u64 },
    /// The network was lost.
    Lost { id: NetworkId },
}

impl NetworkEvent {
    /// The network this event refers to, if any.
    pub fn network_id(&self) -> Option<NetworkId> {
        match self {
            NetworkEvent::Available { id }
            | NetworkEvent::LinkPropertiesChanged { id, .. }
            | NetworkEvent::CapabilitiesChanged { id, .. }
            | NetworkEvent::BlockedStatusChanged { id, .. }
            | NetworkEvent::Losing { id, .. }
            | NetworkEvent::Lost { id } => Some(*id),
            NetworkEvent::Unavailable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn link_properties_detect_address_families() {
        let props = LinkProperties {
            interface_name: Some("wlan0".into()),
            addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))],
        };
        assert!(props.has_ipv4());
        assert!(!props.has_ipv6());

        let props = LinkProperties {
            interface_name: None,
            addresses: vec![IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1))],
        };
        assert!(!props.has_ipv4());
        assert!(props.has_ipv6());
    }

    #[test]
    fn missing_not_vpn_capability_marks_vpn() {
        let vpn = NetworkCapabilities::new([Capability::Internet]);
        assert!(vpn.is_vpn());

        let physical = NetworkCapabilities::new([Capability::NotVpn, Capability::Internet]);
        assert!(!physical.is_vpn());

        // An empty capability set also lacks NotVpn.
        assert!(NetworkCapabilities::default().is_vpn());
    }

    #[test]
    fn event_network_id_extraction() {
        let id = NetworkId(7);
        assert_eq!(NetworkEvent::Available { id }.network_id(), Some(id));
        assert_eq!(NetworkEvent::Unavailable.network_id(), None);
        assert_eq!(
            NetworkEvent::Losing {
                id,
                max_ms_to_live: 5000
            }
            .network_id(),
            Some(id)
        );
    }
}
