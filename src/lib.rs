// SPDX-License-Identifier: MIT
//! connwatch — debounced dual-stack connectivity status resolver.
//!
//! Converts raw OS default-network callbacks into a stable
//! `{ipv4, ipv6}` connectivity verdict:
//!
//! - [`source`] wraps platform callbacks into one ordered event channel;
//! - [`state`] folds events into a point-in-time network snapshot;
//! - [`probe`] asks the routing table about the physical network when the
//!   default route is shadowed by a VPN, via protected UDP sockets;
//! - [`resolver`] debounces, resolves, dedupes, and publishes the status
//!   with replay-latest semantics.
//!
//! The platform layer supplies two capabilities:
//! [`source::DefaultNetworkCallbacks`] (registration for default-network
//! change notifications) and [`probe::SocketProtector`] (the VPN tunnel's
//! socket-protect function).
//!
//! ```rust,ignore
//! use connwatch::{ResolverConfig, StatusResolver};
//!
//! let resolver = StatusResolver::spawn(platform_callbacks, protector, ResolverConfig::default())?;
//! let mut status = resolver.subscribe();
//! loop {
//!     status.changed().await?;
//!     println!("connectivity: {}", *status.borrow_and_update());
//! }
//! ```

pub mod config;
pub mod event;
pub mod notify;
pub mod probe;
pub mod resolver;
pub mod source;
pub mod state;
pub mod telemetry;

pub use config::{ConfigError, ResolverConfig};
pub use event::{Capability, LinkProperties, NetworkCapabilities, NetworkEvent, NetworkId};
pub use probe::{SocketProtector, UnderlyingProbe};
pub use resolver::{ConnectivityStatus, StatusResolver};
pub use source::{CallbackToken, DefaultNetworkCallbacks, EventTap, SourceError};
pub use state::RawNetworkState;
