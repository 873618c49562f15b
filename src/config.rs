// SPDX-License-Identifier: MIT
//! Resolver configuration (`connwatch.toml`).
//!
//! Every field has a default; an absent file or an absent key falls back
//! to defaults, so embedding platforms only write a config file to tune
//! something. Probe targets are configuration rather than constants so
//! deployments can point them at addresses appropriate to their network
//! policy.

use crate::probe::{DEFAULT_IPV4_TARGET, DEFAULT_IPV6_TARGET};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Errors from loading or validating a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid probe target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },
}

/// Tunables for a [`crate::resolver::StatusResolver`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Debounce window in milliseconds. Bursty OS callbacks within this
    /// window collapse into one resolution. Default: 300.
    pub debounce_window_ms: u64,
    /// Bounded buffer between the OS callback thread and the pipeline.
    /// Default: 64.
    pub event_buffer: usize,
    /// IPv4 probe target, `ip:port`. The port is a throwaway. Default: `1.1.1.1:1`.
    pub probe_ipv4: String,
    /// IPv6 probe target, `[ip]:port`. Default: `[2606:4700:4700::1111]:1`.
    pub probe_ipv6: String,
    /// Log filter (e.g. `info`, `connwatch=debug`). Default: `info`.
    pub log_level: String,
    /// Log format: `pretty` or `json`. Default: `pretty`.
    pub log_format: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: DEFAULT_DEBOUNCE_MS,
            event_buffer: DEFAULT_EVENT_BUFFER,
            probe_ipv4: DEFAULT_IPV4_TARGET.to_string(),
            probe_ipv6: DEFAULT_IPV6_TARGET.to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ResolverConfig {
    /// Load from a TOML file, validating the probe targets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.probe_ipv4_target()?;
        config.probe_ipv6_target()?;
        Ok(config)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn probe_ipv4_target(&self) -> Result<SocketAddr, ConfigError> {
        parse_target(&self.probe_ipv4, |addr| addr.is_ipv4(), "an IPv4 address")
    }

    pub fn probe_ipv6_target(&self) -> Result<SocketAddr, ConfigError> {
        parse_target(&self.probe_ipv6, |addr| addr.is_ipv6(), "an IPv6 address")
    }
}

fn parse_target(
    target: &str,
    family_ok: impl Fn(&SocketAddr) -> bool,
    expected: &str,
) -> Result<SocketAddr, ConfigError> {
    let addr: SocketAddr = target.parse().map_err(|e| ConfigError::InvalidTarget {
        target: target.to_string(),
        reason: format!("{e}"),
    })?;
    if !family_ok(&addr) {
        return Err(ConfigError::InvalidTarget {
            target: target.to_string(),
            reason: format!("expected {expected}"),
        });
    }
    Ok(addr)
}
