//! Exemption checks: requests that skip rate limiting entirely (spec §4.4).
//!
//! An `ExemptionPolicy` is consulted by the [`crate::limiter::Limiter`] before
//! key derivation. Exempt requests never touch storage and always receive a
//! synthetic allow decision.

use std::net::IpAddr;

use crate::key::HasIpAddr;

/// Default health-check paths skipped by [`ExemptionPolicy::default`].
pub const DEFAULT_HEALTH_PATHS: &[&str] = &["/health", "/healthz", "/ping", "/ready", "/livez"];

/// Decides whether a request is exempt from rate limiting.
///
/// Three checks are applied, any one of which exempts the request:
/// health-check paths, private/loopback source addresses, and an explicit
/// trusted-proxy allow-list.
#[derive(Debug, Clone)]
pub struct ExemptionPolicy {
    health_paths: Vec<String>,
    trusted_proxies: Vec<IpAddr>,
    exempt_private_ips: bool,
}

impl Default for ExemptionPolicy {
    fn default() -> Self {
        Self {
            health_paths: DEFAULT_HEALTH_PATHS.iter().map(|s| s.to_string()).collect(),
            trusted_proxies: Vec::new(),
            exempt_private_ips: false,
        }
    }
}

impl ExemptionPolicy {
    /// Create a policy with only the default health-check paths exempt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of exempt health-check paths.
    pub fn with_health_paths(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.health_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Add a policy-specific exemption pattern on top of the health-check set.
    pub fn with_exempt_path(mut self, path: impl Into<String>) -> Self {
        self.health_paths.push(path.into());
        self
    }

    /// Treat requests from a given address (e.g. a known internal load
    /// balancer) as exempt.
    pub fn with_trusted_proxy(mut self, addr: IpAddr) -> Self {
        self.trusted_proxies.push(addr);
        self
    }

    /// Exempt RFC 1918 / loopback / link-local source addresses (typically
    /// internal service-to-service traffic that never crosses a real edge).
    pub fn exempt_private_ips(mut self) -> Self {
        self.exempt_private_ips = true;
        self
    }

    /// Whether `path` matches one of the configured exempt paths.
    pub fn is_exempt_path(&self, path: &str) -> bool {
        self.health_paths.iter().any(|p| p == path)
    }

    /// Whether `addr` is exempt (a trusted proxy, or a private/loopback
    /// address when that check is enabled).
    pub fn is_exempt_addr(&self, addr: IpAddr) -> bool {
        if self.trusted_proxies.contains(&addr) {
            return true;
        }
        self.exempt_private_ips && is_private_or_loopback(addr)
    }

    /// Run both checks against a request that exposes a path and an IP.
    pub fn is_exempt<R: HasIpAddr>(&self, path: &str, request: &R) -> bool {
        if self.is_exempt_path(path) {
            return true;
        }
        match request.client_ip() {
            Some(addr) => self.is_exempt_addr(addr),
            None => false,
        }
    }
}

fn is_private_or_loopback(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}
