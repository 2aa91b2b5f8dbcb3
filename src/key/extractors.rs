//! Pre-built key extractors for common patterns.
//!
//! These extractors are generic and can work with any request type
//! that provides the necessary data through traits.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::key::Key;

// ============================================================================
// Request Info Traits
// ============================================================================

/// Trait for requests that have an IP address.
pub trait HasIpAddr {
    /// Get the client IP address.
    fn client_ip(&self) -> Option<IpAddr>;
}

/// Trait for requests that have a path.
pub trait HasPath {
    /// Get the request path.
    fn path(&self) -> &str;
}

/// Trait for requests that have a method.
pub trait HasMethod {
    /// Get the request method (GET, POST, etc).
    fn method(&self) -> &str;
}

/// Trait for requests that have headers.
pub trait HasHeaders {
    /// Get a header value by name.
    fn header(&self, name: &str) -> Option<&str>;
}

// ============================================================================
// IP-based Extractors
// ============================================================================

/// Extract key from client IP address.
///
/// A forwarded-for header is only ever consulted when the direct peer
/// address is itself in `trusted_proxies` (spec §4.4) — otherwise any client
/// could spoof its rate-limit key by sending its own `X-Forwarded-For`.
#[derive(Debug, Clone, Default)]
pub struct IpKey {
    /// Header to check for real IP (e.g., X-Forwarded-For).
    real_ip_header: Option<&'static str>,
    /// Direct-peer addresses (single IP or CIDR block) allowed to set the
    /// forwarded-for header.
    trusted_proxies: Vec<IpNet>,
}

impl IpKey {
    /// Create a new IP key extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use X-Forwarded-For header to get real IP behind proxy. The header is
    /// trusted only once at least one proxy is added via [`Self::trust_proxy`].
    pub fn with_forwarded_for() -> Self {
        Self {
            real_ip_header: Some("x-forwarded-for"),
            trusted_proxies: Vec::new(),
        }
    }

    /// Use X-Real-IP header. The header is trusted only once at least one
    /// proxy is added via [`Self::trust_proxy`].
    pub fn with_real_ip() -> Self {
        Self {
            real_ip_header: Some("x-real-ip"),
            trusted_proxies: Vec::new(),
        }
    }

    /// Use a custom header for real IP. The header is trusted only once at
    /// least one proxy is added via [`Self::trust_proxy`].
    pub fn with_header(header: &'static str) -> Self {
        Self {
            real_ip_header: Some(header),
            trusted_proxies: Vec::new(),
        }
    }

    /// Trust a direct-peer address (single IP or CIDR block) to set the
    /// forwarded-for header. Has no effect unless a header is configured via
    /// [`Self::with_forwarded_for`], [`Self::with_real_ip`], or [`Self::with_header`].
    pub fn trust_proxy(mut self, proxy: IpNet) -> Self {
        self.trusted_proxies.push(proxy);
        self
    }
}

impl<R> Key<R> for IpKey
where
    R: HasIpAddr + HasHeaders,
{
    fn extract(&self, request: &R) -> Option<String> {
        let peer = request.client_ip();
        let peer_is_trusted_proxy = peer
            .map(|addr| self.trusted_proxies.iter().any(|net| net.contains(addr)))
            .unwrap_or(false);

        if let Some(header) = self.real_ip_header {
            if peer_is_trusted_proxy {
                if let Some(value) = request.header(header) {
                    // X-Forwarded-For might have multiple IPs, take the first
                    let ip = value.split(',').next()?.trim();
                    if !ip.is_empty() {
                        return Some(format!("ip:{}", ip));
                    }
                }
            }
        }

        // Fall back to direct IP
        peer.map(|ip| format!("ip:{}", ip))
    }

    fn name(&self) -> &'static str {
        "ip"
    }
}

// ============================================================================
// Path-based Extractors
// ============================================================================

/// Extract key from request path.
#[derive(Debug, Clone, Default)]
pub struct PathKey;

impl PathKey {
    /// Create a new path key extractor.
    pub fn new() -> Self {
        Self
    }
}

impl<R: HasPath> Key<R> for PathKey {
    fn extract(&self, request: &R) -> Option<String> {
        Some(format!("path:{}", request.path()))
    }

    fn name(&self) -> &'static str {
        "path"
    }
}

/// Extract key from the first N segments of the path.
#[derive(Debug, Clone)]
pub struct PathPrefixKey {
    segments: usize,
}

impl PathPrefixKey {
    /// Create a path prefix key that uses the first N segments.
    pub fn new(segments: usize) -> Self {
        Self { segments }
    }
}

impl<R: HasPath> Key<R> for PathPrefixKey {
    fn extract(&self, request: &R) -> Option<String> {
        let path = request.path();
        let prefix: String = path
            .split('/')
            .filter(|s| !s.is_empty())
            .take(self.segments)
            .collect::<Vec<_>>()
            .join("/");
        Some(format!("path:/{}", prefix))
    }

    fn name(&self) -> &'static str {
        "path_prefix"
    }
}

// ============================================================================
// Header-based Extractors
// ============================================================================

/// Extract key from a specific header.
#[derive(Debug, Clone)]
pub struct HeaderKey {
    header_name: &'static str,
}

impl HeaderKey {
    /// Create a new header key extractor.
    pub fn new(header_name: &'static str) -> Self {
        Self { header_name }
    }

    /// Extract from Authorization header.
    pub fn authorization() -> Self {
        Self::new("authorization")
    }

    /// Extract from X-API-Key header.
    pub fn api_key() -> Self {
        Self::new("x-api-key")
    }

    /// Extract from User-Agent header.
    pub fn user_agent() -> Self {
        Self::new("user-agent")
    }
}

impl<R: HasHeaders> Key<R> for HeaderKey {
    fn extract(&self, request: &R) -> Option<String> {
        request
            .header(self.header_name)
            .map(|v| format!("header:{}:{}", self.header_name, v))
    }

    fn name(&self) -> &'static str {
        "header"
    }
}

// ============================================================================
// Method-based Extractors
// ============================================================================

/// Extract key from HTTP method.
#[derive(Debug, Clone, Default)]
pub struct MethodKey;

impl MethodKey {
    /// Create a new method key extractor.
    pub fn new() -> Self {
        Self
    }
}

impl<R: HasMethod> Key<R> for MethodKey {
    fn extract(&self, request: &R) -> Option<String> {
        Some(format!("method:{}", request.method()))
    }

    fn name(&self) -> &'static str {
        "method"
    }
}

// ============================================================================
// Route-based Extractors
// ============================================================================

/// Extract key from matched route pattern.
///
/// Unlike `PathKey`, this uses the route pattern (e.g., `/users/{id}`)
/// rather than the actual path (e.g., `/users/123`).
#[derive(Debug, Clone)]
pub struct RouteKey {
    route_pattern: String,
}

impl RouteKey {
    /// Create a new route key with the given pattern.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            route_pattern: pattern.into(),
        }
    }
}

impl<R> Key<R> for RouteKey {
    fn extract(&self, _request: &R) -> Option<String> {
        Some(format!("route:{}", self.route_pattern))
    }

    fn name(&self) -> &'static str {
        "route"
    }
}
