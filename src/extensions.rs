//! Request extension types for exposing rate limit info to handlers.
//!
//! This is presentation plumbing, not a framework adapter: no axum/actix
//! types are involved, just a plain struct an adapter crate can stash
//! alongside a request and a JSON-serializable summary for API responses.

use crate::decision::Decision;

/// Rate limit information attached to a request after a [`crate::limiter::Limiter`]
/// check, for handlers that want to inspect or forward it.
#[derive(Debug, Clone)]
pub struct RateLimitExt {
    /// The fully-namespaced key this request was checked against.
    pub key: String,
    /// The policy name in effect.
    pub policy: String,
    /// The underlying decision.
    pub decision: Decision,
}

impl RateLimitExt {
    /// Create a new rate limit extension from a decision.
    pub fn new(key: impl Into<String>, policy: impl Into<String>, decision: Decision) -> Self {
        Self {
            key: key.into(),
            policy: policy.into(),
            decision,
        }
    }

    /// Whether the request was allowed.
    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }

    /// Whether the request was denied.
    pub fn is_denied(&self) -> bool {
        self.decision.is_denied()
    }
}

/// JSON-serializable summary of a [`Decision`], suitable for embedding in an
/// API response body.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RateLimitResponse {
    /// Whether the request was allowed.
    pub allowed: bool,
    /// Maximum requests allowed per window.
    pub limit: u64,
    /// Remaining requests in the current window.
    pub remaining: u64,
    /// Epoch seconds when the window resets.
    pub reset_at: u64,
    /// Seconds to wait before retrying, present only when denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&Decision> for RateLimitResponse {
    fn from(decision: &Decision) -> Self {
        Self {
            allowed: decision.allowed,
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
            retry_after: decision.retry_after,
        }
    }
}

impl From<&RateLimitExt> for RateLimitResponse {
    fn from(ext: &RateLimitExt) -> Self {
        Self::from(&ext.decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_ext() {
        let decision = Decision::allow(100, 50, 60);
        let ext = RateLimitExt::new("ip:1.2.3.4", "public_api", decision);

        assert!(ext.is_allowed());
        assert!(!ext.is_denied());
        assert_eq!(ext.decision.remaining, 50);
        assert_eq!(ext.decision.limit, 100);
    }

    #[test]
    fn test_rate_limit_response_serialization() {
        let decision = Decision::deny(100, 30, 30);
        let ext = RateLimitExt::new("ip:1.2.3.4", "public_api", decision);
        let response: RateLimitResponse = (&ext).into();

        assert!(!response.allowed);
        assert_eq!(response.limit, 100);
        assert_eq!(response.remaining, 0);
        assert_eq!(response.retry_after, Some(30));

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("retry_after"));
    }

    #[test]
    fn test_allowed_response_omits_retry_after() {
        let response = RateLimitResponse::from(&Decision::allow(100, 99, 60));
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("retry_after"));
    }
}
