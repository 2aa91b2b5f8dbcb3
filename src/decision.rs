//! Decision types for rate limiting results.
//!
//! A [`Decision`] is the immutable, read-only outcome of a single check: a
//! bare `allow`/`deny` flag plus the quantitative metadata a caller renders
//! into response headers. Decisions never carry store state — that lives in
//! the algorithm's persisted entry — and are cheap to construct and clone.

use serde::{Deserialize, Serialize};

use crate::headers::{names, RateLimitHeaders};

/// The result of a rate limit check.
///
/// Invariants (spec §3): `remaining + consumed_now <= limit`; `reset_at >= now`;
/// on deny, `retry_after >= 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the request is allowed.
    pub allowed: bool,
    /// Effective cap for the bucket/window.
    pub limit: u64,
    /// Remaining capacity. Zero on deny.
    pub remaining: u64,
    /// Wall-clock epoch seconds when the bucket/window is fully available again.
    pub reset_at: u64,
    /// Seconds a caller should wait before retrying. Set iff `allowed == false`.
    pub retry_after: Option<u64>,
    /// Name of the algorithm that produced this decision, for logging/metrics.
    pub algorithm: Option<&'static str>,
    /// Additional algorithm-specific detail.
    pub metadata: Option<DecisionMetadata>,
}

impl Decision {
    /// Build an allow decision.
    pub fn allow(limit: u64, remaining: u64, reset_at: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_at,
            retry_after: None,
            algorithm: None,
            metadata: None,
        }
    }

    /// Build a deny decision. `retry_after` must be >= 1 per spec invariant.
    pub fn deny(limit: u64, reset_at: u64, retry_after: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at,
            retry_after: Some(retry_after.max(1)),
            algorithm: None,
            metadata: None,
        }
    }

    /// A synthetic always-allow decision used for exemptions and unidentified
    /// requests that the policy chooses to pass through.
    pub fn synthetic_allow(limit: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            reset_at: 0,
            retry_after: None,
            algorithm: None,
            metadata: None,
        }
    }

    /// Attach the algorithm name.
    pub fn with_algorithm(mut self, name: &'static str) -> Self {
        self.algorithm = Some(name);
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: DecisionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether the request is allowed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Whether the request is denied.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// Render the normative response headers (spec §6).
    ///
    /// Always includes `RateLimit-Limit`/`RateLimit-Remaining`/`RateLimit-Reset`;
    /// adds `Retry-After` on deny.
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        RateLimitHeaders::from(self).to_vec()
    }

    /// The normative 429 JSON body (spec §6), when denied.
    pub fn blocked_body_json(&self) -> Option<serde_json::Value> {
        if self.allowed {
            return None;
        }
        Some(serde_json::json!({
            "error": "rate_limit_exceeded",
            "message": "Too many requests. Please try again later.",
            "retry_after": self.retry_after.unwrap_or(1),
        }))
    }
}

impl From<&Decision> for RateLimitHeaders {
    fn from(decision: &Decision) -> Self {
        let mut headers = RateLimitHeaders::new()
            .limit(decision.limit)
            .remaining(decision.remaining)
            .reset(decision.reset_at);

        if let Some(retry_after) = decision.retry_after {
            headers = headers.retry_after(retry_after);
        }

        headers
    }
}

/// Extra detail about how a [`Decision`] was reached, algorithm-specific.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    /// The fully-qualified key that was rate limited.
    pub key: Option<String>,
    /// The policy name in effect.
    pub policy: Option<String>,
    /// Tokens/level consumed by this check (bucket algorithms).
    pub tokens_consumed: Option<f64>,
    /// Tokens/level remaining after this check (bucket algorithms).
    pub tokens_available: Option<f64>,
}

impl DecisionMetadata {
    /// Create new empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the policy name.
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    /// Set tokens consumed.
    pub fn with_tokens_consumed(mut self, tokens: f64) -> Self {
        self.tokens_consumed = Some(tokens);
        self
    }

    /// Set tokens available.
    pub fn with_tokens_available(mut self, tokens: f64) -> Self {
        self.tokens_available = Some(tokens);
        self
    }
}

// Keep the header-name constants reachable from here for doc examples.
#[allow(unused_imports)]
use names as _header_names;
