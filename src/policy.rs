//! Declarative rate-limit policy configuration (spec §3, component C2).
//!
//! A [`Policy`] bundles everything the [`crate::limiter::Limiter`] needs to
//! evaluate one rate-limit rule: which algorithm to run, its limit/window/
//! burst/cost, how to derive a key, and which requests are exempt. Policies
//! are immutable once built and are validated at construction — invalid
//! parameters are a configuration error, never a runtime one (spec §7,
//! category 1).

use crate::error::{ConfigError, Result};

/// Which of the four normative algorithms a policy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AlgorithmKind {
    /// Token bucket: controlled bursts with a continuous refill rate.
    TokenBucket,
    /// Leaky bucket: constant drain rate, rejects on overflow.
    LeakyBucket,
    /// Fixed window: simple counter reset on window roll.
    FixedWindow,
    /// Sliding window: discrete sub-buckets summed over a trailing span.
    SlidingWindow,
}

impl AlgorithmKind {
    /// Stable name used in the storage key namespace (`halt:<algorithm>:<key>`)
    /// and in logging/metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenBucket => "token_bucket",
            Self::LeakyBucket => "leaky_bucket",
            Self::FixedWindow => "fixed_window",
            Self::SlidingWindow => "sliding_window",
        }
    }
}

/// How a rate-limit key is derived from a request (spec §4.4).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum KeyStrategy {
    /// Client IP address, honoring a configured trusted-proxy forwarded header.
    Ip,
    /// Application-supplied user identifier.
    User,
    /// `X-API-Key` header, or `Authorization: Bearer <token>`.
    ApiKey,
    /// Concatenation of two or more strategies with a non-ambiguous separator.
    Composite(Vec<KeyStrategy>),
    /// Caller-provided extractor, supplied out-of-band as a `Key<R>` impl.
    Custom,
}

/// A declarative configuration of one rate-limit rule.
///
/// Immutable after construction. Use [`PolicyBuilder`] to build one with
/// validation, or [`Policy::new`] for the common case.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Policy {
    name: String,
    limit: u64,
    window_secs: u64,
    algorithm: AlgorithmKind,
    key_strategy: KeyStrategy,
    burst: u64,
    cost: u64,
    block_duration_secs: Option<u64>,
    exemptions: Vec<String>,
    /// Sub-bucket count for `SlidingWindow`; ignored by other algorithms.
    precision: u64,
}

const DEFAULT_PRECISION: u64 = 10;

impl Policy {
    /// Construct a policy, panicking on invalid parameters.
    ///
    /// Prefer [`PolicyBuilder`] or [`Policy::try_new`] when parameters come
    /// from outside the program.
    pub fn new(
        name: impl Into<String>,
        limit: u64,
        window_secs: u64,
        algorithm: AlgorithmKind,
        key_strategy: KeyStrategy,
    ) -> Self {
        Self::try_new(name, limit, window_secs, algorithm, key_strategy)
            .expect("invalid policy parameters")
    }

    /// Construct a policy, returning a [`ConfigError`] on invalid parameters.
    ///
    /// Validation (grounded in `halt/core/policy.py`'s `__post_init__`):
    /// `limit > 0`, `window_secs > 0`; `burst` defaults to `ceil(limit * 1.2)`
    /// and must be `>= limit`; `cost >= 1`.
    pub fn try_new(
        name: impl Into<String>,
        limit: u64,
        window_secs: u64,
        algorithm: AlgorithmKind,
        key_strategy: KeyStrategy,
    ) -> Result<Self> {
        if limit == 0 {
            return Err(ConfigError::InvalidQuota("limit must be greater than 0".into()).into());
        }
        if window_secs == 0 {
            return Err(ConfigError::InvalidQuota("window must be greater than 0".into()).into());
        }
        let burst = default_burst(limit);
        Ok(Self {
            name: name.into(),
            limit,
            window_secs,
            algorithm,
            key_strategy,
            burst,
            cost: 1,
            block_duration_secs: None,
            exemptions: Vec::new(),
            precision: DEFAULT_PRECISION,
        })
    }

    /// Override the burst size. Must be `>= limit`.
    pub fn with_burst(mut self, burst: u64) -> Result<Self> {
        if burst < self.limit {
            return Err(ConfigError::InvalidQuota(format!(
                "burst ({burst}) must be >= limit ({})",
                self.limit
            ))
            .into());
        }
        self.burst = burst;
        Ok(self)
    }

    /// Override the per-request cost. Must be `>= 1`.
    pub fn with_cost(mut self, cost: u64) -> Result<Self> {
        if cost == 0 {
            return Err(ConfigError::InvalidQuota("cost must be >= 1".into()).into());
        }
        self.cost = cost;
        Ok(self)
    }

    /// Set the block duration applied by callers that escalate denials into
    /// a penalty (not consulted by the algorithms themselves).
    pub fn with_block_duration_secs(mut self, secs: u64) -> Self {
        self.block_duration_secs = Some(secs);
        self
    }

    /// Add an exemption pattern (matched against the request path).
    pub fn with_exemption(mut self, pattern: impl Into<String>) -> Self {
        self.exemptions.push(pattern.into());
        self
    }

    /// Set the sliding-window sub-bucket count. Must be `>= 1`.
    pub fn with_precision(mut self, precision: u64) -> Result<Self> {
        if precision == 0 {
            return Err(ConfigError::InvalidQuota("precision must be >= 1".into()).into());
        }
        self.precision = precision;
        Ok(self)
    }

    /// Policy name, used to namespace the key (`halt:<algorithm>:<policy>:<key>`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective cap for the bucket/window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// The algorithm this policy runs.
    pub fn algorithm(&self) -> AlgorithmKind {
        self.algorithm
    }

    /// The key derivation strategy.
    pub fn key_strategy(&self) -> &KeyStrategy {
        &self.key_strategy
    }

    /// Maximum instantaneous draw for bucket algorithms.
    pub fn burst(&self) -> u64 {
        self.burst
    }

    /// Default per-request cost (a single check may override with an
    /// explicit cost).
    pub fn cost(&self) -> u64 {
        self.cost
    }

    /// Configured block duration, if any.
    pub fn block_duration_secs(&self) -> Option<u64> {
        self.block_duration_secs
    }

    /// Exemption patterns configured directly on this policy.
    pub fn exemptions(&self) -> &[String] {
        &self.exemptions
    }

    /// Sliding-window sub-bucket count.
    pub fn precision(&self) -> u64 {
        self.precision
    }

    /// Token/leak rate in units per second (`limit / window`).
    pub fn rate_per_sec(&self) -> f64 {
        self.limit as f64 / self.window_secs as f64
    }
}

fn default_burst(limit: u64) -> u64 {
    ((limit as f64) * 1.2).ceil() as u64
}

/// Builder for [`Policy`], mirroring the teacher's `QuotaBuilder` idiom.
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    name: Option<String>,
    limit: Option<u64>,
    window_secs: Option<u64>,
    algorithm: Option<AlgorithmKind>,
    key_strategy: Option<KeyStrategy>,
    burst: Option<u64>,
    cost: Option<u64>,
    block_duration_secs: Option<u64>,
    exemptions: Vec<String>,
    precision: Option<u64>,
}

impl PolicyBuilder {
    /// Create a new, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the policy name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the window, in seconds.
    pub fn window_secs(mut self, secs: u64) -> Self {
        self.window_secs = Some(secs);
        self
    }

    /// Set the algorithm.
    pub fn algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Set the key strategy.
    pub fn key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = Some(strategy);
        self
    }

    /// Set the burst size.
    pub fn burst(mut self, burst: u64) -> Self {
        self.burst = Some(burst);
        self
    }

    /// Set the per-request cost.
    pub fn cost(mut self, cost: u64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Set the block duration, in seconds.
    pub fn block_duration_secs(mut self, secs: u64) -> Self {
        self.block_duration_secs = Some(secs);
        self
    }

    /// Add an exemption pattern.
    pub fn exemption(mut self, pattern: impl Into<String>) -> Self {
        self.exemptions.push(pattern.into());
        self
    }

    /// Set the sliding-window precision.
    pub fn precision(mut self, precision: u64) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Build the policy, validating all parameters.
    pub fn build(self) -> Result<Policy> {
        let name = self
            .name
            .ok_or_else(|| ConfigError::MissingRequired("name".into()))?;
        let limit = self
            .limit
            .ok_or_else(|| ConfigError::MissingRequired("limit".into()))?;
        let window_secs = self
            .window_secs
            .ok_or_else(|| ConfigError::MissingRequired("window_secs".into()))?;
        let algorithm = self
            .algorithm
            .ok_or_else(|| ConfigError::MissingRequired("algorithm".into()))?;
        let key_strategy = self
            .key_strategy
            .ok_or_else(|| ConfigError::MissingRequired("key_strategy".into()))?;

        let mut policy = Policy::try_new(name, limit, window_secs, algorithm, key_strategy)?;

        if let Some(burst) = self.burst {
            policy = policy.with_burst(burst)?;
        }
        if let Some(cost) = self.cost {
            policy = policy.with_cost(cost)?;
        }
        if let Some(secs) = self.block_duration_secs {
            policy = policy.with_block_duration_secs(secs);
        }
        if let Some(precision) = self.precision {
            policy = policy.with_precision(precision)?;
        }
        for exemption in self.exemptions {
            policy = policy.with_exemption(exemption);
        }

        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_burst_is_ceil_1_2x_limit() {
        let policy = Policy::new("p", 100, 60, AlgorithmKind::TokenBucket, KeyStrategy::Ip);
        assert_eq!(policy.burst(), 120);

        let policy = Policy::new("p", 5, 10, AlgorithmKind::TokenBucket, KeyStrategy::Ip);
        assert_eq!(policy.burst(), 6); // ceil(5 * 1.2) = 6
    }

    #[test]
    fn rejects_non_positive_limit_or_window() {
        assert!(Policy::try_new("p", 0, 60, AlgorithmKind::TokenBucket, KeyStrategy::Ip).is_err());
        assert!(Policy::try_new("p", 10, 0, AlgorithmKind::TokenBucket, KeyStrategy::Ip).is_err());
    }

    #[test]
    fn rejects_burst_below_limit() {
        let policy = Policy::new("p", 100, 60, AlgorithmKind::TokenBucket, KeyStrategy::Ip);
        assert!(policy.with_burst(50).is_err());
    }

    #[test]
    fn rejects_zero_cost() {
        let policy = Policy::new("p", 100, 60, AlgorithmKind::TokenBucket, KeyStrategy::Ip);
        assert!(policy.with_cost(0).is_err());
    }

    #[test]
    fn builder_validates_like_direct_construction() {
        let policy = PolicyBuilder::new()
            .name("login")
            .limit(5)
            .window_secs(60)
            .algorithm(AlgorithmKind::TokenBucket)
            .key_strategy(KeyStrategy::Ip)
            .burst(10)
            .build()
            .unwrap();

        assert_eq!(policy.name(), "login");
        assert_eq!(policy.burst(), 10);
    }

    #[test]
    fn builder_requires_mandatory_fields() {
        let result = PolicyBuilder::new().name("p").build();
        assert!(result.is_err());
    }
}
