//! Request-admission orchestrator (spec §4.5, component C7).
//!
//! A [`Limiter`] binds one [`Policy`] to a request type `R`: it evaluates
//! exemptions, derives the storage key, dispatches to the policy's algorithm,
//! and emits telemetry. `check` is the only operation — there is no separate
//! "record" step; admission and bookkeeping happen atomically inside the
//! chosen algorithm's `check_and_record`.

use crate::algorithm::{Algorithm, FixedWindow, LeakyBucket, SlidingWindow, TokenBucket};
use crate::clock::{Clock, SystemClock};
use crate::decision::Decision;
use crate::error::{ConfigError, Result};
use crate::key::{ExemptionPolicy, HasIpAddr, HasPath, Key};
use crate::policy::{AlgorithmKind, Policy};
use crate::storage::Storage;
use crate::telemetry::{NoopTelemetry, Telemetry};

/// Binds a [`Policy`] and a key extractor to a storage backend and runs
/// admission checks for incoming requests of type `R`.
pub struct Limiter<R, S, C = SystemClock> {
    policy: Policy,
    key: Box<dyn Key<R>>,
    storage: S,
    clock: C,
    exemptions: ExemptionPolicy,
    telemetry: Box<dyn Telemetry>,
}

impl<R, S, C> Limiter<R, S, C>
where
    R: HasPath + HasIpAddr,
    S: Storage,
    C: Clock,
{
    fn namespaced_key(&self, raw_key: &str) -> String {
        format!(
            "halt:{}:{}:{}",
            self.policy.algorithm().as_str(),
            self.policy.name(),
            raw_key
        )
    }

    /// Run one admission check for `request`.
    ///
    /// 1. Exempt requests (health paths, trusted proxies, configured private
    ///    IP opt-in) return a synthetic allow without touching storage.
    /// 2. The key is derived via the configured extractor; an extractor that
    ///    returns `None` also fails open (synthetic allow) — an unidentifiable
    ///    request cannot be fairly rate limited.
    /// 3-5. The policy's algorithm reads, transitions, and persists state for
    ///    the namespaced key atomically.
    /// 6. Telemetry observes the outcome.
    pub async fn check(&self, request: &R) -> Result<Decision> {
        self.check_with_cost(request, self.policy.cost()).await
    }

    /// Run an admission check charging `cost` units instead of the policy's
    /// default.
    pub async fn check_with_cost(&self, request: &R, cost: u64) -> Result<Decision> {
        let path = request.path();

        self.telemetry.on_check(self.policy.name(), path);

        if self.exemptions.is_exempt(path, request) {
            return Ok(Decision::synthetic_allow(self.policy.limit()));
        }

        let Some(raw_key) = self.key.extract(request) else {
            return Ok(Decision::synthetic_allow(self.policy.limit()));
        };
        let key = self.namespaced_key(&raw_key);
        let now_ms = self.clock.now_ms();

        let decision = self.run_algorithm(&key, cost, now_ms).await?;

        if decision.is_allowed() {
            self.telemetry.on_allowed(self.policy.name(), &key, &decision);
        } else {
            self.telemetry.on_blocked(self.policy.name(), &key, &decision);
        }

        Ok(decision)
    }

    /// Peek at the current state for `request` without consuming capacity.
    pub async fn peek(&self, request: &R) -> Result<Decision> {
        let path = request.path();
        if self.exemptions.is_exempt(path, request) {
            return Ok(Decision::synthetic_allow(self.policy.limit()));
        }
        let Some(raw_key) = self.key.extract(request) else {
            return Ok(Decision::synthetic_allow(self.policy.limit()));
        };
        let key = self.namespaced_key(&raw_key);
        let now_ms = self.clock.now_ms();

        match self.policy.algorithm() {
            AlgorithmKind::TokenBucket => TokenBucket::new().check(&self.storage, &key, &self.policy, now_ms).await,
            AlgorithmKind::LeakyBucket => LeakyBucket::new().check(&self.storage, &key, &self.policy, now_ms).await,
            AlgorithmKind::FixedWindow => FixedWindow::new().check(&self.storage, &key, &self.policy, now_ms).await,
            AlgorithmKind::SlidingWindow => {
                SlidingWindow::new().check(&self.storage, &key, &self.policy, now_ms).await
            }
        }
    }

    /// Reset all state for `request`'s key under this policy.
    pub async fn reset(&self, request: &R) -> Result<()> {
        let Some(raw_key) = self.key.extract(request) else {
            return Ok(());
        };
        let key = self.namespaced_key(&raw_key);
        self.storage.delete(&key).await
    }

    async fn run_algorithm(&self, key: &str, cost: u64, now_ms: u64) -> Result<Decision> {
        match self.policy.algorithm() {
            AlgorithmKind::TokenBucket => {
                TokenBucket::new()
                    .check_and_record(&self.storage, key, &self.policy, cost, now_ms)
                    .await
            }
            AlgorithmKind::LeakyBucket => {
                LeakyBucket::new()
                    .check_and_record(&self.storage, key, &self.policy, cost, now_ms)
                    .await
            }
            AlgorithmKind::FixedWindow => {
                FixedWindow::new()
                    .check_and_record(&self.storage, key, &self.policy, cost, now_ms)
                    .await
            }
            AlgorithmKind::SlidingWindow => {
                SlidingWindow::new()
                    .check_and_record(&self.storage, key, &self.policy, cost, now_ms)
                    .await
            }
        }
    }

    /// The policy this limiter enforces.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}

/// Builder for [`Limiter`], mirroring the teacher's `RateLimitManagerBuilder`
/// idiom. Start one with [`LimiterBuilder::new`].
pub struct LimiterBuilder<R> {
    policy: Option<Policy>,
    key: Option<Box<dyn Key<R>>>,
    exemptions: ExemptionPolicy,
    telemetry: Box<dyn Telemetry>,
}

impl<R> LimiterBuilder<R> {
    /// Create a new, empty builder.
    pub fn new() -> Self {
        Self {
            policy: None,
            key: None,
            exemptions: ExemptionPolicy::default(),
            telemetry: Box::new(NoopTelemetry),
        }
    }

    /// Set the policy this limiter enforces.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the key extractor used to derive the rate-limit key from a request.
    pub fn key(mut self, key: impl Key<R> + 'static) -> Self {
        self.key = Some(Box::new(key));
        self
    }

    /// Override the default exemption policy.
    pub fn exemptions(mut self, exemptions: ExemptionPolicy) -> Self {
        self.exemptions = exemptions;
        self
    }

    /// Attach a telemetry sink (defaults to [`NoopTelemetry`]).
    pub fn telemetry(mut self, telemetry: impl Telemetry + 'static) -> Self {
        self.telemetry = Box::new(telemetry);
        self
    }

    /// Finish building, attaching `storage` and defaulting the clock to
    /// [`SystemClock`].
    pub fn build<S: Storage>(self, storage: S) -> Result<Limiter<R, S, SystemClock>> {
        self.build_with_clock(storage, SystemClock)
    }

    /// Finish building with an explicit clock (tests use [`crate::clock::VirtualClock`]).
    pub fn build_with_clock<S: Storage, C: Clock>(self, storage: S, clock: C) -> Result<Limiter<R, S, C>> {
        let policy = self
            .policy
            .ok_or_else(|| ConfigError::MissingRequired("policy".into()))?;
        let key = self
            .key
            .ok_or_else(|| ConfigError::MissingRequired("key extractor".into()))?;

        Ok(Limiter {
            policy,
            key,
            storage,
            clock,
            exemptions: self.exemptions,
            telemetry: self.telemetry,
        })
    }
}

impl<R> Default for LimiterBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::key::IpKey;
    use crate::policy::KeyStrategy;
    use crate::storage::MemoryStore;
    use std::collections::HashMap;
    use std::net::IpAddr;

    #[derive(Default)]
    struct MockRequest {
        ip: Option<IpAddr>,
        path: String,
        headers: HashMap<String, String>,
    }

    impl HasIpAddr for MockRequest {
        fn client_ip(&self) -> Option<IpAddr> {
            self.ip
        }
    }

    impl HasPath for MockRequest {
        fn path(&self) -> &str {
            &self.path
        }
    }

    impl crate::key::HasHeaders for MockRequest {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name).map(|s| s.as_str())
        }
    }

    fn request(ip: &str, path: &str) -> MockRequest {
        MockRequest {
            ip: Some(ip.parse().unwrap()),
            path: path.to_string(),
            headers: HashMap::new(),
        }
    }

    fn build_limiter(clock: VirtualClock) -> Limiter<MockRequest, MemoryStore, VirtualClock> {
        let policy = Policy::new("test_policy", 2, 60, AlgorithmKind::FixedWindow, KeyStrategy::Ip);
        LimiterBuilder::new()
            .policy(policy)
            .key(IpKey::new())
            .build_with_clock(MemoryStore::new(), clock)
            .unwrap()
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_blocks() {
        let limiter = build_limiter(VirtualClock::new(0));
        let req = request("203.0.113.1", "/api/widgets");

        assert!(limiter.check(&req).await.unwrap().is_allowed());
        assert!(limiter.check(&req).await.unwrap().is_allowed());
        assert!(limiter.check(&req).await.unwrap().is_denied());
    }

    #[tokio::test]
    async fn test_health_path_is_exempt() {
        let limiter = build_limiter(VirtualClock::new(0));
        let req = request("203.0.113.1", "/healthz");

        for _ in 0..10 {
            assert!(limiter.check(&req).await.unwrap().is_allowed());
        }
    }

    #[tokio::test]
    async fn test_different_keys_are_independent() {
        let limiter = build_limiter(VirtualClock::new(0));
        let a = request("203.0.113.1", "/api");
        let b = request("203.0.113.2", "/api");

        assert!(limiter.check(&a).await.unwrap().is_allowed());
        assert!(limiter.check(&a).await.unwrap().is_allowed());
        assert!(limiter.check(&a).await.unwrap().is_denied());

        assert!(limiter.check(&b).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let limiter = build_limiter(VirtualClock::new(0));
        let req = request("203.0.113.1", "/api");

        limiter.check(&req).await.unwrap();
        limiter.check(&req).await.unwrap();
        assert!(limiter.check(&req).await.unwrap().is_denied());

        limiter.reset(&req).await.unwrap();
        assert!(limiter.check(&req).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let limiter = build_limiter(VirtualClock::new(0));
        let req = request("203.0.113.1", "/api");

        limiter.check(&req).await.unwrap();
        let peeked = limiter.peek(&req).await.unwrap();
        assert_eq!(peeked.remaining, 1);
        let peeked_again = limiter.peek(&req).await.unwrap();
        assert_eq!(peeked_again.remaining, 1);
    }

    #[test]
    fn test_builder_requires_policy_and_key() {
        let result = LimiterBuilder::<MockRequest>::new().build(MemoryStore::new());
        assert!(result.is_err());
    }
}
