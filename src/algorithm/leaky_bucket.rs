//! Leaky Bucket rate limiting algorithm (spec §4.3.2).
//!
//! The bucket level drains at a constant rate; a request that would make the
//! level exceed `burst` is rejected. Unlike token bucket, a denied request
//! still advances `last_leak` — the drain is real wall-clock work that
//! happened regardless of whether this particular request was admitted.

use std::time::Duration;

use crate::algorithm::Algorithm;
use crate::decision::{Decision, DecisionMetadata};
use crate::error::Result;
use crate::policy::Policy;
use crate::storage::{Storage, StorageEntry};

/// Leaky Bucket rate limiting algorithm.
#[derive(Debug, Clone, Default)]
pub struct LeakyBucket;

impl LeakyBucket {
    /// Create a new Leaky Bucket algorithm instance.
    pub fn new() -> Self {
        Self
    }

    fn drain(elapsed_ms: u64, rate_per_sec: f64) -> f64 {
        (elapsed_ms as f64 / 1000.0) * rate_per_sec
    }

    fn transition(
        prev: Option<(f64, u64)>,
        cost: u64,
        now_ms: u64,
        policy: &Policy,
    ) -> ((f64, u64), Decision) {
        let max_level = policy.burst() as f64;
        let rate = policy.rate_per_sec();
        let cost = cost as f64;

        let (level, last_leak) = prev.unwrap_or((0.0, now_ms));
        let elapsed = now_ms.saturating_sub(last_leak);
        let drained = (level - Self::drain(elapsed, rate)).max(0.0);

        if drained + cost <= max_level {
            let new_level = drained + cost;
            let remaining = (max_level - new_level).floor() as u64;
            let drain_time_ms = ((new_level / rate) * 1000.0) as u64;
            let reset_at = (now_ms + drain_time_ms) / 1000;

            let decision = Decision::allow(policy.burst(), remaining, reset_at)
                .with_algorithm("leaky_bucket")
                .with_metadata(DecisionMetadata::new().with_tokens_available(max_level - new_level));

            ((new_level, now_ms), decision)
        } else {
            let overflow = drained + cost - max_level;
            let retry_after = (overflow / rate).ceil() as u64 + 1;
            let reset_at = now_ms / 1000 + retry_after;

            let decision = Decision::deny(policy.burst(), reset_at, retry_after)
                .with_algorithm("leaky_bucket")
                .with_metadata(DecisionMetadata::new().with_tokens_available(max_level - drained));

            ((drained, now_ms), decision)
        }
    }

    fn ttl_for(policy: &Policy) -> Duration {
        let ttl_secs = ((policy.burst() as f64 / policy.rate_per_sec()) * 2.0).ceil() as u64;
        Duration::from_secs(ttl_secs.max(1))
    }
}

impl Algorithm for LeakyBucket {
    fn name(&self) -> &'static str {
        "leaky_bucket"
    }

    async fn check_and_record<S: Storage>(
        &self,
        storage: &S,
        key: &str,
        policy: &Policy,
        cost: u64,
        now_ms: u64,
    ) -> Result<Decision> {
        let ttl = Self::ttl_for(policy);
        storage
            .execute_atomic(key, ttl, |entry| {
                let prev = entry.map(|e| (e.tokens_or_default(), e.last_update));
                let ((level, last_leak), decision) = Self::transition(prev, cost, now_ms, policy);
                (StorageEntry::with_tokens(level, last_leak), decision)
            })
            .await
    }

    async fn check<S: Storage>(
        &self,
        storage: &S,
        key: &str,
        policy: &Policy,
        now_ms: u64,
    ) -> Result<Decision> {
        let entry = storage.get(key).await?;
        let prev = entry.map(|e| (e.tokens_or_default(), e.last_update));
        let (_, decision) = Self::transition(prev, 0, now_ms, policy);
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AlgorithmKind, KeyStrategy};
    use crate::storage::MemoryStore;

    fn policy(limit: u64, window_secs: u64, burst: u64) -> Policy {
        Policy::new(
            "p",
            limit,
            window_secs,
            AlgorithmKind::LeakyBucket,
            KeyStrategy::Ip,
        )
        .with_burst(burst)
        .unwrap()
    }

    #[tokio::test]
    async fn test_leaky_bucket_basic() {
        let algorithm = LeakyBucket::new();
        let storage = MemoryStore::new();
        let policy = policy(10, 1, 5);

        for i in 1..=5 {
            let decision = algorithm
                .check_and_record(&storage, "user:1", &policy, 1, 0)
                .await
                .unwrap();
            assert!(decision.is_allowed(), "Request {} should be allowed", i);
        }

        let decision = algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 0)
            .await
            .unwrap();
        assert!(decision.is_denied());
    }

    #[tokio::test]
    async fn test_leaky_bucket_drain_over_time() {
        let algorithm = LeakyBucket::new();
        let storage = MemoryStore::new();
        let policy = policy(10, 1, 2);

        algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 0)
            .await
            .unwrap();
        algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 0)
            .await
            .unwrap();

        let decision = algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 0)
            .await
            .unwrap();
        assert!(decision.is_denied());

        let decision = algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 150)
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_leaky_bucket_denial_still_advances_last_leak() {
        let algorithm = LeakyBucket::new();
        let storage = MemoryStore::new();
        let policy = policy(10, 1, 1);

        algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 0)
            .await
            .unwrap();

        // Denied at t=50ms; drained level should still reflect the 50ms of leak.
        algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 50)
            .await
            .unwrap();

        let decision = algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 100)
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_leaky_bucket_literal_scenario() {
        // capacity=15, limit=10/window=60s (leak rate 1/6 per second).
        let algorithm = LeakyBucket::new();
        let storage = MemoryStore::new();
        let policy = policy(10, 60, 15);

        for i in 1..=12 {
            let decision = algorithm
                .check_and_record(&storage, "user:1", &policy, 1, 0)
                .await
                .unwrap();
            assert!(decision.is_allowed(), "request {i} should be allowed");
        }

        // space_needed = (12 + 4) - 15 = 1; retry_after = ceil(1 / (1/6)) + 1 = 7.
        let overflow = algorithm
            .check_and_record(&storage, "user:1", &policy, 4, 0)
            .await
            .unwrap();
        assert!(overflow.is_denied());
        assert_eq!(overflow.retry_after, Some(7));
    }
}
