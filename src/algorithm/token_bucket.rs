//! Token Bucket rate limiting algorithm (spec §4.3.1).

use std::time::Duration;

use crate::algorithm::Algorithm;
use crate::decision::{Decision, DecisionMetadata};
use crate::error::Result;
use crate::policy::Policy;
use crate::storage::{Storage, StorageEntry};

/// Token Bucket rate limiting algorithm.
///
/// Allows controlled bursts while enforcing an average rate limit. Tokens
/// refill continuously at `limit / window` tokens per second, capped at
/// `burst`. A rejected request does not advance `last_refill` — only a
/// successful refill-then-consume cycle writes back state, so the bucket
/// keeps accruing tokens between denied requests instead of freezing.
#[derive(Debug, Clone, Default)]
pub struct TokenBucket;

impl TokenBucket {
    /// Create a new Token Bucket algorithm instance.
    pub fn new() -> Self {
        Self
    }

    fn refill(elapsed_ms: u64, rate_per_sec: f64) -> f64 {
        (elapsed_ms as f64 / 1000.0) * rate_per_sec
    }

    /// Pure state transition: given the previous `(tokens, last_refill)` (or
    /// none, meaning a full bucket), `cost`, `now_ms`, and the policy, return
    /// the new state and the resulting decision.
    fn transition(
        prev: Option<(f64, u64)>,
        cost: u64,
        now_ms: u64,
        policy: &Policy,
    ) -> ((f64, u64), Decision) {
        let max_tokens = policy.burst() as f64;
        let rate = policy.rate_per_sec();
        let cost = cost as f64;

        let (tokens, last_refill) = prev.unwrap_or((max_tokens, now_ms));
        let elapsed = now_ms.saturating_sub(last_refill);
        let refilled = (tokens + Self::refill(elapsed, rate)).min(max_tokens);

        if refilled >= cost {
            let remaining = refilled - cost;
            let remaining_floor = remaining.floor() as u64;
            let time_to_full_ms = if remaining < max_tokens {
                (((max_tokens - remaining) / rate) * 1000.0) as u64
            } else {
                0
            };
            let reset_at = (now_ms + time_to_full_ms) / 1000;

            let decision = Decision::allow(policy.burst(), remaining_floor, reset_at)
                .with_algorithm("token_bucket")
                .with_metadata(DecisionMetadata::new().with_tokens_available(remaining));

            ((remaining, now_ms), decision)
        } else {
            let deficit = cost - refilled;
            let retry_after = (deficit / rate).ceil() as u64 + 1;
            let reset_at = now_ms / 1000 + retry_after;

            let decision = Decision::deny(policy.burst(), reset_at, retry_after)
                .with_algorithm("token_bucket")
                .with_metadata(DecisionMetadata::new().with_tokens_available(refilled));

            // Rejection does not advance last_refill: refill is linear in
            // elapsed time, so leaving the original (tokens, last_refill) in
            // place and recomputing from it next time yields the same result
            // without an extra write on every throttled request.
            ((tokens, last_refill), decision)
        }
    }

    fn ttl_for(policy: &Policy) -> Duration {
        let ttl_secs = ((policy.burst() as f64 / policy.rate_per_sec()) * 2.0).ceil() as u64;
        Duration::from_secs(ttl_secs.max(1))
    }
}

impl Algorithm for TokenBucket {
    fn name(&self) -> &'static str {
        "token_bucket"
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
                let ((tokens, last_refill), decision) =
                    Self::transition(prev, cost, now_ms, policy);
                (StorageEntry::with_tokens(tokens, last_refill), decision)
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
