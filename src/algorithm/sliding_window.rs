//! Sliding Window rate limiting algorithm (spec §4.3.4).
//!
//! The window is divided into `precision` discrete sub-buckets; a check sums
//! the counts of every sub-bucket whose start falls within the trailing
//! `window_secs` span. This avoids both the boundary-burst problem of fixed
//! window and the unbounded memory of a full sliding log, at the cost of
//! `precision` granularity in where the window "actually" starts.

use std::time::Duration;

use crate::algorithm::Algorithm;
use crate::decision::{Decision, DecisionMetadata};
use crate::error::Result;
use crate::policy::Policy;
use crate::storage::{Storage, StorageEntry};

/// Sliding Window rate limiting algorithm.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow;

impl SlidingWindow {
    /// Create a new Sliding Window algorithm instance.
    pub fn new() -> Self {
        Self
    }

    fn bucket_width_ms(policy: &Policy) -> u64 {
        (policy.window_secs() * 1000 / policy.precision()).max(1)
    }

    fn bucket_start(now_ms: u64, bucket_width_ms: u64) -> u64 {
        (now_ms / bucket_width_ms) * bucket_width_ms
    }

    /// Drop sub-buckets that have fully aged out of the trailing window.
    fn prune(buckets: &[(u64, u64)], now_ms: u64, window_ms: u64) -> Vec<(u64, u64)> {
        let cutoff = now_ms.saturating_sub(window_ms);
        buckets
            .iter()
            .copied()
            .filter(|(start, _)| *start >= cutoff)
            .collect()
    }

    fn transition(
        prev: &[(u64, u64)],
        cost: u64,
        now_ms: u64,
        policy: &Policy,
    ) -> (Vec<(u64, u64)>, Decision) {
        let window_ms = policy.window_secs() * 1000;
        let bucket_width_ms = Self::bucket_width_ms(policy);
        let bucket_size_secs = policy.window_secs() as f64 / policy.precision() as f64;
        let current_bucket_start = Self::bucket_start(now_ms, bucket_width_ms);
        let current_bucket_index = current_bucket_start / bucket_width_ms;

        let mut buckets = Self::prune(prev, now_ms, window_ms);
        let total: u64 = buckets.iter().map(|(_, c)| c).sum();

        // The oldest bucket still in the window anchors when the limit starts
        // to free up: reset_at is (oldest_bucket_index + precision + 1) bucket
        // widths from the epoch (spec §4.3.4; original_source
        // halt/algorithms/sliding_window.py:62-64).
        let oldest_index = buckets
            .first()
            .map(|(s, _)| *s / bucket_width_ms)
            .unwrap_or(current_bucket_index);
        let reset_at = ((oldest_index + policy.precision() + 1) as f64 * bucket_size_secs).ceil() as u64;

        if total + cost <= policy.limit() {
            match buckets.iter_mut().find(|(s, _)| *s == current_bucket_start) {
                Some((_, count)) => *count += cost,
                None => buckets.push((current_bucket_start, cost)),
            }
            buckets.sort_unstable_by_key(|(start, _)| *start);

            let remaining = policy.limit() - (total + cost);
            let decision = Decision::allow(policy.limit(), remaining, reset_at)
                .with_algorithm("sliding_window")
                .with_metadata(DecisionMetadata::new());
            (buckets, decision)
        } else {
            // retry_after is constant: one bucket width, regardless of now
            // (original_source halt/algorithms/sliding_window.py:83).
            let retry_after = bucket_size_secs.ceil() as u64 + 1;
            let decision =
                Decision::deny(policy.limit(), reset_at, retry_after).with_algorithm("sliding_window");
            (buckets, decision)
        }
    }
}

impl Algorithm for SlidingWindow {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    async fn check_and_record<S: Storage>(
        &self,
        storage: &S,
        key: &str,
        policy: &Policy,
        cost: u64,
        now_ms: u64,
    ) -> Result<Decision> {
        let ttl = Duration::from_secs(policy.window_secs() * 2);
        storage
            .execute_atomic(key, ttl, |entry| {
                let prev = entry.map(|e| e.sub_buckets.unwrap_or_default()).unwrap_or_default();
                let (buckets, decision) = Self::transition(&prev, cost, now_ms, policy);
                (StorageEntry::with_sub_buckets(buckets, now_ms), decision)
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
        let prev = entry.map(|e| e.sub_buckets.unwrap_or_default()).unwrap_or_default();
        let (_, decision) = Self::transition(&prev, 0, now_ms, policy);
        Ok(decision)
    }
}
