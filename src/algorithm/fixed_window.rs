//! Fixed Window rate limiting algorithm (spec §4.3.3).
//!
//! The simplest counter: a window of `window_secs` starting at a multiple of
//! its own length, capped at `limit`. Cheap and predictable, but allows up to
//! `2 * limit` requests across a window boundary (a burst at the tail of one
//! window followed immediately by a burst at the head of the next).

use std::time::Duration;

use crate::algorithm::Algorithm;
use crate::decision::{Decision, DecisionMetadata};
use crate::error::Result;
use crate::policy::Policy;
use crate::storage::{Storage, StorageEntry};

/// Fixed Window rate limiting algorithm.
#[derive(Debug, Clone, Default)]
pub struct FixedWindow;

impl FixedWindow {
    /// Create a new Fixed Window algorithm instance.
    pub fn new() -> Self {
        Self
    }

    fn window_start(now_ms: u64, window_secs: u64) -> u64 {
        let window_ms = window_secs * 1000;
        (now_ms / window_ms) * window_ms
    }

    fn transition(
        prev: Option<(u64, u64)>,
        cost: u64,
        now_ms: u64,
        policy: &Policy,
    ) -> ((u64, u64), Decision) {
        let window_ms = policy.window_secs() * 1000;
        let current_window_start = Self::window_start(now_ms, policy.window_secs());

        let count = match prev {
            Some((count, window_start)) if window_start == current_window_start => count,
            _ => 0,
        };

        let reset_at = (current_window_start + window_ms) / 1000;

        if count + cost <= policy.limit() {
            let new_count = count + cost;
            let remaining = policy.limit() - new_count;
            let decision = Decision::allow(policy.limit(), remaining, reset_at)
                .with_algorithm("fixed_window")
                .with_metadata(DecisionMetadata::new());
            ((new_count, current_window_start), decision)
        } else {
            let retry_after = reset_at - now_ms / 1000 + 1;
            let decision = Decision::deny(policy.limit(), reset_at, retry_after)
                .with_algorithm("fixed_window");
            ((count, current_window_start), decision)
        }
    }
}

impl Algorithm for FixedWindow {
    fn name(&self) -> &'static str {
        "fixed_window"
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
                let prev = entry.map(|e| (e.count, e.window_start));
                let ((count, window_start), decision) =
                    Self::transition(prev, cost, now_ms, policy);
                (StorageEntry::new(count, window_start), decision)
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
        let prev = entry.map(|e| (e.count, e.window_start));
        let (_, decision) = Self::transition(prev, 0, now_ms, policy);
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AlgorithmKind, KeyStrategy};
    use crate::storage::MemoryStore;

    fn policy(limit: u64, window_secs: u64) -> Policy {
        Policy::new(
            "p",
            limit,
            window_secs,
            AlgorithmKind::FixedWindow,
            KeyStrategy::Ip,
        )
    }

    #[tokio::test]
    async fn test_fixed_window_basic() {
        let algorithm = FixedWindow::new();
        let storage = MemoryStore::new();
        let policy = policy(5, 60);

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
    async fn test_fixed_window_resets_on_boundary() {
        let algorithm = FixedWindow::new();
        let storage = MemoryStore::new();
        let policy = policy(1, 1);

        let decision = algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 0)
            .await
            .unwrap();
        assert!(decision.is_allowed());

        let decision = algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 500)
            .await
            .unwrap();
        assert!(decision.is_denied());

        // Next window starts at 1000ms.
        let decision = algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 1000)
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_fixed_window_peek_does_not_consume() {
        let algorithm = FixedWindow::new();
        let storage = MemoryStore::new();
        let policy = policy(5, 60);

        algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 0)
            .await
            .unwrap();

        let peeked = algorithm.check(&storage, "user:1", &policy, 0).await.unwrap();
        assert_eq!(peeked.remaining, 4);

        let peeked_again = algorithm.check(&storage, "user:1", &policy, 0).await.unwrap();
        assert_eq!(peeked_again.remaining, 4);
    }

    #[tokio::test]
    async fn test_fixed_window_literal_scenario() {
        // limit=3/window=10s, requests at t=0,1,2 allow, t=3 deny, t=10 allow.
        let algorithm = FixedWindow::new();
        let storage = MemoryStore::new();
        let policy = policy(3, 10);

        let mut remaining = Vec::new();
        for now_ms in [0, 1_000, 2_000] {
            let decision = algorithm
                .check_and_record(&storage, "user:1", &policy, 1, now_ms)
                .await
                .unwrap();
            assert!(decision.is_allowed());
            remaining.push(decision.remaining);
        }
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 3_000)
            .await
            .unwrap();
        assert!(denied.is_denied());
        assert_eq!(denied.retry_after, Some(8));
        assert_eq!(denied.reset_at, 10);

        let next_window = algorithm
            .check_and_record(&storage, "user:1", &policy, 1, 10_000)
            .await
            .unwrap();
        assert!(next_window.is_allowed());
        assert_eq!(next_window.remaining, 2);
    }
}
