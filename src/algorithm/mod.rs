//! Rate limiting algorithm trait and implementations.
//!
//! This module defines the `Algorithm` trait and the four normative
//! implementations. Each algorithm exposes a pure `transition` function that
//! takes the previous state, a cost, an explicit `now_ms`, and the governing
//! policy, and returns the next state plus a `Decision` — the clock is never
//! read from inside algorithm code, so the same inputs always produce the
//! same outputs.
//!
//! # Available Algorithms
//!
//! - **Token Bucket**: controlled bursts with a continuous refill rate
//! - **Leaky Bucket**: constant drain rate, rejects on overflow
//! - **Fixed Window**: simple counter reset on window roll
//! - **Sliding Window**: discrete sub-buckets summed over a trailing span

mod fixed_window;
mod leaky_bucket;
mod sliding_window;
mod token_bucket;

pub use fixed_window::FixedWindow;
pub use leaky_bucket::LeakyBucket;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

use std::future::Future;

use crate::decision::Decision;
use crate::error::Result;
use crate::policy::Policy;
use crate::storage::Storage;

/// Rate limiting algorithm trait.
///
/// All four implementations are thread-safe and stateless themselves — all
/// state lives in the `Storage` backend, keyed by the caller.
///
/// | Algorithm | Accuracy | Memory | Burst | Best For |
/// |-----------|----------|--------|-------|----------|
/// | Token Bucket | High | Low | Excellent | Bursty traffic |
/// | Leaky Bucket | High | Low | None | Smooth output |
/// | Fixed Window | Low | Low | Poor | Simple counters |
/// | Sliding Window | Medium-High | Low | Good | General purpose |
pub trait Algorithm: Send + Sync + 'static {
    /// The algorithm name (for logging/metrics and the storage key namespace).
    fn name(&self) -> &'static str;

    /// Check whether `cost` units are admissible at `now_ms` AND record them
    /// atomically if so.
    fn check_and_record<S: Storage>(
        &self,
        storage: &S,
        key: &str,
        policy: &Policy,
        cost: u64,
        now_ms: u64,
    ) -> impl Future<Output = Result<Decision>> + Send;

    /// Check without recording (peek at current state).
    fn check<S: Storage>(
        &self,
        storage: &S,
        key: &str,
        policy: &Policy,
        now_ms: u64,
    ) -> impl Future<Output = Result<Decision>> + Send;

    /// Reset the rate limit for a key.
    fn reset<S: Storage>(&self, storage: &S, key: &str) -> impl Future<Output = Result<()>> + Send {
        async move { storage.delete(key).await }
    }
}
