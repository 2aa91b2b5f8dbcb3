//! Request-admission rate limiting core.
//!
//! `halt-core` provides a pluggable rate limiting foundation with:
//!
//! - **Four normative algorithms**: Token Bucket, Leaky Bucket, Fixed Window,
//!   Sliding Window — each a pure state transition over an injected clock.
//! - **Pluggable storage**: a reference in-memory store with background GC;
//!   implement [`storage::Storage`] for a distributed backend.
//! - **Declarative policies**: limit/window/burst/cost/key-strategy, with
//!   validation at construction.
//! - **Calendar-boundary quotas**: hourly/daily/monthly/yearly usage caps,
//!   independent of the per-request algorithms.
//! - **Abuse-score penalties**: progressive rate derating for repeat offenders.
//! - **Observability**: a `Telemetry` trait with logging and metrics sinks.
//!
//! # Quick Start
//!
//! ```ignore
//! use halt_core::{Limiter, LimiterBuilder, MemoryStore, Policy, AlgorithmKind, KeyStrategy};
//! use halt_core::key::IpKey;
//!
//! # async fn example<R: halt_core::key::HasIpAddr + halt_core::key::HasPath + halt_core::key::HasHeaders>(request: &R) {
//! let policy = Policy::new("public_api", 100, 60, AlgorithmKind::TokenBucket, KeyStrategy::Ip)
//!     .with_burst(120)
//!     .unwrap();
//!
//! let limiter = LimiterBuilder::new()
//!     .policy(policy)
//!     .key(IpKey::new())
//!     .build(MemoryStore::new())
//!     .unwrap();
//!
//! let decision = limiter.check(request).await.unwrap();
//! if decision.is_allowed() {
//!     println!("allowed, {} remaining", decision.remaining);
//! } else {
//!     println!("blocked, retry after {:?}s", decision.retry_after);
//! }
//! # }
//! ```
//!
//! # Algorithms
//!
//! | Algorithm | Accuracy | Burst | Best For |
//! |-----------|----------|-------|----------|
//! | Token Bucket | High | Excellent | Bursty traffic |
//! | Leaky Bucket | High | None | Smooth output |
//! | Fixed Window | Low | Poor | Simple counters |
//! | Sliding Window | Medium-High | Good | General purpose |
//!
//! # Feature Flags
//!
//! - `memory` (default): in-memory storage with garbage collection.

pub mod algorithm;
pub mod clock;
pub mod decision;
pub mod error;
pub mod extensions;
pub mod headers;
pub mod key;
pub mod limiter;
pub mod penalty;
pub mod policy;
pub mod presets;
pub mod quota;
pub mod storage;
pub mod telemetry;

// Re-export core types.
pub use algorithm::{Algorithm, FixedWindow, LeakyBucket, SlidingWindow, TokenBucket};
pub use clock::{Clock, SystemClock, VirtualClock};
pub use decision::{Decision, DecisionMetadata};
pub use error::{ConfigError, ConnectionError, RateLimitError, Result, StorageError};
pub use extensions::{RateLimitExt, RateLimitResponse};
pub use headers::RateLimitHeaders;
pub use key::{CompositeKey, FnKey, GlobalKey, Key, StaticKey};
pub use limiter::{Limiter, LimiterBuilder};
pub use penalty::{Penalty, PenaltyConfig, PenaltyManager};
pub use policy::{AlgorithmKind, KeyStrategy, Policy, PolicyBuilder};
pub use quota::{Quota, QuotaManager, QuotaPeriod};
pub use storage::{Storage, StorageEntry};
pub use telemetry::{CompositeTelemetry, LoggingTelemetry, MetricsSink, MetricsTelemetry, NoopTelemetry, Telemetry};

#[cfg(feature = "memory")]
pub use storage::{GcConfig, GcInterval, MemoryStore};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::algorithm::{Algorithm, FixedWindow, LeakyBucket, SlidingWindow, TokenBucket};
    pub use crate::clock::{Clock, SystemClock, VirtualClock};
    pub use crate::decision::Decision;
    pub use crate::error::{RateLimitError, Result};
    pub use crate::limiter::{Limiter, LimiterBuilder};
    pub use crate::policy::{AlgorithmKind, KeyStrategy, Policy};
    pub use crate::quota::{Quota, QuotaManager, QuotaPeriod};
    pub use crate::storage::Storage;

    #[cfg(feature = "memory")]
    pub use crate::storage::{GcConfig, GcInterval, MemoryStore};
}
