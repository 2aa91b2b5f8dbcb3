//! Storage entry type for rate limiting state.

use serde::{Deserialize, Serialize};

/// Entry stored in the storage backend.
///
/// Shared shape used by all four normative algorithms; each reads only the
/// fields it needs and is responsible for writing back a fully-formed entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageEntry {
    /// Request count (fixed window) or leak level scaled to whole units.
    pub count: u64,

    /// Window start timestamp (Unix milliseconds). Used by fixed window to
    /// detect a window roll.
    pub window_start: u64,

    /// Fractional level: available tokens (token bucket) or queued units
    /// (leaky bucket).
    pub tokens: Option<f64>,

    /// Last update timestamp (Unix milliseconds): last refill (token bucket),
    /// last leak (leaky bucket), or last write (fixed/sliding window).
    pub last_update: u64,

    /// Sliding window sub-buckets: `(bucket_start_ms, count)`, oldest first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_buckets: Option<Vec<(u64, u64)>>,

    /// Optional metadata (algorithm-specific).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<u8>>,
}

impl StorageEntry {
    /// Create a new storage entry for window-based algorithms.
    pub fn new(count: u64, window_start: u64) -> Self {
        Self {
            count,
            window_start,
            tokens: None,
            last_update: window_start,
            sub_buckets: None,
            metadata: None,
        }
    }

    /// Create a storage entry for token bucket / leaky bucket state.
    pub fn with_tokens(tokens: f64, last_update: u64) -> Self {
        Self {
            count: 0,
            window_start: last_update,
            tokens: Some(tokens),
            last_update,
            sub_buckets: None,
            metadata: None,
        }
    }

    /// Create a storage entry for sliding window sub-buckets.
    pub fn with_sub_buckets(sub_buckets: Vec<(u64, u64)>, now_ms: u64) -> Self {
        let count = sub_buckets.iter().map(|(_, c)| c).sum();
        Self {
            count,
            window_start: now_ms,
            tokens: None,
            last_update: now_ms,
            sub_buckets: Some(sub_buckets),
            metadata: None,
        }
    }

    /// Set the token/level count.
    pub fn set_tokens(mut self, tokens: f64) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Set the last update timestamp.
    pub fn set_last_update(mut self, last_update: u64) -> Self {
        self.last_update = last_update;
        self
    }

    /// Set metadata.
    pub fn set_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Get tokens, defaulting to 0.0 if not set.
    pub fn tokens_or_default(&self) -> f64 {
        self.tokens.unwrap_or(0.0)
    }

    /// Get sub-buckets, defaulting to an empty vector if not set.
    pub fn sub_buckets_or_default(&self) -> &[(u64, u64)] {
        self.sub_buckets.as_deref().unwrap_or(&[])
    }
}
