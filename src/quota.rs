//! Calendar-boundary quota accounting (spec §4.8, component C8).
//!
//! Unlike the rolling windows the four algorithms enforce, a [`Quota`] resets
//! on a *calendar* boundary — the start of the next UTC hour, day, month, or
//! year — which is how billing-style "N calls per month" limits are usually
//! described. [`QuotaManager`] persists the running count under its own key
//! namespace (`halt:quota:<name>:<identifier>`), independent of whatever
//! per-request algorithm a [`crate::limiter::Limiter`] also enforces.

use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::decision::Decision;
use crate::error::{ConfigError, Result};
use crate::storage::{Storage, StorageEntry};

/// The calendar period a [`Quota`] resets on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaPeriod {
    /// Resets at the start of the next UTC hour.
    Hourly,
    /// Resets at the start of the next UTC day.
    Daily,
    /// Resets at the start of the next UTC month.
    Monthly,
    /// Resets at the start of the next UTC year.
    Yearly,
}

impl QuotaPeriod {
    /// Compute `(window_start_ms, reset_at_ms)` for the period containing `now_ms`.
    fn boundaries(&self, now_ms: u64) -> (u64, u64) {
        let now: DateTime<Utc> = Utc.timestamp_millis_opt(now_ms as i64).single().unwrap_or_else(Utc::now);

        let (start, end) = match self {
            QuotaPeriod::Hourly => {
                let start = now
                    .date_naive()
                    .and_hms_opt(now.hour(), 0, 0)
                    .unwrap()
                    .and_utc();
                (start, start + chrono::Duration::hours(1))
            }
            QuotaPeriod::Daily => {
                let start = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
                (start, start + chrono::Duration::days(1))
            }
            QuotaPeriod::Monthly => {
                let (year, month) = (now.year(), now.month());
                let start = Utc
                    .with_ymd_and_hms(year, month, 1, 0, 0, 0)
                    .single()
                    .unwrap();
                let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
                let end = Utc
                    .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
                    .single()
                    .unwrap();
                (start, end)
            }
            QuotaPeriod::Yearly => {
                let year = now.year();
                let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single().unwrap();
                let end = Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single().unwrap();
                (start, end)
            }
        };

        (start.timestamp_millis() as u64, end.timestamp_millis() as u64)
    }
}

/// A calendar-boundary quota: a cap on total usage per hour/day/month/year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    name: String,
    period: QuotaPeriod,
    limit: u64,
}

impl Quota {
    /// Create a new quota, returning an error if `limit` is zero.
    pub fn try_new(name: impl Into<String>, period: QuotaPeriod, limit: u64) -> Result<Self> {
        if limit == 0 {
            return Err(ConfigError::InvalidQuota("limit must be greater than 0".into()).into());
        }
        Ok(Self {
            name: name.into(),
            period,
            limit,
        })
    }

    /// Create a new quota, panicking if `limit` is zero.
    pub fn new(name: impl Into<String>, period: QuotaPeriod, limit: u64) -> Self {
        Self::try_new(name, period, limit).expect("invalid quota parameters")
    }

    /// The quota's name, used to namespace its storage key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The reset cadence.
    pub fn period(&self) -> QuotaPeriod {
        self.period
    }

    /// The cap for one period.
    pub fn limit(&self) -> u64 {
        self.limit
    }
}

fn storage_key(quota_name: &str, identifier: &str) -> String {
    format!("halt:quota:{quota_name}:{identifier}")
}

/// Tracks usage against one or more [`Quota`] definitions.
pub struct QuotaManager<S, C> {
    storage: S,
    clock: C,
}

impl<S: Storage, C: Clock> QuotaManager<S, C> {
    /// Create a new quota manager over the given storage and clock.
    pub fn new(storage: S, clock: C) -> Self {
        Self { storage, clock }
    }

    /// Check whether `cost` more units would fit in `quota`, without
    /// consuming any of it.
    pub async fn check_quota(&self, quota: &Quota, identifier: &str, cost: u64) -> Result<Decision> {
        let now_ms = self.clock.now_ms();
        let (window_start, reset_at_ms) = quota.period.boundaries(now_ms);
        let key = storage_key(&quota.name, identifier);

        let entry = self.storage.get(&key).await?;
        let count = match &entry {
            Some(e) if e.window_start == window_start => e.count,
            _ => 0,
        };

        let reset_at = reset_at_ms / 1000;
        let remaining = quota.limit.saturating_sub(count);
        Ok(if count + cost <= quota.limit {
            Decision::allow(quota.limit, remaining, reset_at)
        } else {
            let retry_after = reset_at.saturating_sub(now_ms / 1000).max(1);
            Decision::deny(quota.limit, reset_at, retry_after)
        })
    }

    /// Atomically check and record `cost` units of usage against `quota`.
    pub async fn consume_quota(&self, quota: &Quota, identifier: &str, cost: u64) -> Result<Decision> {
        let now_ms = self.clock.now_ms();
        let (window_start, reset_at_ms) = quota.period.boundaries(now_ms);
        let key = storage_key(&quota.name, identifier);
        let reset_at = reset_at_ms / 1000;

        let ttl_secs = (reset_at_ms.saturating_sub(now_ms) / 1000 + 3600).max(60);
        let ttl = Duration::from_secs(ttl_secs);

        self.storage
            .execute_atomic(&key, ttl, |entry| {
                let count = match &entry {
                    Some(e) if e.window_start == window_start => e.count,
                    _ => 0,
                };

                if count + cost <= quota.limit {
                    let new_entry = StorageEntry::new(count + cost, window_start);
                    let remaining = quota.limit - (count + cost);
                    (new_entry, Decision::allow(quota.limit, remaining, reset_at))
                } else {
                    let new_entry = StorageEntry::new(count, window_start);
                    let retry_after = reset_at.saturating_sub(now_ms / 1000).max(1);
                    (new_entry, Decision::deny(quota.limit, reset_at, retry_after))
                }
            })
            .await
    }

    /// Reset usage for `quota`/`identifier` back to zero.
    pub async fn reset_quota(&self, quota: &Quota, identifier: &str) -> Result<()> {
        let key = storage_key(&quota.name, identifier);
        self.storage.delete(&key).await
    }
}
