//! Abuse-score penalty escalation (spec §4.9, component C9).
//!
//! Independent of any single algorithm's window, the penalty engine tracks a
//! decaying abuse score per identifier. Each recorded violation raises the
//! score by its severity; once the score crosses a configured threshold the
//! identifier is blocked outright (or, short of a full block, charged a
//! reduced rate-limit multiplier) for a configurable duration — regardless of
//! what the underlying algorithm would otherwise admit.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{ConfigError, Result};
use crate::storage::{Storage, StorageEntry};

const PENALTY_TTL_SECS: u64 = 7 * 24 * 3600;

/// Configuration for the penalty engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyConfig {
    /// Abuse score at which a penalty is applied.
    threshold: f64,
    /// How long an applied penalty blocks (or derates) the identifier.
    duration_secs: u64,
    /// Rate-limit multiplier charged while a penalty is active (e.g. `0.5`
    /// halves the effective limit); `0.0` is a full block.
    multiplier: f64,
    /// How many abuse-score points decay per hour of inactivity.
    decay_rate: f64,
}

impl PenaltyConfig {
    /// Create a penalty config, validating `threshold > 0` and
    /// `multiplier` in `(0.0, 1.0]`.
    pub fn try_new(threshold: f64, duration_secs: u64, multiplier: f64, decay_rate: f64) -> Result<Self> {
        if threshold <= 0.0 {
            return Err(ConfigError::InvalidPenalty("threshold must be > 0".into()).into());
        }
        if multiplier <= 0.0 || multiplier > 1.0 {
            return Err(ConfigError::InvalidPenalty("multiplier must be in (0.0, 1.0]".into()).into());
        }
        if decay_rate < 0.0 {
            return Err(ConfigError::InvalidPenalty("decay_rate must be >= 0".into()).into());
        }
        Ok(Self {
            threshold,
            duration_secs,
            multiplier,
            decay_rate,
        })
    }

    /// Abuse-score threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Penalty duration in seconds.
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    /// Rate-limit multiplier while penalized.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Decay rate in points per hour.
    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }
}

impl Default for PenaltyConfig {
    /// 10 points trigger a 1 hour block at half rate, decaying 1 point/hour.
    fn default() -> Self {
        Self {
            threshold: 10.0,
            duration_secs: 3600,
            multiplier: 0.5,
            decay_rate: 1.0,
        }
    }
}

/// 20 points trigger a 30 minute block at 75% rate, decaying 2 points/hour.
pub const PENALTY_LENIENT: PenaltyConfig = PenaltyConfig {
    threshold: 20.0,
    duration_secs: 1800,
    multiplier: 0.75,
    decay_rate: 2.0,
};

/// 10 points trigger a 1 hour block at 50% rate, decaying 1 point/hour.
pub const PENALTY_MODERATE: PenaltyConfig = PenaltyConfig {
    threshold: 10.0,
    duration_secs: 3600,
    multiplier: 0.5,
    decay_rate: 1.0,
};

/// 5 points trigger a 2 hour block at 25% rate, decaying 0.5 points/hour.
pub const PENALTY_STRICT: PenaltyConfig = PenaltyConfig {
    threshold: 5.0,
    duration_secs: 7200,
    multiplier: 0.25,
    decay_rate: 0.5,
};

/// Persisted penalty state for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    /// Current abuse score, after decay has been applied.
    pub abuse_score: f64,
    /// Epoch seconds until which the penalty is active (0 if none).
    pub penalty_until: u64,
    /// Running count of recorded violations (never decays).
    pub violations: u64,
    /// Epoch seconds of the most recent violation.
    pub last_violation: u64,
}

impl Penalty {
    fn empty() -> Self {
        Self {
            abuse_score: 0.0,
            penalty_until: 0,
            violations: 0,
            last_violation: 0,
        }
    }

    /// Whether a penalty is currently active at `now_secs`.
    pub fn is_active(&self, now_secs: u64) -> bool {
        self.penalty_until > now_secs
    }

    /// Seconds remaining on the active penalty, 0 if none.
    pub fn time_remaining(&self, now_secs: u64) -> u64 {
        self.penalty_until.saturating_sub(now_secs)
    }

    fn decayed(self, now_secs: u64, decay_rate: f64) -> Self {
        if self.last_violation == 0 {
            return self;
        }
        let hours_elapsed = now_secs.saturating_sub(self.last_violation) as f64 / 3600.0;
        let decay = hours_elapsed * decay_rate;
        Self {
            abuse_score: (self.abuse_score - decay).max(0.0),
            ..self
        }
    }

    fn to_entry(self) -> StorageEntry {
        StorageEntry::new(self.violations, self.last_violation)
            .set_tokens(self.abuse_score)
            .set_last_update(self.penalty_until)
    }

    fn from_entry(entry: Option<StorageEntry>) -> Self {
        match entry {
            Some(e) => Self {
                abuse_score: e.tokens_or_default(),
                penalty_until: e.last_update,
                violations: e.count,
                last_violation: e.window_start,
            },
            None => Self::empty(),
        }
    }
}

fn storage_key(identifier: &str) -> String {
    format!("halt:penalty:{identifier}")
}

/// Tracks abuse scores and applies penalties for repeat rate-limit offenders.
pub struct PenaltyManager<S, C> {
    storage: S,
    clock: C,
    config: PenaltyConfig,
}

impl<S: Storage, C: Clock> PenaltyManager<S, C> {
    /// Create a new penalty manager with the given configuration.
    pub fn new(storage: S, clock: C, config: PenaltyConfig) -> Self {
        Self { storage, clock, config }
    }

    /// Read the current penalty state, with decay applied, without
    /// persisting the decayed value.
    pub async fn get_penalty(&self, identifier: &str) -> Result<Penalty> {
        let now_secs = self.clock.now_secs();
        let entry = self.storage.get(&storage_key(identifier)).await?;
        Ok(Penalty::from_entry(entry).decayed(now_secs, self.config.decay_rate))
    }

    /// Record one violation of `severity` (default weight `1.0`) for
    /// `identifier`, applying a penalty once the threshold is crossed.
    pub async fn record_violation(&self, identifier: &str, severity: f64) -> Result<Penalty> {
        let now_secs = self.clock.now_secs();
        let key = storage_key(identifier);
        let ttl = Duration::from_secs(PENALTY_TTL_SECS);
        let config = &self.config;

        self.storage
            .execute_atomic(&key, ttl, |entry| {
                let mut penalty = Penalty::from_entry(entry).decayed(now_secs, config.decay_rate);

                penalty.abuse_score += severity;
                penalty.violations += 1;
                penalty.last_violation = now_secs;

                if penalty.abuse_score >= config.threshold && !penalty.is_active(now_secs) {
                    penalty.penalty_until = now_secs + config.duration_secs.max(1);
                }

                (penalty.to_entry(), penalty)
            })
            .await
    }

    /// Rate-limit multiplier to apply given the current penalty state
    /// (`1.0` when no penalty is active, [`PenaltyConfig::multiplier`]
    /// otherwise).
    pub async fn get_rate_limit_multiplier(&self, identifier: &str) -> Result<f64> {
        let now_secs = self.clock.now_secs();
        let penalty = self.get_penalty(identifier).await?;
        Ok(if penalty.is_active(now_secs) {
            self.config.multiplier
        } else {
            1.0
        })
    }

    /// Force a penalty onto `identifier` for `duration` (defaults to the
    /// configured duration), independent of the abuse score — used by
    /// callers reacting to out-of-band abuse signals (e.g. a WAF flag).
    pub async fn apply_penalty(&self, identifier: &str, duration: Option<Duration>) -> Result<Penalty> {
        let now_secs = self.clock.now_secs();
        let key = storage_key(identifier);
        let ttl = Duration::from_secs(PENALTY_TTL_SECS);
        let duration_secs = duration.map(|d| d.as_secs()).unwrap_or(self.config.duration_secs);

        self.storage
            .execute_atomic(&key, ttl, |entry| {
                let mut penalty = Penalty::from_entry(entry).decayed(now_secs, self.config.decay_rate);
                penalty.penalty_until = now_secs + duration_secs.max(1);
                (penalty.to_entry(), penalty)
            })
            .await
    }

    /// Clear any recorded penalty for `identifier`.
    pub async fn clear_penalty(&self, identifier: &str) -> Result<()> {
        self.storage.delete(&storage_key(identifier)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_threshold_triggers_penalty() {
        let clock = VirtualClock::new(1_000_000);
        let manager = PenaltyManager::new(MemoryStore::new(), clock.clone(), PenaltyConfig::default());

        for _ in 0..9 {
            let penalty = manager.record_violation("user:1", 1.0).await.unwrap();
            assert!(!penalty.is_active(clock.now_secs()));
        }

        let penalty = manager.record_violation("user:1", 1.0).await.unwrap();
        assert!(penalty.is_active(clock.now_secs()));
    }

    #[tokio::test]
    async fn test_multiplier_reflects_active_penalty() {
        let clock = VirtualClock::new(0);
        let config = PenaltyConfig::try_new(1.0, 100, 0.5, 1.0).unwrap();
        let manager = PenaltyManager::new(MemoryStore::new(), clock.clone(), config);

        assert_eq!(manager.get_rate_limit_multiplier("user:1").await.unwrap(), 1.0);

        manager.record_violation("user:1", 1.0).await.unwrap();
        assert_eq!(manager.get_rate_limit_multiplier("user:1").await.unwrap(), 0.5);
    }

    #[tokio::test]
    async fn test_score_decays_over_time() {
        let clock = VirtualClock::new(0);
        let config = PenaltyConfig::try_new(10.0, 100, 0.5, 2.0).unwrap();
        let manager = PenaltyManager::new(MemoryStore::new(), clock.clone(), config);

        manager.record_violation("user:1", 5.0).await.unwrap();
        clock.advance_secs(3600);

        let penalty = manager.get_penalty("user:1").await.unwrap();
        assert_eq!(penalty.abuse_score, 3.0);
    }

    #[tokio::test]
    async fn test_apply_penalty_is_independent_of_score() {
        let clock = VirtualClock::new(0);
        let manager = PenaltyManager::new(MemoryStore::new(), clock.clone(), PenaltyConfig::default());

        let penalty = manager
            .apply_penalty("abuser", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(penalty.is_active(clock.now_secs()));
        assert_eq!(penalty.violations, 0);
    }

    #[tokio::test]
    async fn test_clear_penalty() {
        let clock = VirtualClock::new(0);
        let manager = PenaltyManager::new(MemoryStore::new(), clock.clone(), PenaltyConfig::default());

        manager
            .apply_penalty("abuser", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(manager.get_penalty("abuser").await.unwrap().is_active(clock.now_secs()));

        manager.clear_penalty("abuser").await.unwrap();
        assert!(!manager.get_penalty("abuser").await.unwrap().is_active(clock.now_secs()));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(PenaltyConfig::try_new(0.0, 60, 0.5, 1.0).is_err());
        assert!(PenaltyConfig::try_new(5.0, 60, 1.5, 1.0).is_err());
        assert!(PenaltyConfig::try_new(5.0, 60, 0.5, -1.0).is_err());
    }
}
