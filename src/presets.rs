//! Ready-made policy and quota configurations for common use cases
//! (spec §4.11, component C11).
//!
//! These mirror the reference presets shipped by the original implementation
//! (`halt.presets`): sane starting points for a public API, auth endpoints,
//! expensive operations, and internal/trusted services, plus a handful of
//! calendar-boundary billing tiers.

use crate::policy::{AlgorithmKind, KeyStrategy, Policy};
use crate::quota::{Quota, QuotaPeriod};

/// Moderate limits for general public access: 100 requests/minute by IP,
/// token bucket with a 120-token burst.
pub fn public_api() -> Policy {
    Policy::new("public_api", 100, 60, AlgorithmKind::TokenBucket, KeyStrategy::Ip)
        .with_burst(120)
        .expect("preset parameters are valid")
}

/// Strict limits to slow down brute-force login attempts: 5 requests/minute
/// by IP, with a 5 minute block once exceeded.
pub fn auth_endpoints() -> Policy {
    Policy::new("auth_endpoints", 5, 60, AlgorithmKind::TokenBucket, KeyStrategy::Ip)
        .with_burst(10)
        .expect("preset parameters are valid")
        .with_block_duration_secs(300)
}

/// Very strict limits for resource-intensive endpoints: 10 requests/hour by
/// user, each costing 10 tokens (i.e. effectively 1 call/hour at default cost).
pub fn expensive_ops() -> Policy {
    Policy::new("expensive_ops", 10, 3600, AlgorithmKind::TokenBucket, KeyStrategy::User)
        .with_burst(15)
        .expect("preset parameters are valid")
        .with_cost(10)
        .expect("preset parameters are valid")
}

/// Strict limits for sensitive, API-key-gated operations: 20 requests/minute.
pub fn strict_api() -> Policy {
    Policy::new("strict_api", 20, 60, AlgorithmKind::TokenBucket, KeyStrategy::ApiKey)
        .with_burst(25)
        .expect("preset parameters are valid")
}

/// Generous limits for internal or trusted services: 1000 requests/minute by IP.
pub fn generous_api() -> Policy {
    Policy::new("generous_api", 1000, 60, AlgorithmKind::TokenBucket, KeyStrategy::Ip)
        .with_burst(1200)
        .expect("preset parameters are valid")
}

/// Free tier: 1,000 calls per calendar month.
pub fn quota_free_monthly() -> Quota {
    Quota::new("free_monthly", QuotaPeriod::Monthly, 1_000)
}

/// Pro tier: 100,000 calls per calendar month.
pub fn quota_pro_monthly() -> Quota {
    Quota::new("pro_monthly", QuotaPeriod::Monthly, 100_000)
}

/// Enterprise tier: 10,000,000 calls per calendar month.
pub fn quota_enterprise_monthly() -> Quota {
    Quota::new("enterprise_monthly", QuotaPeriod::Monthly, 10_000_000)
}

/// Free tier: 100 calls per calendar day.
pub fn quota_free_daily() -> Quota {
    Quota::new("free_daily", QuotaPeriod::Daily, 100)
}

/// Pro tier: 10,000 calls per calendar day.
pub fn quota_pro_daily() -> Quota {
    Quota::new("pro_daily", QuotaPeriod::Daily, 10_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_has_expected_shape() {
        let policy = public_api();
        assert_eq!(policy.limit(), 100);
        assert_eq!(policy.window_secs(), 60);
        assert_eq!(policy.burst(), 120);
        assert_eq!(policy.algorithm(), AlgorithmKind::TokenBucket);
    }

    #[test]
    fn auth_endpoints_has_block_duration() {
        let policy = auth_endpoints();
        assert_eq!(policy.limit(), 5);
        assert_eq!(policy.block_duration_secs(), Some(300));
    }

    #[test]
    fn expensive_ops_costs_ten_tokens() {
        let policy = expensive_ops();
        assert_eq!(policy.cost(), 10);
        assert_eq!(policy.key_strategy(), &KeyStrategy::User);
    }

    #[test]
    fn quota_presets_scale_by_tier() {
        assert!(quota_free_monthly().limit() < quota_pro_monthly().limit());
        assert!(quota_pro_monthly().limit() < quota_enterprise_monthly().limit());
        assert!(quota_free_daily().limit() < quota_pro_daily().limit());
    }
}
