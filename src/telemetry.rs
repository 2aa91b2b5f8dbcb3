//! Observability hooks for rate-limit decisions (spec §4.10, component C10).
//!
//! [`Telemetry`] is consulted by the [`crate::limiter::Limiter`] after every
//! decision. All methods have no-op default bodies, so implementors only
//! override the events they care about. [`LoggingTelemetry`] emits structured
//! `tracing` events; [`CompositeTelemetry`] fans a single event out to
//! multiple sinks in registration order.

use crate::decision::Decision;
use crate::penalty::Penalty;

/// Observes rate-limit and quota decisions as they happen.
///
/// All methods are no-ops by default — implement only the ones relevant to
/// your sink.
pub trait Telemetry: Send + Sync {
    /// Called for every check, before the outcome is known to the caller.
    fn on_check(&self, _policy_name: &str, _key: &str) {}

    /// Called when a check results in an allow.
    fn on_allowed(&self, _policy_name: &str, _key: &str, _decision: &Decision) {}

    /// Called when a check results in a deny.
    fn on_blocked(&self, _policy_name: &str, _key: &str, _decision: &Decision) {}

    /// Called for every quota check, before the outcome is known.
    fn on_quota_check(&self, _quota_name: &str, _identifier: &str) {}

    /// Called when a quota check is denied.
    fn on_quota_exceeded(&self, _quota_name: &str, _identifier: &str, _decision: &Decision) {}

    /// Called when the penalty engine blocks an identifier outright.
    fn on_penalty_applied(&self, _identifier: &str, _penalty: &Penalty) {}

    /// Called whenever a violation is recorded, regardless of whether it
    /// crossed the penalty threshold.
    fn on_violation(&self, _identifier: &str, _violations: u64) {}
}

/// Discards every event. The default when no telemetry is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {}

/// Emits structured `tracing` events for every decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTelemetry;

impl Telemetry for LoggingTelemetry {
    fn on_allowed(&self, policy_name: &str, key: &str, decision: &Decision) {
        tracing::debug!(
            policy = policy_name,
            key,
            remaining = decision.remaining,
            limit = decision.limit,
            "request allowed"
        );
    }

    fn on_blocked(&self, policy_name: &str, key: &str, decision: &Decision) {
        tracing::warn!(
            policy = policy_name,
            key,
            retry_after = decision.retry_after,
            limit = decision.limit,
            "request blocked"
        );
    }

    fn on_quota_exceeded(&self, quota_name: &str, identifier: &str, decision: &Decision) {
        tracing::warn!(
            quota = quota_name,
            identifier,
            reset_at = decision.reset_at,
            "quota exceeded"
        );
    }

    fn on_penalty_applied(&self, identifier: &str, penalty: &Penalty) {
        tracing::warn!(
            identifier,
            violations = penalty.violations,
            penalty_until = penalty.penalty_until,
            "penalty applied"
        );
    }

    fn on_violation(&self, identifier: &str, violations: u64) {
        tracing::info!(identifier, violations, "violation recorded");
    }
}

/// A counter/gauge sink a caller provides to receive numeric metrics
/// (Prometheus, StatsD, or an in-process test double).
pub trait MetricsSink: Send + Sync {
    /// Increment a named counter by one, tagged with the policy/quota name.
    fn increment(&self, metric: &str, label: &str);
}

/// Forwards decisions to a caller-supplied [`MetricsSink`] as counter increments.
pub struct MetricsTelemetry<M> {
    sink: M,
}

impl<M: MetricsSink> MetricsTelemetry<M> {
    /// Wrap a metrics sink.
    pub fn new(sink: M) -> Self {
        Self { sink }
    }
}

impl<M: MetricsSink> Telemetry for MetricsTelemetry<M> {
    fn on_allowed(&self, policy_name: &str, _key: &str, _decision: &Decision) {
        self.sink.increment("ratelimit_allowed_total", policy_name);
    }

    fn on_blocked(&self, policy_name: &str, _key: &str, _decision: &Decision) {
        self.sink.increment("ratelimit_blocked_total", policy_name);
    }

    fn on_quota_exceeded(&self, quota_name: &str, _identifier: &str, _decision: &Decision) {
        self.sink.increment("ratelimit_quota_exceeded_total", quota_name);
    }

    fn on_penalty_applied(&self, _identifier: &str, _penalty: &Penalty) {
        self.sink.increment("ratelimit_penalty_applied_total", "penalty");
    }
}

/// Fans every event out to a list of sinks, in registration order.
#[derive(Default)]
pub struct CompositeTelemetry {
    sinks: Vec<Box<dyn Telemetry>>,
}

impl CompositeTelemetry {
    /// Create an empty composite with no sinks.
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Register a sink, called after all previously-registered sinks.
    pub fn with_sink(mut self, sink: impl Telemetry + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl Telemetry for CompositeTelemetry {
    fn on_check(&self, policy_name: &str, key: &str) {
        for sink in &self.sinks {
            sink.on_check(policy_name, key);
        }
    }

    fn on_allowed(&self, policy_name: &str, key: &str, decision: &Decision) {
        for sink in &self.sinks {
            sink.on_allowed(policy_name, key, decision);
        }
    }

    fn on_blocked(&self, policy_name: &str, key: &str, decision: &Decision) {
        for sink in &self.sinks {
            sink.on_blocked(policy_name, key, decision);
        }
    }

    fn on_quota_check(&self, quota_name: &str, identifier: &str) {
        for sink in &self.sinks {
            sink.on_quota_check(quota_name, identifier);
        }
    }

    fn on_quota_exceeded(&self, quota_name: &str, identifier: &str, decision: &Decision) {
        for sink in &self.sinks {
            sink.on_quota_exceeded(quota_name, identifier, decision);
        }
    }

    fn on_penalty_applied(&self, identifier: &str, penalty: &Penalty) {
        for sink in &self.sinks {
            sink.on_penalty_applied(identifier, penalty);
        }
    }

    fn on_violation(&self, identifier: &str, violations: u64) {
        for sink in &self.sinks {
            sink.on_violation(identifier, violations);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        allowed: AtomicU64,
        blocked: AtomicU64,
    }

    impl Telemetry for RecordingSink {
        fn on_allowed(&self, _policy_name: &str, _key: &str, _decision: &Decision) {
            self.allowed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_blocked(&self, _policy_name: &str, _key: &str, _decision: &Decision) {
            self.blocked.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_does_nothing() {
        let telemetry = NoopTelemetry;
        telemetry.on_allowed("p", "k", &Decision::allow(10, 9, 60));
    }

    #[test]
    fn composite_fans_out_to_all_sinks() {
        let sink_a = RecordingSink::default();
        let sink_b = RecordingSink::default();

        struct Counting(Mutex<Vec<&'static str>>);
        impl Telemetry for Counting {
            fn on_allowed(&self, _: &str, _: &str, _: &Decision) {
                self.0.lock().unwrap().push("allowed");
            }
        }

        let order = std::sync::Arc::new(Counting(Mutex::new(Vec::new())));
        let order_clone = order.clone();

        struct Forwarder(std::sync::Arc<Counting>);
        impl Telemetry for Forwarder {
            fn on_allowed(&self, p: &str, k: &str, d: &Decision) {
                self.0.on_allowed(p, k, d);
            }
        }

        let composite = CompositeTelemetry::new()
            .with_sink(sink_a)
            .with_sink(sink_b)
            .with_sink(Forwarder(order_clone));

        composite.on_allowed("policy", "key", &Decision::allow(10, 9, 60));
        assert_eq!(order.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn metrics_telemetry_increments_sink() {
        struct CountingSink(AtomicU64);
        impl MetricsSink for CountingSink {
            fn increment(&self, _metric: &str, _label: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let sink = CountingSink(AtomicU64::new(0));
        let telemetry = MetricsTelemetry::new(sink);
        telemetry.on_blocked("policy", "key", &Decision::deny(10, 60, 5));
        assert_eq!(telemetry.sink.0.load(Ordering::SeqCst), 1);
    }
}
