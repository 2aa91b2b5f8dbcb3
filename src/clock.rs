//! Injectable time source.
//!
//! All rate limiting state transitions take `now` as an explicit parameter
//! rather than reading the system clock directly. The `Clock` trait is the
//! single seam through which that timestamp reaches the limiter, quota
//! accountant, and penalty engine; production callers use [`SystemClock`],
//! tests use [`VirtualClock`] to drive time deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current time, expressed as milliseconds since the Unix epoch.
///
/// Implementations must be cheap to call repeatedly and safe to share across
/// tasks (`Send + Sync`).
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// Current time in whole seconds since the Unix epoch.
    fn now_secs(&self) -> u64 {
        self.now_ms() / 1000
    }
}

/// Wall-clock time via [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_millis() as u64
    }
}

/// A settable, advanceable clock for deterministic tests.
///
/// Cloning a `VirtualClock` shares the same underlying counter, so a clone
/// held by a limiter and a clone held by the test driving it stay in sync.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    millis: Arc<AtomicU64>,
}

impl VirtualClock {
    /// Create a virtual clock starting at the given epoch millisecond.
    pub fn new(start_ms: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Set the clock to an absolute epoch millisecond.
    pub fn set_ms(&self, ms: u64) {
        self.millis.store(ms, Ordering::SeqCst);
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance_ms(&self, delta_ms: u64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Advance the clock by the given number of whole seconds.
    pub fn advance_secs(&self, delta_secs: u64) {
        self.advance_ms(delta_secs * 1000);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn virtual_clock_is_settable() {
        let clock = VirtualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance_ms(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set_ms(10_000);
        assert_eq!(clock.now_ms(), 10_000);
    }

    #[test]
    fn virtual_clock_clone_shares_state() {
        let clock = VirtualClock::new(0);
        let clone = clock.clone();
        clone.advance_secs(5);
        assert_eq!(clock.now_ms(), 5_000);
    }
}
