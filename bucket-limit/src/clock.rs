use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use quanta::Instant;

/// Source of whole-second timestamps for bucket stores.
pub trait Clock: Debug + Send + Sync {
    /// Seconds since the UNIX epoch, truncated.
    fn now_secs(&self) -> u64;
}

/// Wall clock backed by `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }
}

/// Wall clock anchored once, then advanced with the `quanta` TSC clock.
///
/// Reads are cheaper than `SystemTime::now()` and never jump backwards when
/// the system clock is adjusted.
#[derive(Debug, Clone)]
pub struct QuantaClock {
    clock: quanta::Clock,
    /// A fixed point in time (TSC tick) to calculate deltas from.
    anchor: Instant,
    epoch_secs: u64,
}

impl QuantaClock {
    pub fn new() -> Self {
        Self::with_clock(quanta::Clock::new())
    }

    pub fn with_clock(clock: quanta::Clock) -> Self {
        let anchor = clock.now();
        Self {
            clock,
            anchor,
            epoch_secs: SystemClock.now_secs(),
        }
    }
}

impl Default for QuantaClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for QuantaClock {
    #[inline]
    fn now_secs(&self) -> u64 {
        let elapsed = self.clock.now().duration_since(self.anchor);
        self.epoch_secs + elapsed.as_secs()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep one handle while a store
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    secs: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(secs: u64) -> Self {
        Self {
            secs: Arc::new(AtomicU64::new(secs)),
        }
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Moves time backwards, saturating at zero.
    pub fn rewind(&self, secs: u64) {
        let _ = self
            .secs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_sub(secs))
            });
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}
