use std::fmt::Debug;

use crate::LimitError;

/// Per-key token balance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    tokens: f64,
    updated_at: u64,
}

impl BucketState {
    /// A bucket seen for the first time starts full.
    pub fn full(capacity: u64, now: u64) -> Self {
        Self {
            tokens: capacity as f64,
            updated_at: now,
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Seconds since the UNIX epoch of the last replenish.
    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    /// Adds `rate` tokens for every whole second since the last update,
    /// never holding more than `capacity`.
    ///
    /// A `now` earlier than the last update leaves the state untouched.
    pub fn replenish(&mut self, now: u64, rate: f64, capacity: u64) {
        let Some(elapsed) = now.checked_sub(self.updated_at) else {
            tracing::debug!(
                updated_at = self.updated_at,
                now,
                "clock moved backwards; skipping replenish"
            );
            return;
        };

        self.tokens = (self.tokens + rate * elapsed as f64).min(capacity as f64);
        self.updated_at = now;
    }

    /// Consumes one whole token if one is available.
    pub fn take(&mut self) -> bool {
        if self.tokens < 1.0 {
            false
        } else {
            self.tokens -= 1.0;
            true
        }
    }
}

/// Storage capability behind a [`crate::TokenBucket`].
///
/// Implementations own every key's [`BucketState`]. The limiter only ever
/// talks to them through these operations, so a networked or persistent
/// backing can replace the in-memory one without touching the algorithm.
pub trait BucketStore: Debug + Send + Sync {
    /// Brings `key`'s balance up to date.
    ///
    /// An unseen key is created full at the current time and receives no
    /// extra tokens.
    fn replenish(&self, key: &str, rate: f64, capacity: u64) -> Result<(), LimitError>;

    /// Tries to consume one token for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`LimitError::KeyNotFound`] if `key` was never replenished.
    fn take(&self, key: &str) -> Result<bool, LimitError>;

    /// Replenishes then takes.
    ///
    /// The default runs the two steps back to back, so two callers racing on
    /// the same key may both replenish from the same stale timestamp. Stores
    /// that can hold a per-key lock should override this.
    fn replenish_and_take(&self, key: &str, rate: f64, capacity: u64) -> Result<bool, LimitError> {
        self.replenish(key, rate, capacity)?;
        self.take(key)
    }
}
