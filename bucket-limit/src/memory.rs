use std::time::Duration;

use dashmap::DashMap;

use crate::BucketState;
use crate::BucketStore;
use crate::Clock;
use crate::LimitError;
use crate::SystemClock;

/// A process-local [`BucketStore`] backed by a sharded concurrent map.
///
/// Keys are never dropped on their own; hosts with an open-ended key space
/// should call [`InMemoryStore::purge_idle`] periodically.
#[derive(Debug)]
pub struct InMemoryStore<C = SystemClock> {
    buckets: DashMap<String, BucketState>,
    clock: C,
}

impl InMemoryStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// A copy of the current state for `key`, if it has been seen.
    pub fn state(&self, key: &str) -> Option<BucketState> {
        self.buckets.get(key).map(|state| *state)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drops keys that have not been replenished for at least `max_idle`
    /// (whole seconds) and whose bucket would be full again at `rate` and
    /// `capacity`. A dropped key comes back full, so a key still refilling
    /// is kept whatever its age. Returns how many keys were removed.
    pub fn purge_idle(&self, max_idle: Duration, rate: f64, capacity: u64) -> usize {
        let now = self.clock.now_secs();
        let max_idle = max_idle.as_secs();
        let mut removed = 0;

        self.buckets.retain(|_, state| {
            let elapsed = now.saturating_sub(state.updated_at());
            let refilled = state.tokens() + rate * elapsed as f64 >= capacity as f64;
            let keep = elapsed < max_idle || !refilled;
            if !keep {
                removed += 1;
            }
            keep
        });

        tracing::debug!(removed, remaining = self.buckets.len(), "purged idle buckets");
        removed
    }
}

impl<C: Clock> BucketStore for InMemoryStore<C> {
    fn replenish(&self, key: &str, rate: f64, capacity: u64) -> Result<(), LimitError> {
        let now = self.clock.now_secs();

        // Avoid allocating the key on the hot path
        if let Some(mut state) = self.buckets.get_mut(key) {
            state.replenish(now, rate, capacity);
            tracing::trace!(key, tokens = state.tokens(), "replenished bucket");
            return Ok(());
        }

        self.buckets
            .entry(key.to_owned())
            .and_modify(|state| state.replenish(now, rate, capacity))
            .or_insert_with(|| BucketState::full(capacity, now));
        Ok(())
    }

    fn take(&self, key: &str) -> Result<bool, LimitError> {
        let mut state = self
            .buckets
            .get_mut(key)
            .ok_or_else(|| LimitError::KeyNotFound(key.to_owned()))?;
        Ok(state.take())
    }

    fn replenish_and_take(&self, key: &str, rate: f64, capacity: u64) -> Result<bool, LimitError> {
        let now = self.clock.now_secs();

        // The shard write lock is held for both steps, so no other caller
        // can replenish from the same stale timestamp in between.
        if let Some(mut state) = self.buckets.get_mut(key) {
            state.replenish(now, rate, capacity);
            return Ok(state.take());
        }

        let mut state = self
            .buckets
            .entry(key.to_owned())
            .and_modify(|state| state.replenish(now, rate, capacity))
            .or_insert_with(|| BucketState::full(capacity, now));
        Ok(state.take())
    }
}
