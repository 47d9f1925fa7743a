use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use super::BucketStore;
use super::KeyedStrategy;
use super::LimitError;
use super::Reason;

/// Validated limiter parameters, shared read-only by every key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketConfig {
    rate: f64,
    capacity: u64,
}

impl BucketConfig {
    /// # Arguments
    ///
    /// * `rate` - Tokens added per second. Must be finite and greater than zero.
    /// * `capacity` - The most tokens a bucket can hold. Must be at least 1.
    pub fn new(rate: f64, capacity: u64) -> Result<Self, LimitError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(LimitError::InvalidRate(rate));
        }
        if capacity < 1 {
            return Err(LimitError::InvalidCapacity(capacity));
        }
        Ok(Self { rate, capacity })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

/// A keyed token bucket.
///
/// Every attempt tops the key's bucket up for the time elapsed since it was
/// last seen and then tries to take a single token from it.
#[derive(Debug)]
pub struct TokenBucket<S>
where
    S: ?Sized,
{
    config: BucketConfig,
    store: Arc<S>,
}

impl<S> Clone for TokenBucket<S>
where
    S: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> TokenBucket<S>
where
    S: BucketStore + ?Sized,
{
    /// Creates a new `TokenBucket`, failing immediately on a bad configuration.
    pub fn new(rate: f64, capacity: u64, store: Arc<S>) -> Result<Self, LimitError> {
        Ok(Self::from_config(BucketConfig::new(rate, capacity)?, store))
    }

    pub fn from_config(config: BucketConfig, store: Arc<S>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> BucketConfig {
        self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns `Ok(true)` if `key` may proceed.
    ///
    /// # Errors
    ///
    /// Only store failures are errors; being rate limited is `Ok(false)`.
    pub fn attempt(&self, key: &str) -> Result<bool, LimitError> {
        let granted =
            self.store
                .replenish_and_take(key, self.config.rate, self.config.capacity)?;
        if !granted {
            tracing::debug!(key, "rate limit exceeded");
        }
        Ok(granted)
    }

    /// How long a drained bucket takes to earn one token, in whole seconds.
    fn retry_after(&self) -> Duration {
        let secs = (1.0 / self.config.rate).ceil().max(1.0);
        Duration::from_secs(secs as u64)
    }
}

impl<S> KeyedStrategy for TokenBucket<S>
where
    S: BucketStore + ?Sized,
{
    fn process(&self, key: &str) -> Result<ControlFlow<Reason>, LimitError> {
        if self.attempt(key)? {
            Ok(ControlFlow::Continue(()))
        } else {
            Ok(ControlFlow::Break(Reason::Overloaded {
                retry_after: self.retry_after(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::InMemoryStore;
    use crate::ManualClock;

    fn bucket(rate: f64, capacity: u64) -> (TokenBucket<InMemoryStore<ManualClock>>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000);
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        (TokenBucket::new(rate, capacity, store).unwrap(), clock)
    }

    #[test]
    fn it_rejects_bad_configuration() {
        let store = Arc::new(InMemoryStore::new());

        assert_eq!(
            TokenBucket::new(0.0, 4, store.clone()).unwrap_err(),
            LimitError::InvalidRate(0.0)
        );
        assert_eq!(
            TokenBucket::new(-1.0, 4, store.clone()).unwrap_err(),
            LimitError::InvalidRate(-1.0)
        );
        assert_eq!(
            TokenBucket::new(1.0, 0, store.clone()).unwrap_err(),
            LimitError::InvalidCapacity(0)
        );
        assert!(matches!(
            BucketConfig::new(f64::NAN, 1),
            Err(LimitError::InvalidRate(_))
        ));
        assert!(matches!(
            BucketConfig::new(f64::INFINITY, 1),
            Err(LimitError::InvalidRate(_))
        ));

        assert!(TokenBucket::new(1.0, 1, store).is_ok());
    }

    #[test]
    fn it_grants_exactly_capacity_up_front() {
        for capacity in [1, 2, 7, 64] {
            let (rl, _clock) = bucket(1.0, capacity);

            for _ in 0..capacity {
                assert!(rl.attempt("k").unwrap());
            }
            assert!(!rl.attempt("k").unwrap());
        }
    }

    #[test]
    fn it_leaves_capacity_minus_one_for_a_new_key() {
        let (rl, _clock) = bucket(2.0, 4);

        assert!(rl.attempt("new").unwrap());

        assert_eq!(rl.store().state("new").unwrap().tokens(), 3.0);
    }

    #[test]
    fn it_refills_over_time() {
        // rate=2, capacity=4
        let (rl, clock) = bucket(2.0, 4);

        let first: Vec<bool> = (0..5).map(|_| rl.attempt("k").unwrap()).collect();
        assert_eq!(first, [true, true, true, true, false]);

        clock.advance(1);

        assert!(rl.attempt("k").unwrap());
        assert!(rl.attempt("k").unwrap());
        assert!(!rl.attempt("k").unwrap());
    }

    #[test]
    fn it_refills_only_once_a_whole_token_accrued() {
        // rate * t >= 1 is the threshold
        let (rl, clock) = bucket(0.25, 1);
        assert!(rl.attempt("k").unwrap());

        for _ in 0..3 {
            clock.advance(1);
            assert!(!rl.attempt("k").unwrap());
        }

        clock.advance(1);
        assert!(rl.attempt("k").unwrap());
        assert_eq!(rl.store().state("k").unwrap().tokens(), 0.0);
    }

    #[test]
    fn it_caps_idle_accumulation() {
        let (rl, clock) = bucket(2.0, 4);
        assert!(rl.attempt("k").unwrap());

        clock.advance(3_600);

        let granted = (0..10).filter(|_| rl.attempt("k").unwrap()).count();
        assert_eq!(granted, 4);
    }

    #[test]
    fn it_ignores_a_clock_that_moves_backwards() {
        let (rl, clock) = bucket(2.0, 2);
        assert!(rl.attempt("k").unwrap());
        assert!(rl.attempt("k").unwrap());

        clock.rewind(10);
        assert!(!rl.attempt("k").unwrap());
        assert_eq!(rl.store().state("k").unwrap().updated_at(), 1_700_000_000);

        // Back at the stored second: no time has passed for the bucket
        clock.advance(10);
        assert!(!rl.attempt("k").unwrap());

        clock.advance(1);
        assert!(rl.attempt("k").unwrap());
    }

    #[test]
    fn process_reports_retry_after() {
        let (rl, _clock) = bucket(0.5, 1);

        assert_eq!(rl.process("k"), Ok(ControlFlow::Continue(())));
        assert_eq!(
            rl.process("k"),
            Ok(ControlFlow::Break(Reason::Overloaded {
                retry_after: Duration::from_secs(2),
            }))
        );

        let (fast, _clock) = bucket(10.0, 1);
        let _ = fast.process("k");
        assert_eq!(
            fast.process("k"),
            Ok(ControlFlow::Break(Reason::Overloaded {
                retry_after: Duration::from_secs(1),
            }))
        );
    }

    #[test]
    fn it_shares_one_store_across_clones_and_threads() {
        let capacity = 50;
        let (rl, _clock) = bucket(1.0, capacity);

        let mut handles = vec![];
        for _ in 0..capacity * 2 {
            let rl = rl.clone();
            handles.push(thread::spawn(move || rl.attempt("203.0.113.7").unwrap()));
        }

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|granted| *granted)
            .count();

        assert_eq!(granted as u64, capacity);
    }

    #[derive(Debug, Default)]
    struct ForgetfulStore;

    impl BucketStore for ForgetfulStore {
        fn replenish(&self, _key: &str, _rate: f64, _capacity: u64) -> Result<(), LimitError> {
            Ok(())
        }

        fn take(&self, key: &str) -> Result<bool, LimitError> {
            Err(LimitError::KeyNotFound(key.to_string()))
        }
    }

    #[test]
    fn store_errors_are_not_turned_into_denials() {
        let rl = TokenBucket::new(1.0, 1, Arc::new(ForgetfulStore)).unwrap();

        assert_eq!(
            rl.attempt("k"),
            Err(LimitError::KeyNotFound("k".to_string()))
        );
        assert!(rl.process("k").is_err());
    }

    #[test]
    fn it_works_behind_a_trait_object() {
        let store: Arc<dyn BucketStore> = Arc::new(InMemoryStore::new());
        let rl = TokenBucket::new(0.01, 1, store).unwrap();
        let strategy: Arc<dyn KeyedStrategy> = Arc::new(rl);

        let shared = Arc::clone(&strategy);
        let first = thread::spawn(move || shared.process("k").unwrap())
            .join()
            .unwrap();
        assert!(first.is_continue());
        assert!(strategy.process("k").unwrap().is_break());
    }
}
