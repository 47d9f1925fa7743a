/// Errors produced by the token bucket and its stores.
///
/// A denied attempt is never an error; it is reported as `Ok(false)`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LimitError {
    /// The configured rate was zero, negative, or not a finite number.
    #[error("rate must be greater than zero, got {0}")]
    InvalidRate(f64),

    /// The configured capacity was zero.
    #[error("capacity must be at least 1, got {0}")]
    InvalidCapacity(u64),

    /// `take` was called for a key that was never replenished.
    ///
    /// This is a caller bug: every take has to be preceded by a replenish.
    #[error("key {0:?} does not exist in the bucket store")]
    KeyNotFound(String),
}
