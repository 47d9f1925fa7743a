//! # bucket-limit
//!
//! `bucket-limit` provides a keyed token bucket rate limiter on top of a
//! pluggable [`BucketStore`].
//!
//! ## Core Philosophy
//!
//! Each key (a client address, an API token, anything string shaped) owns a
//! bucket of tokens. Every attempt first tops the bucket up for the whole
//! seconds elapsed since it was last seen, then tries to take one token.
//! The algorithm lives in [`TokenBucket`]; where the per-key state lives is
//! the business of the store, so an in-memory map can later be swapped for a
//! networked cache without touching the limiter.
//!
//! ## Key Concepts
//!
//! * **Lazy Evaluation**: Tokens are recalculated at the moment of the
//!   request. No background worker threads or timers.
//! * **Per-Key Atomicity**: [`InMemoryStore`] holds the key's shard lock
//!   across replenish and take, so concurrent attempts on one key can never
//!   over-grant.
//! * **Pluggable Time**: Stores read time through a [`Clock`], which makes
//!   the limiter fully deterministic under test.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use bucket_limit::InMemoryStore;
//! use bucket_limit::TokenBucket;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let bucket = TokenBucket::new(2.0, 4, store).unwrap();
//!
//! if bucket.attempt("203.0.113.7").unwrap() {
//!     // Request allowed
//! }
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

mod clock;
mod error;
mod memory;
mod store;
mod token_bucket;

pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::QuantaClock;
pub use clock::SystemClock;
pub use error::LimitError;
pub use memory::InMemoryStore;
pub use store::BucketState;
pub use store::BucketStore;
pub use token_bucket::BucketConfig;
pub use token_bucket::TokenBucket;

/// Reasons why a request might be rejected by a strategy.
#[derive(Debug, PartialEq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}

/// The core trait for keyed rate-limiting algorithms.
///
/// Strategies must be `Send` and `Sync` to allow sharing across thread
/// boundaries via `Arc`.
pub trait KeyedStrategy: Debug + Send + Sync {
    /// Attempts to process a single request on behalf of `key`.
    ///
    /// `ControlFlow::Break` is a rate limit decision, not a failure.
    ///
    /// # Errors
    ///
    /// Returns a [`LimitError`] if the backing store misbehaves.
    fn process(&self, key: &str) -> Result<ControlFlow<Reason>, LimitError>;
}
