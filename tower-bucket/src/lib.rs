//! # Tower Bucket
//!
//! `tower-bucket` puts a [`bucket_limit::TokenBucket`] in front of any
//! [Tower](https://github.com/tower-rs/tower) service.
//!
//! For every request the [`KeyedRateLimitLayer`] derives a key (usually the
//! client address) with a [`KeyExtractor`], asks the limiter for a decision,
//! and either forwards the request or fails it straight away with
//! [`BucketError::RateLimited`]. Nothing is queued; a limited caller is
//! expected to back off and retry after the hinted duration.
//!
//! Decisions are counted on the `opentelemetry` global meter as
//! `rate_limit_decisions`, tagged with `outcome`.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`BucketError`] (429 with a
//!   `Retry-After` header, or 500) and the `PeerIp` key extractor.

mod error;
mod key;
mod layer;
mod service;


pub use error::BucketError;
#[cfg(feature = "axum")]
pub use key::PeerIp;
pub use key::KeyExtractor;
pub use layer::KeyedRateLimitLayer;
pub use service::KeyedRateLimitService;
pub use service::ResponseFuture;
