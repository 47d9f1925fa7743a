use std::sync::Arc;

use bucket_limit::KeyedStrategy;
use tower::Layer;

use crate::service::KeyedRateLimitService;

/// Applies a per-key rate limit to requests.
#[derive(Debug)]
pub struct KeyedRateLimitLayer<L, K>
where
    L: ?Sized,
    K: ?Sized,
{
    limiter: Arc<L>,
    extractor: Arc<K>,
}

impl<L, K> Clone for KeyedRateLimitLayer<L, K>
where
    L: ?Sized,
    K: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

impl<L, K> KeyedRateLimitLayer<L, K>
where
    L: KeyedStrategy + ?Sized,
    K: ?Sized,
{
    /// Create a KeyedRateLimitLayer.
    ///
    /// Every service produced by this layer shares `limiter`, so buckets are
    /// per key, not per service clone.
    pub fn new(limiter: Arc<L>, extractor: K) -> Self
    where
        K: Sized,
    {
        Self::with_shared_extractor(limiter, Arc::new(extractor))
    }

    pub fn with_shared_extractor(limiter: Arc<L>, extractor: Arc<K>) -> Self {
        KeyedRateLimitLayer { limiter, extractor }
    }
}

impl<L, K, S> Layer<S> for KeyedRateLimitLayer<L, K>
where
    L: ?Sized,
    K: ?Sized,
{
    type Service = KeyedRateLimitService<L, K, S>;

    fn layer(&self, service: S) -> Self::Service {
        KeyedRateLimitService::new(service, self.limiter.clone(), self.extractor.clone())
    }
}
