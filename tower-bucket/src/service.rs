use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;

use bucket_limit::KeyedStrategy;
use bucket_limit::Reason;

use crate::error::BucketError;
use crate::key::KeyExtractor;

#[derive(Clone, Debug)]
struct KeyedRateLimitMetrics {
    decisions: Counter<u64>,
}

impl KeyedRateLimitMetrics {
    fn new() -> Self {
        let meter = global::meter("keyed_rate_limit_service");
        Self {
            decisions: meter.u64_counter("rate_limit_decisions").build(),
        }
    }

    fn record(&self, outcome: &'static str) {
        self.decisions.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

/// Rejects requests whose key has run out of tokens.
///
/// Rejection is immediate: a limited request never reaches the inner service
/// and never waits for capacity.
#[derive(Debug)]
pub struct KeyedRateLimitService<L, K, S>
where
    L: ?Sized,
    K: ?Sized,
{
    inner: S,
    limiter: Arc<L>,
    extractor: Arc<K>,
    instruments: KeyedRateLimitMetrics,
}

impl<L, K, S> Clone for KeyedRateLimitService<L, K, S>
where
    L: ?Sized,
    K: ?Sized,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            extractor: Arc::clone(&self.extractor),
            instruments: self.instruments.clone(),
        }
    }
}

impl<L, K, S> KeyedRateLimitService<L, K, S>
where
    L: ?Sized,
    K: ?Sized,
{
    pub fn new(inner: S, limiter: Arc<L>, extractor: Arc<K>) -> Self {
        Self {
            inner,
            limiter,
            extractor,
            instruments: KeyedRateLimitMetrics::new(),
        }
    }
}

pin_project! {
    /// Either the inner service's future or an immediate rejection.
    #[project = ResponseFutureProj]
    pub enum ResponseFuture<F> {
        Allowed {
            #[pin]
            inner: F,
        },
        Rejected {
            error: Option<BucketError>,
        },
    }
}

impl<F, T> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, BoxError>>,
{
    type Output = Result<T, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Allowed { inner } => inner.poll(cx),
            ResponseFutureProj::Rejected { error } => match error.take() {
                Some(error) => Poll::Ready(Err(error.into())),
                None => panic!("ResponseFuture polled after completion"),
            },
        }
    }
}

impl<L, K, S, Req> Service<Req> for KeyedRateLimitService<L, K, S>
where
    L: KeyedStrategy + ?Sized + 'static,
    K: KeyExtractor<Req> + ?Sized,
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Tokens are only taken in `call`, once the key is known
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let key = self.extractor.extract(&req);

        match self.limiter.process(&key) {
            Ok(ControlFlow::Continue(())) => {
                self.instruments.record("allowed");
                ResponseFuture::Allowed {
                    inner: self.inner.call(req),
                }
            }
            Ok(ControlFlow::Break(Reason::Overloaded { retry_after })) => {
                self.instruments.record("denied");
                tracing::debug!(%key, ?retry_after, "request rate limited");
                ResponseFuture::Rejected {
                    error: Some(BucketError::RateLimited { retry_after }),
                }
            }
            Err(err) => {
                self.instruments.record("error");
                tracing::warn!(%key, error = %err, "rate limit store failed");
                ResponseFuture::Rejected {
                    error: Some(BucketError::Store(err)),
                }
            }
        }
    }
}
