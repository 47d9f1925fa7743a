use bucket_limit::LimitError;

/// Errors produced by the keyed rate limit middleware.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BucketError {
    /// The request was rejected because its key ran out of tokens.
    ///
    /// When the `axum` feature is enabled, this converts to
    /// `429 Too Many Requests` with a `Retry-After` header.
    #[error("Rate limit exceeded")]
    RateLimited {
        /// The duration to wait before retrying.
        retry_after: std::time::Duration,
    },

    /// The bucket store failed to make a decision.
    ///
    /// When the `axum` feature is enabled, this converts to `500 Internal Server Error`.
    #[error("Rate limit store error: {0}")]
    Store(#[from] LimitError),
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for BucketError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, headers) = match self {
            Self::RateLimited { retry_after } => {
                let secs = retry_after.as_secs().max(1);
                let val = axum::http::HeaderValue::from(secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Some((axum::http::header::RETRY_AFTER, val)),
                )
            }
            Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let mut response = (status, self.to_string()).into_response();
        if let Some((name, value)) = headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}

#[cfg(all(test, feature = "axum"))]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::*;

    #[tokio::test]
    async fn rate_limited_maps_to_429_with_retry_after() {
        let response = BucketError::RateLimited {
            retry_after: Duration::from_secs(3),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[axum::http::header::RETRY_AFTER], "3");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Rate limit exceeded");
    }

    #[test]
    fn store_errors_map_to_500() {
        let response = BucketError::from(LimitError::KeyNotFound("k".into())).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(axum::http::header::RETRY_AFTER).is_none());
    }
}
