/// Derives the bucket key for a request.
///
/// Any `Fn(&Req) -> String` closure is a `KeyExtractor`.
pub trait KeyExtractor<Req> {
    fn extract(&self, req: &Req) -> String;
}

impl<F, Req> KeyExtractor<Req> for F
where
    F: Fn(&Req) -> String,
{
    fn extract(&self, req: &Req) -> String {
        self(req)
    }
}

/// Keys requests on the peer IP address recorded by
/// `axum::extract::ConnectInfo<SocketAddr>`.
///
/// Requests without connect info all share the `"unknown"` bucket, so the
/// server must be started with `into_make_service_with_connect_info`.
#[cfg(feature = "axum")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerIp;

#[cfg(feature = "axum")]
impl<B> KeyExtractor<http::Request<B>> for PeerIp {
    fn extract(&self, req: &http::Request<B>) -> String {
        req.extensions()
            .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
            .map(|info| info.0.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
