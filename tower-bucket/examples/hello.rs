use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use bucket_limit::InMemoryStore;
use bucket_limit::TokenBucket;
use clap::Parser;
use tower::BoxError;
use tower::ServiceBuilder;
use tower_bucket::BucketError;
use tower_bucket::KeyedRateLimitLayer;
use tower_bucket::PeerIp;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Per-client rate limited hello world")]
struct Args {
    /// Tokens added to each client's bucket per second
    #[arg(long, default_value_t = 2.0)]
    rate: f64,

    /// Most requests a client can burst
    #[arg(long, default_value_t = 4)]
    capacity: u64,

    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Drop clients idle for longer than this once their bucket has refilled
    #[arg(long, default_value = "10m", value_parser = humantime::parse_duration)]
    idle: Duration,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // 1. Setup the limiter; a bad rate or capacity stops us here
    let store = Arc::new(InMemoryStore::new());
    let limiter = Arc::new(TokenBucket::new(args.rate, args.capacity, store.clone())?);

    // 2. Keep the key space bounded
    let purge_every = args.idle.max(Duration::from_secs(1));
    let (rate, capacity) = (args.rate, args.capacity);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_every);
        loop {
            ticker.tick().await;
            store.purge_idle(purge_every, rate, capacity);
        }
    });

    // 3. Build the Router
    let app = Router::new()
        .route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "Hello World!"
            }),
        )
        .layer(
            ServiceBuilder::new()
                // The outermost layer: catches BoxError and returns Response
                .layer(HandleErrorLayer::new(handle_bucket_error))
                .layer(KeyedRateLimitLayer::new(limiter, PeerIp))
                // Route is Infallible; the rate limit layer wants BoxError
                .map_err(BoxError::from),
        );

    // 4. Serve
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        rate = args.rate,
        capacity = args.capacity,
        "listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn handle_bucket_error(err: BoxError) -> impl IntoResponse {
    if let Some(bucket_err) = err.downcast_ref::<BucketError>() {
        bucket_err.clone().into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
