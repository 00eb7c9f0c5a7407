use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    config::Config,
    handlers::{self, AppState},
    hub::Hub,
    rate_limit::IpRateLimiter,
    retention::spawn_retention_sweeper,
    signals::setup_signal_handlers,
    store::{filter_cache::FilterOptionsCache, LogStore},
};

/// Transport-level backstop above the documented ingest cap; the ingest
/// handler enforces the real 10MB limit itself so oversized payloads get a
/// proper error body.
const BODY_LIMIT_BACKSTOP: usize = 16 * 1024 * 1024;

/// In-flight work gets this long to finish once shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Start the log gateway server
///
/// This function:
/// 1. Opens the log store and runs migrations
/// 2. Spawns the broadcast hub and retention sweeper
/// 3. Sets up signal handlers for graceful shutdown
/// 4. Serves requests until a shutdown signal arrives
pub async fn start_server(config: Config) -> Result<()> {
    let store = Arc::new(LogStore::connect(&config.database.url()).await?);

    let hub = Hub::spawn();
    let limiter = Arc::new(IpRateLimiter::new(
        config.rate_limit.per_second,
        config.rate_limit.burst,
    ));
    let filter_cache = Arc::new(FilterOptionsCache::new());

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut force_rx = shutdown_tx.subscribe();

    let sweeper = spawn_retention_sweeper(store.clone());

    let state = AppState {
        store,
        hub,
        limiter,
        filter_cache,
    };

    let app = create_router(state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting log gateway on {}", addr);
    info!(
        "Configuration: db={}, rate limit {}/s burst {}",
        config.database.path, config.rate_limit.per_second, config.rate_limit.burst
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, draining connections...");
    });

    tokio::select! {
        result = serve => result?,
        _ = async {
            let _ = force_rx.recv().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "grace period elapsed, forcing shutdown"
            );
        }
    }

    sweeper.abort();
    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/ingest", post(handlers::ingest::ingest))
        .route("/api/logs", get(handlers::logs::query_logs))
        .route("/api/filters", get(handlers::filters::get_filters))
        .route("/api/ws", get(handlers::ws::ws_upgrade))
        .route("/health", get(handlers::health::health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BACKSTOP))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
