//! API Service
//!
//! HTTP API with public routes and a protected route group behind a JWT
//! authentication gate backed by the identity authority's JWKS.

use api_service::auth::{HttpKeySource, JwtValidator, KeyResolver, ProfileClaimsDecoder};
use api_service::config::Config;
use api_service::middleware::AuthState;
use api_service::observability::metrics::init_metrics_recorder;
use api_service::routes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_service=info,api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting API service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        issuer = %config.issuer,
        audience = %config.audience,
        jwks_url = %config.jwks_url,
        allowed_algorithms = ?config.allowed_algorithms,
        jwks_cache_ttl_seconds = config.jwks_cache_ttl.as_secs(),
        jwks_stale_fallback_seconds = config.jwks_stale_fallback.as_secs(),
        jwt_clock_skew_seconds = config.jwt_clock_skew.as_secs(),
        bind_address = %config.bind_address,
        "Configuration loaded successfully"
    );

    // Metrics recorder must exist before anything records
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    // Key resolver and validator
    let source = Arc::new(HttpKeySource::new(config.jwks_url.clone()));
    let resolver = KeyResolver::with_stale_fallback(
        source,
        config.jwks_cache_ttl,
        config.jwks_stale_fallback,
    );

    // Warm the key cache; requests retry the fetch on demand if this fails
    match resolver.force_refresh().await {
        Ok(()) => info!(
            key_count = resolver.cached_key_count().unwrap_or(0),
            "Signing keys loaded"
        ),
        Err(e) => warn!(error = %e, "Initial JWKS fetch failed, continuing"),
    }

    let validator = JwtValidator::new(
        resolver,
        ProfileClaimsDecoder::new(),
        config.validation_policy(),
    );
    let auth_state = Arc::new(AuthState::new(validator));

    let app = routes::build_routes(&config, auth_state, metrics_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("API service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
