//! HTTP routes for the API service.
//!
//! Defines the Axum router: public routes, the protected group behind the
//! auth gate, and the metrics endpoint.

use crate::auth::ProfileClaimsDecoder;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use axum::{
    http::{header, Method},
    middleware,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Request timeout for every route.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/api/public` - Public demo endpoint
/// - `/api/health` - Liveness probe
/// - `/metrics` - Prometheus metrics endpoint
/// - `/api/private/profile` - Caller's profile from token claims (authenticated)
/// - `/api/private/data` - Protected demo data (authenticated)
/// - CORS, TraceLayer for request logging, HTTP metrics
/// - 30 second request timeout
pub fn build_routes(
    config: &Config,
    auth_state: Arc<AuthState<ProfileClaimsDecoder>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/public", get(handlers::get_public))
        .route("/api/health", get(handlers::health_check));

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/api/private/profile", get(handlers::get_profile))
        .route("/api/private/data", get(handlers::get_private_data))
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            require_auth::<ProfileClaimsDecoder>,
        ));

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. CorsLayer - Answer preflights before auth runs
    // 4. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
        .layer(middleware::from_fn(http_metrics_middleware))
}

/// CORS policy for browser clients.
///
/// With `CLIENT_ORIGIN_URL` set, only that origin is allowed and
/// credentials are permitted. Without it any origin is allowed and
/// credentials are not.
fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_LENGTH]);

    match &config.client_origin_url {
        Some(origin) => cors.allow_origin(origin.clone()).allow_credentials(true),
        None => cors.allow_origin(Any),
    }
}
