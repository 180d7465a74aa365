//! HTTP route definitions

use crate::{AppState, handlers, middleware};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{delete, get},
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    let rate_limit = middleware::create_rate_limiter(state.config.rate_limit_rps).map(|limiter| {
        middleware::spawn_rate_limit_sweeper(&limiter);
        middleware::RateLimit::new(limiter, state.config.trust_proxy)
    });
    let cors = cors_layer(state.config.cors_enabled, &state.config.cors_origins);

    Router::new()
        // Service endpoints
        .route("/health", get(handlers::health_check))
        .route("/buckets", get(handlers::list_buckets).post(handlers::create_bucket))

        // Bucket endpoints
        .route("/buckets/{bucket}", delete(handlers::delete_bucket))

        // Object endpoints
        .route(
            "/buckets/{bucket}/objects",
            get(handlers::list_objects).post(handlers::upload_object),
        )
        .route("/buckets/{bucket}/objects/{*key}", delete(handlers::delete_object))
        .route("/buckets/{bucket}/download/{*key}", get(handlers::download_object))
        .route("/share/{bucket}/{*key}", get(handlers::shared_object))

        // Apply middleware (last added runs first)
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::cancellation_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            rate_limit,
            middleware::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .with_state(state)
}

fn cors_layer(enabled: bool, origins: &[String]) -> CorsLayer {
    if !enabled {
        return CorsLayer::new();
    }

    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}
