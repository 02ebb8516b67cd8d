//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers::detect::{
    delete_recognition, detect_image, detection_history, detection_stats, get_recognition,
};
use crate::handlers::video::{analyze_video, delete_video, stream_video};
use crate::handlers::{health, ready, root};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;
use crate::ws::ws_stream_video;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Uploads that run detection get a per-minute budget on top of the general one
    let processing_limiter = Arc::new(RateLimiterCache::per_minute(
        state.config.processing_rate_limit_per_minute,
    ));

    let processing_routes = Router::new()
        .route("/detect", post(detect_image))
        .route("/video/analyze", post(analyze_video))
        .layer(middleware::from_fn_with_state(
            processing_limiter,
            rate_limit_middleware,
        ));

    let record_routes = Router::new()
        .route("/detect/history", get(detection_history))
        .route("/detect/stats/summary", get(detection_stats))
        .route("/detect/:id", get(get_recognition).delete(delete_recognition));

    let video_routes = Router::new()
        .route("/video/stream/:name", get(stream_video))
        .route("/video/:name", delete(delete_video));

    let rate_limiter = Arc::new(RateLimiterCache::per_second(state.config.rate_limit_rps));

    let api_routes = Router::new()
        .merge(processing_routes)
        .merge(record_routes)
        .merge(video_routes)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let ws_routes = Router::new().route("/stream/video", get(ws_stream_video));

    let health_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(api_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Uploads are bounded by the configured limit instead of axum's default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
