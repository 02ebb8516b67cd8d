//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "herd_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "herd_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "herd_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "herd_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "herd_ws_connections_active";
    pub const STREAM_FRAMES_PROCESSED: &str = "herd_stream_frames_processed_total";
    pub const STREAM_ERRORS_TOTAL: &str = "herd_stream_errors_total";

    // Processing metrics
    pub const ANALYSES_TOTAL: &str = "herd_video_analyses_total";
    pub const ANALYSIS_DURATION_SECONDS: &str = "herd_video_analysis_duration_seconds";
    pub const DETECTIONS_TOTAL: &str = "herd_detections_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "herd_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record WebSocket connection.
pub fn record_ws_connection(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::WS_CONNECTIONS_TOTAL, &labels).increment(1);
}

/// Update active WebSocket connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// Record a stream frame that produced a detection reply.
pub fn record_stream_frame(detections: usize) {
    counter!(names::STREAM_FRAMES_PROCESSED).increment(1);
    record_detections("stream", detections);
}

/// Record an error reply on a stream session.
pub fn record_stream_error(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::STREAM_ERRORS_TOTAL, &labels).increment(1);
}

/// Record a finished video analysis. `outcome` is `complete`, `partial` or `failed`.
pub fn record_analysis(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::ANALYSES_TOTAL, &labels).increment(1);
    histogram!(names::ANALYSIS_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record detections produced by a pipeline.
pub fn record_detections(source: &str, count: usize) {
    let labels = [("source", source.to_string())];
    counter!(names::DETECTIONS_TOTAL, &labels).increment(count as u64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

static NUMERIC_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/[0-9]+(/|$)").unwrap());
static MEDIA_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(video/stream|video|uploads)/[A-Za-z0-9_.-]*\.[A-Za-z0-9]+$").unwrap()
});

/// Sanitize path for metrics labels (remove IDs, file names).
fn sanitize_path(path: &str) -> String {
    let path = NUMERIC_SEGMENT.replace_all(path, "/:id$1");
    let path = MEDIA_SEGMENT.replace_all(&path, "/$1/:name");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
