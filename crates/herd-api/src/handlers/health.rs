//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Service information returned at the root path.
#[derive(Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub endpoints: Vec<&'static str>,
}

/// Root endpoint describing the API.
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "Herdwatch cow detection API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            "POST /detect",
            "GET /detect/history",
            "GET /detect/stats/summary",
            "GET /detect/:id",
            "DELETE /detect/:id",
            "POST /video/analyze",
            "GET /video/stream/:name",
            "DELETE /video/:name",
            "GET /stream/video",
        ],
    })
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub detector: &'static str,
}

/// Health check endpoint (liveness probe).
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        detector: state.detector.name(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub storage: CheckStatus,
    pub detector: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Readiness check endpoint (readiness probe).
/// Checks the upload directory and, for the remote backend, the detection service.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let storage_check = {
        let start = Instant::now();
        match tokio::fs::metadata(state.files.root()).await {
            Ok(meta) if meta.is_dir() => CheckStatus::ok(start.elapsed().as_millis() as u64),
            Ok(_) => CheckStatus::error("upload path is not a directory"),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let detector_check = match &state.remote {
        Some(remote) => {
            let start = Instant::now();
            if remote.health_check().await {
                CheckStatus::ok(start.elapsed().as_millis() as u64)
            } else {
                CheckStatus::error("detection service unreachable")
            }
        }
        None => CheckStatus::ok(0),
    };

    let all_ok = storage_check.is_ok() && detector_check.is_ok();

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            storage: storage_check,
            detector: detector_check,
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
