//! Single-image detection and record handlers.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use herd_media::decode_image;
use herd_models::{DetectionStats, Recognition, RecognitionSummary};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::upload::read_upload;
use crate::metrics;
use crate::security::UploadKind;
use crate::state::AppState;

/// Plain acknowledgement body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Run detection on an uploaded image and store the result.
pub async fn detect_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Recognition>)> {
    let upload = read_upload(&mut multipart, UploadKind::Image, state.config.max_image_bytes).await?;

    // Decoding is CPU-bound
    let bytes = upload.bytes;
    let (frame, bytes) = tokio::task::spawn_blocking(move || {
        let frame = decode_image(&bytes);
        (frame, bytes)
    })
    .await
    .map_err(|e| ApiError::internal(format!("image decode task failed: {}", e)))?;
    let frame = frame?;

    let detections = state.detector.detect(&frame).await?;
    drop(frame);

    let image_path = state.files.save(&bytes, &upload.extension).await?;
    let count = detections.len();
    let record = state.records.create(image_path, detections, count).await?;

    metrics::record_detections("image", count);
    info!(id = record.id, cows = count, image = %record.image_path, "Image detection stored");

    Ok((StatusCode::CREATED, Json(record)))
}

/// Pagination for the record history.
#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1000))]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

/// List stored records, newest first.
pub async fn detection_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<RecognitionSummary>>> {
    query.validate()?;

    let records = state.records.list(query.skip, query.limit).await?;
    Ok(Json(records.iter().map(Recognition::summary).collect()))
}

/// Get one stored record with its detections.
pub async fn get_recognition(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Recognition>> {
    state
        .records
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Recognition not found"))
}

/// Delete a stored record and its image.
pub async fn delete_recognition(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<MessageResponse>> {
    let record = state
        .records
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Recognition not found"))?;

    if !state.records.delete(id).await? {
        return Err(ApiError::not_found("Recognition not found"));
    }

    if let Err(e) = state.files.delete(&record.image_path).await {
        warn!(id, image = %record.image_path, "Failed to delete image for record: {}", e);
    }

    info!(id, "Recognition deleted");
    Ok(Json(MessageResponse::new("Recognition deleted successfully")))
}

/// Aggregate statistics over all stored records.
pub async fn detection_stats(State(state): State<AppState>) -> ApiResult<Json<DetectionStats>> {
    let total = state.records.count().await?;
    let cows = state.records.sum_counts().await?;
    Ok(Json(DetectionStats::new(total, cows)))
}
