//! Video analysis and media delivery handlers.

use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use herd_models::{AnalysisCompletion, VideoAnalysis};
use herd_storage::RangeRequest;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::detect::MessageResponse;
use crate::handlers::upload::read_upload;
use crate::metrics;
use crate::security::{is_valid_media_name, media_content_type, UploadKind};
use crate::state::AppState;

/// Read size for streamed media bodies.
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Query parameters for video analysis.
#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeQuery {
    /// Seconds between sampled frames
    #[validate(range(exclusive_min = 0.0, max = 3600.0))]
    pub sample_interval: Option<f64>,
}

/// Analysis result plus the stored video name.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub analysis: VideoAnalysis,
    pub video_filename: String,
    pub message: String,
}

/// Upload a video and run a sampled detection pass over it.
pub async fn analyze_video(
    State(state): State<AppState>,
    Query(query): Query<AnalyzeQuery>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<AnalyzeResponse>)> {
    query.validate()?;
    let interval = query
        .sample_interval
        .unwrap_or(state.config.default_sample_interval);

    let upload = read_upload(&mut multipart, UploadKind::Video, state.config.max_video_bytes).await?;
    let video_filename = state.files.save(&upload.bytes, &upload.extension).await?;
    drop(upload);

    let path = state.files.path_for(&video_filename)?;
    info!(video = %video_filename, interval, "Starting video analysis");

    let start = Instant::now();
    let analysis = match state.analyzer().analyze(&path, interval).await {
        Ok(analysis) => analysis,
        Err(e) => {
            metrics::record_analysis("failed", start.elapsed().as_secs_f64());
            warn!(video = %video_filename, "Video analysis failed: {}", e);
            if let Err(del) = state.files.delete(&video_filename).await {
                warn!(video = %video_filename, "Failed to remove rejected video: {}", del);
            }
            return Err(e.into());
        }
    };

    let message = match &analysis.completion {
        AnalysisCompletion::Complete => "Video analyzed successfully".to_string(),
        AnalysisCompletion::Partial { reason, message } => {
            format!("Video partially analyzed ({}): {}", reason.as_str(), message)
        }
    };
    let outcome = if analysis.is_complete() { "complete" } else { "partial" };
    metrics::record_analysis(outcome, start.elapsed().as_secs_f64());
    metrics::record_detections("video", analysis.total_cows_detected as usize);

    info!(
        video = %video_filename,
        outcome,
        analyzed_frames = analysis.analyzed_frames,
        max_cows = analysis.max_cows_in_frame,
        "Video analysis finished"
    );

    Ok((
        StatusCode::CREATED,
        Json(AnalyzeResponse {
            analysis,
            video_filename,
            message,
        }),
    ))
}

/// Stream a stored video, honouring a single `Range` header.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if !is_valid_media_name(&name) {
        return Err(ApiError::not_found("Video file not found"));
    }

    let size = state.files.size(&name).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::not_found("Video file not found")
        } else {
            e.into()
        }
    })?;

    // Malformed or multi-range headers fall back to the whole file
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(RangeRequest::parse);

    let (status, start, len, content_range) = match range {
        Some(request) => {
            let span = request
                .resolve(size)
                .map_err(|_| ApiError::RangeNotSatisfiable { size })?;
            (
                StatusCode::PARTIAL_CONTENT,
                span.start,
                span.len(),
                Some(span.content_range(size)),
            )
        }
        None => (StatusCode::OK, 0, size, None),
    };

    let file = state.files.open_for_read(&name, start).await?;

    let mut response = (status, file_body(file, len)).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(media_content_type(&name)),
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    // Players on other origins embed these responses
    response_headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("cross-origin"),
    );
    if let Some(content_range) = content_range {
        if let Ok(value) = HeaderValue::from_str(&content_range) {
            response_headers.insert(header::CONTENT_RANGE, value);
        }
    }

    Ok(response)
}

/// Body reading exactly `len` bytes from the file's current position.
fn file_body(file: File, len: u64) -> Body {
    let stream = futures_util::stream::unfold((file, len), |(mut file, remaining)| async move {
        if remaining == 0 {
            return None;
        }
        let want = remaining.min(STREAM_CHUNK_SIZE as u64) as usize;
        let mut buf = vec![0u8; want];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), (file, remaining - n as u64)))
            }
            Err(e) => Some((Err::<Bytes, std::io::Error>(e), (file, 0))),
        }
    });
    Body::from_stream(stream)
}

/// Delete a stored video.
pub async fn delete_video(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    if !is_valid_media_name(&name) || !state.files.delete(&name).await? {
        return Err(ApiError::not_found("Video file not found"));
    }

    info!(video = %name, "Video deleted");
    Ok(Json(MessageResponse::new("Video deleted successfully")))
}
