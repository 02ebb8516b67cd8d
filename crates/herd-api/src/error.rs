//! API error types.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use herd_media::MediaError;
use herd_storage::{unsatisfied_content_range, StorageError};
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("Requested range not satisfiable")]
    RangeNotSatisfiable { size: u64 },

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Media(e) => match e {
                MediaError::UnreadableMedia(_)
                | MediaError::DurationExceeded { .. }
                | MediaError::InvalidSampleInterval(_) => StatusCode::BAD_REQUEST,
                MediaError::FileNotFound(_) => StatusCode::NOT_FOUND,
                MediaError::EngineFailure(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::InvalidName(_) | StorageError::InvalidExtension(_) => {
                    StatusCode::BAD_REQUEST
                }
                StorageError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
                StorageError::Io(_)
                | StorageError::Database(_)
                | StorageError::Serialization(_)
                | StorageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
            && !matches!(self, ApiError::Media(MediaError::EngineFailure(_)))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal()
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        if status.is_server_error() {
            tracing::error!(status = %status, "Request failed: {}", self);
        }

        let unsatisfied_size = match &self {
            ApiError::RangeNotSatisfiable { size }
            | ApiError::Storage(StorageError::RangeNotSatisfiable { size }) => Some(*size),
            _ => None,
        };

        let mut response = (status, Json(ErrorResponse { detail })).into_response();
        if let Some(size) = unsatisfied_size {
            if let Ok(value) = HeaderValue::from_str(&unsatisfied_content_range(size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(MediaError::unreadable("bad")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(MediaError::DurationExceeded {
                duration_secs: 700.0,
                max_secs: 600.0
            })
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(MediaError::engine_failure("down")).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(StorageError::not_found("x.mp4")).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_range_not_satisfiable_sets_content_range() {
        let response = ApiError::RangeNotSatisfiable { size: 1000 }.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }
}
