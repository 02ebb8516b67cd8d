//! ML client error types.

use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Detection service returned {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<MlError> for herd_media::MediaError {
    fn from(err: MlError) -> Self {
        herd_media::MediaError::engine_failure(err.to_string())
    }
}
