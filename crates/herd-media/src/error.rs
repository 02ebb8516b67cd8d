//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Unreadable media: {0}")]
    UnreadableMedia(String),

    #[error("Video duration ({}) exceeds maximum allowed duration of {}", mmss(.duration_secs), mmss(.max_secs))]
    DurationExceeded { duration_secs: f64, max_secs: f64 },

    #[error("Invalid sample interval: {0} (must be a positive number of seconds)")]
    InvalidSampleInterval(f64),

    #[error("Detection engine failure: {0}")]
    EngineFailure(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an unreadable media error.
    pub fn unreadable(message: impl Into<String>) -> Self {
        Self::UnreadableMedia(message.into())
    }

    /// Create a detection engine failure.
    pub fn engine_failure(message: impl Into<String>) -> Self {
        Self::EngineFailure(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for errors caused by the media content rather than the host.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            MediaError::UnreadableMedia(_)
                | MediaError::DurationExceeded { .. }
                | MediaError::InvalidSampleInterval(_)
        )
    }
}

/// Format seconds as `M:SS`.
pub fn format_duration(secs: f64) -> String {
    mmss(&secs)
}

fn mmss(secs: &f64) -> String {
    let secs = *secs;
    let total = if secs.is_finite() && secs > 0.0 {
        secs as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}
