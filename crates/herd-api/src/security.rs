//! Upload validation and input sanitization.
//!
//! Uploads are checked on their declared file name and content type before
//! any byte is written to the upload store.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::error::{ApiError, ApiResult};

/// Allowed image extensions.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif", "tiff", "tif"];

/// Allowed video extensions.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];

/// Stored media names as produced by the upload store.
static MEDIA_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,254}$").unwrap());

/// Kind of file accepted by an upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Video,
}

impl UploadKind {
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            UploadKind::Image => IMAGE_EXTENSIONS,
            UploadKind::Video => VIDEO_EXTENSIONS,
        }
    }

    fn content_type_prefix(&self) -> &'static str {
        match self {
            UploadKind::Image => "image/",
            UploadKind::Video => "video/",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            UploadKind::Image => "image",
            UploadKind::Video => "video",
        }
    }
}

/// Validate an upload's declared name and content type. Returns the
/// lowercase extension to store it under.
pub fn validate_upload(
    kind: UploadKind,
    file_name: Option<&str>,
    content_type: Option<&str>,
) -> ApiResult<String> {
    let file_name = file_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::validation("No file name provided"))?;

    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| kind.extensions().contains(&ext.as_str()))
        .ok_or_else(|| {
            ApiError::validation(format!(
                "Invalid file type. Allowed types: {}",
                kind.extensions().join(", ")
            ))
        })?;

    if let Some(content_type) = content_type {
        let content_type = content_type.trim().to_ascii_lowercase();
        // Browsers send octet-stream for types they do not know
        if !content_type.starts_with(kind.content_type_prefix())
            && content_type != "application/octet-stream"
        {
            return Err(ApiError::validation(format!(
                "File must be an {}",
                kind.label()
            )));
        }
    }

    Ok(extension)
}

/// Error for an upload over its size limit.
pub fn too_large(max_bytes: usize) -> ApiError {
    ApiError::validation(format!(
        "File too large. Maximum size is {}MB",
        max_bytes / (1024 * 1024)
    ))
}

/// Check a stored media name taken from a request path.
pub fn is_valid_media_name(name: &str) -> bool {
    !name.contains("..") && MEDIA_NAME.is_match(name)
}

/// Content type for a stored media name, from its extension.
pub fn media_content_type(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}
