//! Multipart upload reading.

use axum::extract::Multipart;

use crate::error::{ApiError, ApiResult};
use crate::security::{too_large, validate_upload, UploadKind};

/// Form field carrying the uploaded file.
const FILE_FIELD: &str = "file";

/// A validated upload held in memory.
#[derive(Debug)]
pub struct Upload {
    /// Lowercase extension the file will be stored under
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Read the `file` field of a multipart body.
///
/// The declared name and content type are checked before the body is read,
/// and reading stops as soon as `max_bytes` is exceeded.
pub async fn read_upload(
    multipart: &mut Multipart,
    kind: UploadKind,
    max_bytes: usize,
) -> ApiResult<Upload> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let extension = validate_upload(kind, field.file_name(), field.content_type())?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?
        {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(too_large(max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(ApiError::validation("Uploaded file is empty"));
        }

        return Ok(Upload { extension, bytes });
    }

    Err(ApiError::validation("No file uploaded"))
}
