use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    Extension,
};
use chrono::Utc;
use serde::Serialize;

use crate::app::AppState;
use crate::auth::Principal;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::upload;
use crate::validation::FieldErrors;

#[derive(Debug, Serialize)]
pub struct UploadedImage {
    pub url: String,
}

struct FilePart {
    content_type: Option<String>,
    filename: Option<String>,
    data: Vec<u8>,
    truncated: bool,
}

/// POST /api/upload/image - multipart form with a `file` part
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<UploadedImage> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let max_bytes = state.config.upload.max_bytes;

    let part = read_file_part(&mut multipart, max_bytes)
        .await?
        .ok_or_else(|| ApiError::from(FieldErrors::single("file", "field is required")))?;

    let size = if part.truncated { max_bytes + 1 } else { part.data.len() };
    let image = upload::check_image(part.content_type.as_deref(), part.filename.as_deref(), size, max_bytes)?;

    let key = upload::object_key(&image.extension, Utc::now());
    let url = state
        .storage
        .put_object(&key, Bytes::from(part.data), &image.content_type)
        .await?;

    tracing::info!(
        "Uploaded {} ({} bytes, {}) for {}",
        key,
        image.size,
        image.content_type,
        principal.display_name()
    );
    Ok(ApiResponse::success(UploadedImage { url }))
}

/// Buffer the `file` part, stopping one byte past `max_bytes`.
async fn read_file_part(multipart: &mut Multipart, max_bytes: usize) -> Result<Option<FilePart>, ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let mut part = FilePart {
            content_type: field.content_type().map(str::to_string),
            filename: field.file_name().map(str::to_string),
            data: Vec::new(),
            truncated: false,
        };

        // Unsupported types never get their body read.
        upload::check_image(part.content_type.as_deref(), part.filename.as_deref(), 1, max_bytes)?;

        while let Some(chunk) = field.chunk().await.map_err(|e| ApiError::bad_request(e.body_text()))? {
            if part.data.len() + chunk.len() > max_bytes {
                part.truncated = true;
                break;
            }
            part.data.extend_from_slice(&chunk);
        }
        return Ok(Some(part));
    }
    Ok(None)
}
