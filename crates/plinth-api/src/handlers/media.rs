//! Media library: multipart uploads and downloads.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use plinth_core::ListMediaRequest;

use crate::auth::RequireAuth;
use crate::services::media::{content_disposition, UploadInput};
use crate::services::page_bounds;
use crate::{ApiError, AppState, ListResponse};

#[derive(Debug, Default, Deserialize)]
pub struct ListMediaQuery {
    pub uploader_id: Option<Uuid>,
    /// MIME prefix such as `image/`.
    pub content_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_media(
    State(state): State<AppState>,
    Query(query): Query<ListMediaQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page_bounds(query.limit, query.offset);
    let page = state
        .services
        .media
        .list(ListMediaRequest {
            uploader_id: query.uploader_id,
            content_type_prefix: query.content_type,
            limit: Some(limit),
            offset: Some(offset),
        })
        .await?;
    Ok(Json(ListResponse::from_page(page, limit, offset)))
}

/// Upload a file.
///
/// # Multipart Fields
///
/// - `file` (required): the file bytes, with its filename
/// - `alt_text` (optional)
/// - `caption` (optional)
pub async fn upload_media(
    State(state): State<AppState>,
    auth: RequireAuth,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut alt_text = None;
    let mut caption = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let claimed = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {}", e)))?;
                file = Some((filename, claimed, data.to_vec()));
            }
            Some("alt_text") => alt_text = Some(read_text(field).await?),
            Some("caption") => caption = Some(read_text(field).await?),
            _ => {}
        }
    }

    let (filename, claimed_type, data) = file.ok_or_else(|| {
        ApiError::BadRequest("No file uploaded. Use field name 'file'.".to_string())
    })?;

    let media = state
        .services
        .media
        .upload(
            &auth.user,
            UploadInput {
                filename,
                claimed_type,
                data,
                alt_text,
                caption,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(media)))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read form field: {}", e)))
}

pub async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.media.get(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMediaBody {
    pub alt_text: Option<String>,
    pub caption: Option<String>,
}

pub async fn update_media(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateMediaBody>,
) -> Result<impl IntoResponse, ApiError> {
    let media = state
        .services
        .media
        .update(
            &auth.user,
            id,
            body.alt_text.as_deref(),
            body.caption.as_deref(),
        )
        .await?;
    Ok(Json(media))
}

pub async fn delete_media(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.media.delete(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stream the stored bytes with the detected content type.
pub async fn download_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (media, data) = state.services.media.download(id).await?;

    let content_type = HeaderValue::from_str(&media.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition(&media.filename))
        .unwrap_or_else(|_| HeaderValue::from_static("inline"));
    let etag = HeaderValue::from_str(&format!("\"{}\"", media.content_hash))
        .unwrap_or_else(|_| HeaderValue::from_static("\"\""));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::ETAG, etag),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        ],
        data,
    ))
}
