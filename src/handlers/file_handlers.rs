//! HTTP handlers for user files under `/api/v1/files`.
//! Uploads arrive as multipart forms; downloads return the raw payload with
//! the store's content type and entity tag.

use crate::{
    errors::AppError,
    models::file::{FileInfo, FileList, SignedUrl},
    state::AppState,
    store::DEFAULT_CONTENT_TYPE,
};
use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, Query, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};

const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 900;
/// Longest lifetime S3 accepts for a presigned request (7 days).
const MAX_SIGNED_URL_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Query params accepted by the signed URL endpoints.
#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    pub expires_in: Option<u64>,
}

impl SignedUrlQuery {
    fn ttl(&self) -> Duration {
        Duration::from_secs(
            self.expires_in
                .unwrap_or(DEFAULT_SIGNED_URL_TTL_SECS)
                .clamp(1, MAX_SIGNED_URL_TTL_SECS),
        )
    }
}

/// The `file` part of an upload form.
struct FilePart {
    filename: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

/// `POST /api/v1/files/upload/{user_id}`: multipart upload.
///
/// Form fields:
/// - `file` (required): the payload; its part filename names the object
/// - `filename`: overrides the part filename
/// - `content_type`: overrides the part content type
/// - `metadata`: JSON object of string values stored with the object
pub async fn upload_file(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::bad_request(e.body_text()))?;

    let mut file: Option<FilePart> = None;
    let mut filename_override = None;
    let mut content_type_override = None;
    let mut metadata: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some(FilePart {
                    filename,
                    content_type,
                    data,
                });
            }
            "filename" => filename_override = Some(field.text().await.map_err(multipart_error)?),
            "content_type" => {
                content_type_override = Some(field.text().await.map_err(multipart_error)?)
            }
            "metadata" => {
                let raw = field.text().await.map_err(multipart_error)?;
                metadata = serde_json::from_str(&raw).map_err(|e| {
                    AppError::bad_request(format!(
                        "metadata must be a JSON object of strings: {}",
                        e
                    ))
                })?;
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::bad_request("File is required"))?;
    let filename = filename_override
        .filter(|f| !f.is_empty())
        .or(file.filename)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::bad_request("filename is required"))?;
    let content_type = content_type_override.or(file.content_type);

    metadata.insert("user-id".into(), user_id.clone());
    metadata.insert("original-name".into(), filename.clone());

    let info = state
        .files
        .put(
            &user_id,
            &filename,
            file.data,
            content_type.as_deref(),
            metadata,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(info)))
}

/// `GET /api/v1/files/{user_id}/{filename}`: raw payload.
pub async fn get_file(
    State(state): State<AppState>,
    Path((user_id, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (data, info) = state.files.get(&user_id, &filename).await?;
    let length = data.len();

    let mut response = Response::new(Body::from(data));
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &info, length);
    Ok(response)
}

/// `DELETE /api/v1/files/{user_id}/{filename}`: 204 even if it never existed.
pub async fn delete_file(
    State(state): State<AppState>,
    Path((user_id, filename)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.files.delete(&user_id, &filename).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/files/{user_id}`
pub async fn list_files(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<FileList>, AppError> {
    Ok(Json(state.files.list(&user_id).await?.into()))
}

/// `GET /api/v1/files/{user_id}/{filename}/download-url`
pub async fn download_url(
    State(state): State<AppState>,
    Path((user_id, filename)): Path<(String, String)>,
    Query(q): Query<SignedUrlQuery>,
) -> Result<Json<SignedUrl>, AppError> {
    Ok(Json(
        state
            .files
            .signed_download_url(&user_id, &filename, q.ttl())
            .await?,
    ))
}

/// `GET /api/v1/files/{user_id}/{filename}/upload-url`
pub async fn upload_url(
    State(state): State<AppState>,
    Path((user_id, filename)): Path<(String, String)>,
    Query(q): Query<SignedUrlQuery>,
) -> Result<Json<SignedUrl>, AppError> {
    Ok(Json(
        state
            .files
            .signed_upload_url(&user_id, &filename, q.ttl())
            .await?,
    ))
}

fn multipart_error(err: MultipartError) -> AppError {
    let status = err.status();
    let status = if status.is_server_error() {
        StatusCode::BAD_REQUEST
    } else {
        status
    };
    AppError::new(status, err.body_text())
}

fn set_file_headers(headers: &mut HeaderMap, info: &FileInfo, length: usize) {
    let content_type = info
        .content_type
        .clone()
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    if let Some(etag) = info.etag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Some(last_modified) = info.last_modified {
        let formatted = last_modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&formatted) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
}
