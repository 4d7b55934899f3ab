//! `POST /upload` and `POST /api/uploadkey`.
//!
//! Uploads are buffered in memory so that the optional `name` part (an upload
//! link) can be checked before anything is written, and so the payload can be
//! gzip-encoded without a second read.

use crate::{
    errors::AppError,
    models::object::gzip_key,
    services::{
        compression::{CompressionError, gzip_async, should_compress},
        content_type::content_type_for,
        storage_service::{ObjectMetadata, is_safe_name},
    },
    state::AppState,
    views::pages::encode_path_segment,
};
use axum::{
    Json,
    extract::{
        Multipart, Query, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::HeaderMap,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub file_name: String,
    pub results: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUploadKeyRequest {
    pub key: Option<String>,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadKeyResponse {
    pub message: String,
    pub name: String,
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
}

struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    bytes: Bytes,
}

#[derive(Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    link_name: Option<String>,
    key: Option<String>,
}

fn bad_multipart(err: MultipartError) -> AppError {
    AppError::new(err.status(), format!("Invalid multipart body: {}", err.body_text()))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Read the parts we care about. Only the first `file` part is kept.
async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                if form.file.is_some() {
                    continue;
                }
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .filter(|ct| !ct.is_empty());
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                if file_name.is_empty() {
                    continue;
                }
                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            Some("name") => form.link_name = non_empty(field.text().await.map_err(bad_multipart)?),
            Some("key") => form.key = non_empty(field.text().await.map_err(bad_multipart)?),
            _ => {}
        }
    }

    Ok(form)
}

/// An upload is authorized by a live upload link named in the form, or else
/// by the API key.
async fn authorize_upload(
    state: &AppState,
    link_name: Option<&str>,
    api_key: Option<&str>,
) -> Result<(), AppError> {
    if let Some(name) = link_name {
        if let Some(link) = state.tokens.resolve(name).await? {
            state.tokens.touch(&link).await?;
            info!(link = name, "upload authorized by upload link");
            return Ok(());
        }
        debug!(link = name, "upload link not found or expired");
    }

    if state.access.authorizes(api_key) {
        Ok(())
    } else {
        warn!("rejected upload with missing or wrong API key");
        Err(AppError::unauthorized())
    }
}

/// Store an authorized upload and describe what was written.
///
/// The original is always written under `file_name`. When the type is
/// compressible and `encode` succeeds, the gzip variant is written under
/// `file_name.gz`; otherwise any earlier gzip variant is removed so it can
/// never outlive the original it was made from.
async fn store_upload<E, F>(
    state: &AppState,
    file_name: &str,
    content_type: &str,
    bytes: Bytes,
    encode: E,
) -> Result<Vec<String>, AppError>
where
    E: FnOnce(Bytes) -> F,
    F: Future<Output = Result<Bytes, CompressionError>>,
{
    let original_meta = ObjectMetadata {
        content_type: Some(content_type.to_string()),
        content_encoding: None,
    };
    let variant_key = gzip_key(file_name);

    if !should_compress(content_type, file_name) {
        state.storage.delete_object(&variant_key).await?;
        state.storage.put_object(file_name, original_meta, bytes).await?;
        return Ok(vec![format!(
            "Original file uploaded (compression not applicable): {}",
            file_name
        )]);
    }

    match encode(bytes.clone()).await {
        Ok(encoded) => {
            state.storage.put_object(file_name, original_meta, bytes).await?;
            let gzip_meta = ObjectMetadata {
                content_type: Some(content_type.to_string()),
                content_encoding: Some("gzip".into()),
            };
            if let Err(err) = state.storage.put_object(&variant_key, gzip_meta, encoded).await {
                // the old variant no longer matches the new original
                let _ = state.storage.delete_object(&variant_key).await;
                return Err(err.into());
            }
            Ok(vec![
                format!("Gzip compressed file uploaded: {}", variant_key),
                format!("Original file uploaded alongside: {}", file_name),
            ])
        }
        Err(err) => {
            warn!(file = %file_name, "compression failed, storing original: {}", err);
            state.storage.delete_object(&variant_key).await?;
            state.storage.put_object(file_name, original_meta, bytes).await?;
            Ok(vec![
                format!("Compression failed: {}", err),
                format!("Original file uploaded as fallback: {}", file_name),
            ])
        }
    }
}

/// `POST /upload` — store a file, gzip-encoded when it is text-like.
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let form = match multipart {
        Ok(multipart) => read_upload_form(multipart).await?,
        Err(rejection) => {
            debug!("upload without a multipart body: {}", rejection);
            UploadForm::default()
        }
    };

    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(query.key)
        .or(form.key);
    authorize_upload(&state, form.link_name.as_deref(), api_key.as_deref()).await?;

    let file = form
        .file
        .ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    // the name must also leave room for its gzip variant
    if !is_safe_name(&file.file_name) || !is_safe_name(&gzip_key(&file.file_name)) {
        return Err(AppError::bad_request("Invalid file name"));
    }

    let file_name = file.file_name;
    let content_type = file
        .content_type
        .unwrap_or_else(|| content_type_for(&file_name).to_string());
    let results = store_upload(
        &state,
        &file_name,
        &content_type,
        file.bytes,
        gzip_async,
    )
    .await?;

    info!(file = %file_name, content_type = %content_type, "upload complete");
    Ok(Json(UploadResponse {
        message: "File uploaded successfully".into(),
        file_name,
        results,
    }))
}

/// `POST /api/uploadkey` — mint a 12-hour upload link.
pub async fn create_upload_key(
    State(state): State<AppState>,
    payload: Result<Json<CreateUploadKeyRequest>, JsonRejection>,
) -> Result<Json<CreateUploadKeyResponse>, AppError> {
    let Json(req) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    if !state.access.authorizes(req.key.as_deref()) {
        warn!(link = %req.name, "rejected upload link creation with wrong API key");
        return Err(AppError::unauthorized());
    }

    let link = state
        .tokens
        .create(&req.name, req.key.as_deref().unwrap_or_default())
        .await?;
    info!(link = %link.name, expires_at = %link.expires_at, "upload link created");

    Ok(Json(CreateUploadKeyResponse {
        message: "Upload link created".into(),
        upload_url: format!("/upload/{}", encode_path_segment(&link.name)),
        name: link.name,
        expires_at: link.expires_at,
    }))
}
