//! Gallery request handlers.
//!
//! Handlers run behind `guard_middleware`, so by the time one executes the
//! caller is within its rate limit and, for owner routes, authenticated.
//! Path and key validation happens here, before any object-store call.

use std::collections::BTreeMap;

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{GalleryError, GalleryResult};
use crate::http::request::ClientAddress;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::auth::{Identity, LoginError};
use crate::security::sanitize::{build_object_key, is_allowed_file_type, sanitize_path};
use crate::storage::{ObjectInfo, ObjectMeta};

/// Separator standing in for `/` inside the `/r2/{key}` path segment.
pub const KEY_COMPONENT_SEPARATOR: &str = "___";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const OBJECT_CACHE_CONTROL: &str = "public, max-age=31536000";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

pub async fn login(
    State(state): State<AppState>,
    Extension(client): Extension<ClientAddress>,
    body: Bytes,
) -> GalleryResult<Json<LoginResponse>> {
    let request: LoginRequest = serde_json::from_slice(&body)
        .map_err(|e| GalleryError::BadRequest(format!("invalid login body: {e}")))?;

    let live = state.live();
    match live.authenticator.login(&request.username, &request.password) {
        Ok(grant) => {
            tracing::info!(client = %client.as_str(), username = %grant.username, "Login succeeded");
            metrics::record_login("success");
            Ok(Json(LoginResponse {
                success: true,
                token: grant.token,
                expires_at: grant.expires_at,
            }))
        }
        Err(LoginError::InvalidCredentials) => {
            metrics::record_login("failure");
            state.audit.record_failure(client.as_str(), &request.username).await;
            Err(GalleryError::Unauthorized)
        }
        Err(LoginError::Token(e)) => {
            metrics::record_login("error");
            Err(e.into())
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// One entry of the `/api/list` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    pub key: String,
    pub size: u64,
    pub uploaded: u64,
    pub http_metadata: HttpMetadata,
    pub custom_metadata: BTreeMap<String, String>,
}

impl From<ObjectInfo> for ListEntry {
    fn from(info: ObjectInfo) -> Self {
        Self {
            key: info.key,
            size: info.size,
            uploaded: info.uploaded,
            http_metadata: HttpMetadata {
                content_type: info.meta.content_type,
            },
            custom_metadata: info.meta.custom_metadata,
        }
    }
}

pub async fn list(State(state): State<AppState>) -> GalleryResult<Json<Vec<ListEntry>>> {
    let live = state.live();
    let objects = state.store.list(&live.config.storage.key_prefix).await?;

    let entries = objects
        .into_iter()
        .filter(|info| match sanitize_path(&info.key) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Hiding stored object with unsafe key");
                false
            }
        })
        .map(ListEntry::from)
        .collect();

    Ok(Json(entries))
}

struct UploadForm {
    file_name: String,
    content_type: String,
    body: Bytes,
    path: String,
}

async fn read_upload_form(mut multipart: Multipart) -> GalleryResult<UploadForm> {
    let mut file = None;
    let mut path = String::new();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let body = field.bytes().await?;
                file = Some((file_name, content_type, body));
            }
            Some("path") => path = field.text().await?,
            _ => {}
        }
    }

    let (file_name, content_type, body) =
        file.ok_or_else(|| GalleryError::BadRequest("no file selected".to_string()))?;
    Ok(UploadForm {
        file_name,
        content_type,
        body,
        path,
    })
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub key: String,
    pub metadata: Map<String, Value>,
}

pub async fn upload(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    multipart: Multipart,
) -> GalleryResult<Json<UploadResponse>> {
    let form = read_upload_form(multipart).await?;
    let live = state.live();
    let policy = &live.config.storage;
    let size = form.body.len() as u64;

    if !is_allowed_file_type(&form.content_type, &policy.allowed_file_types) {
        return Err(GalleryError::BadRequest(format!(
            "unsupported file type: {}",
            form.content_type
        )));
    }
    if size > policy.max_file_size_bytes {
        return Err(GalleryError::BadRequest(format!(
            "file exceeds {} bytes",
            policy.max_file_size_bytes
        )));
    }

    let key = build_object_key(&policy.key_prefix, &form.path, &form.file_name)?;

    let used = state.store.usage(&policy.key_prefix).await?;
    if used.saturating_add(size) > policy.max_storage_bytes {
        return Err(GalleryError::BadRequest(format!(
            "storage quota of {} bytes exceeded",
            policy.max_storage_bytes
        )));
    }

    let mut metadata = Map::new();
    let mut custom_metadata = BTreeMap::new();
    if form.content_type.starts_with("image/") {
        metadata.insert("size".to_string(), json!(size));
        metadata.insert("type".to_string(), json!(form.content_type));
        custom_metadata.insert("size".to_string(), size.to_string());
        custom_metadata.insert("type".to_string(), form.content_type.clone());
    }

    let meta = ObjectMeta {
        content_type: (!form.content_type.is_empty()).then(|| form.content_type.clone()),
        custom_metadata,
    };
    state.store.put(&key, form.body, meta).await?;

    tracing::info!(key = %key, size, username = %identity.username, "Object uploaded");
    Ok(Json(UploadResponse {
        success: true,
        key,
        metadata,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub keys: Option<Vec<String>>,
}

impl DeleteRequest {
    /// The keys to delete: a non-empty `key` wins over `keys`.
    fn into_keys(self) -> Option<Vec<String>> {
        match self.key.filter(|k| !k.is_empty()) {
            Some(key) => Some(vec![key]),
            None => self.keys,
        }
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> GalleryResult<Json<Value>> {
    let request: DeleteRequest = serde_json::from_slice(&body)
        .map_err(|e| GalleryError::BadRequest(format!("invalid delete body: {e}")))?;
    let keys = request
        .into_keys()
        .ok_or_else(|| GalleryError::BadRequest("expected `key` or `keys`".to_string()))?;

    for key in &keys {
        sanitize_path(key)?;
    }

    if !keys.is_empty() {
        state.store.delete(&keys).await?;
    }

    tracing::info!(count = keys.len(), username = %identity.username, "Objects deleted");
    Ok(Json(json!({ "success": true })))
}

/// Map the `/r2/{key}` segment back to a storage key.
pub fn decode_object_key(segment: &str) -> String {
    segment.split(KEY_COMPONENT_SEPARATOR).collect::<Vec<_>>().join("/")
}

pub async fn fetch_object(
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> GalleryResult<Response> {
    let key = decode_object_key(&segment);
    sanitize_path(&key)?;

    let object = state.store.get(&key).await?;
    let content_type = object
        .info
        .meta
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or(HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static(OBJECT_CACHE_CONTROL)),
        ],
        Body::from(object.body),
    )
        .into_response())
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
