//! Request-level error taxonomy and its HTTP rendering.

use axum::extract::multipart::MultipartError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::security::sanitize::InvalidPath;
use crate::security::token::TokenError;
use crate::storage::StorageError;

/// Epoch second at which a throttled window ends.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Error body returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("too many requests, retry in {retry_after_secs}s")]
    Throttled { retry_after_secs: u64, reset_at: u64 },

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    InvalidPath(#[from] InvalidPath),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage failure")]
    Storage(#[source] StorageError),

    #[error("internal error")]
    Internal(String),
}

impl GalleryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Throttled { .. } => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::InvalidPath(_) => "invalid_path",
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidPath(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for GalleryError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => Self::NotFound(key),
            StorageError::InvalidKey(key) => Self::InvalidPath(InvalidPath(key)),
            other => Self::Storage(other),
        }
    }
}

impl From<TokenError> for GalleryError {
    fn from(e: TokenError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<MultipartError> for GalleryError {
    fn from(e: MultipartError) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        match &self {
            Self::Storage(e) => tracing::error!(error = %e, "Object store failure"),
            Self::Internal(detail) => tracing::error!(error = %detail, "Internal error"),
            _ => {}
        }

        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Self::Throttled { retry_after_secs, reset_at } = self {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from(reset_at.div_ceil(1000)));
        }
        response
    }
}

/// Result type for gallery handlers.
pub type GalleryResult<T> = std::result::Result<T, GalleryError>;
