//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Require credentials for the active auth strategy
//! - Validate value ranges (limits > 0, timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GalleryConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GalleryConfig;
use crate::security::auth::AuthStrategy;
use crate::security::rate_limit::OperationClass;

/// Shortest accepted HMAC secret in bytes.
pub const MIN_TOKEN_SECRET_LEN: usize = 32;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GalleryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let auth = &config.auth;
    if auth.username.is_empty() {
        errors.push(ValidationError::new("auth.username", "must not be empty"));
    }
    if auth.password.is_empty() {
        errors.push(ValidationError::new("auth.password", "must not be empty"));
    }
    if auth.strategy == AuthStrategy::Token && auth.token_secret.len() < MIN_TOKEN_SECRET_LEN {
        errors.push(ValidationError::new(
            "auth.token_secret",
            format!("must be at least {MIN_TOKEN_SECRET_LEN} bytes for the token strategy"),
        ));
    }
    if auth.token_ttl_secs == Some(0) {
        errors.push(ValidationError::new("auth.token_ttl_secs", "must be greater than 0 when set"));
    }

    let limits = &config.rate_limit;
    for class in [
        OperationClass::List,
        OperationClass::Login,
        OperationClass::Upload,
        OperationClass::Delete,
        OperationClass::ObjectFetch,
    ] {
        let limit = limits.limit_for(class);
        if limit.max_requests == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.{class}.max_requests"),
                "must be greater than 0",
            ));
        }
        if limit.window_ms == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.{class}.window_ms"),
                "must be greater than 0",
            ));
        }
    }
    if limits.store_timeout_ms == 0 {
        errors.push(ValidationError::new("rate_limit.store_timeout_ms", "must be greater than 0"));
    }
    if limits.client_ip_header.is_empty() {
        errors.push(ValidationError::new("rate_limit.client_ip_header", "must not be empty"));
    }

    if config.storage.max_file_size_bytes == 0 {
        errors.push(ValidationError::new("storage.max_file_size_bytes", "must be greater than 0"));
    }
    if config.storage.key_prefix.starts_with('/') || config.storage.key_prefix.contains("..") {
        errors.push(ValidationError::new(
            "storage.key_prefix",
            "must be relative and must not contain '..'",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
