//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gallery.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so a minimal file only needs credentials.

use serde::{Deserialize, Serialize};

use crate::security::auth::AuthStrategy;
use crate::security::rate_limit::{OperationClass, WindowLimit};

/// Root configuration for the gallery service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GalleryConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Authentication settings.
    pub auth: AuthConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Object storage and upload policy.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Authentication configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Active credential flow.
    pub strategy: AuthStrategy,

    /// The gallery owner's username.
    pub username: String,

    /// The gallery owner's password.
    pub password: String,

    /// HMAC key for bearer tokens. Rotating it revokes every issued token.
    pub token_secret: String,

    /// Token lifetime in seconds; `None` issues tokens without expiry.
    pub token_ttl_secs: Option<u64>,

    /// Allow listing and fetching without credentials.
    pub guest_read: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategy: AuthStrategy::Token,
            username: String::new(),
            password: String::new(),
            token_secret: String::new(),
            token_ttl_secs: Some(24 * 3600),
            guest_read: true,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("strategy", &self.strategy)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("token_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("guest_read", &self.guest_read)
            .finish()
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Shared store URL (e.g., "redis://127.0.0.1:6379"). Unset counts per instance.
    pub redis_url: Option<String>,

    /// Deadline for each shared-store call in milliseconds.
    pub store_timeout_ms: u64,

    /// Header carrying the client address.
    pub client_ip_header: String,

    pub list: WindowLimit,
    pub login: WindowLimit,
    pub upload: WindowLimit,
    pub delete: WindowLimit,
    pub object: WindowLimit,
}

impl RateLimitConfig {
    pub fn limit_for(&self, class: OperationClass) -> WindowLimit {
        match class {
            OperationClass::List => self.list,
            OperationClass::Login => self.login,
            OperationClass::Upload => self.upload,
            OperationClass::Delete => self.delete,
            OperationClass::ObjectFetch => self.object,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: None,
            store_timeout_ms: 500,
            client_ip_header: "CF-Connecting-IP".to_string(),
            list: WindowLimit::new(20, 60_000),
            login: WindowLimit::new(5, 60_000),
            upload: WindowLimit::new(10, 60_000),
            delete: WindowLimit::new(10, 60_000),
            object: WindowLimit::new(300, 60_000),
        }
    }
}

/// Object store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Filesystem,
}

/// Object storage and upload policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Root directory for the filesystem backend.
    pub root: String,

    /// Prepended to every object key.
    pub key_prefix: String,

    /// Comma-separated MIME types accepted on upload; empty allows all.
    pub allowed_file_types: String,

    /// Largest accepted upload in bytes.
    pub max_file_size_bytes: u64,

    /// Total bytes allowed under `key_prefix`.
    pub max_storage_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            root: "./data".to_string(),
            key_prefix: String::new(),
            allowed_file_types:
                "image/jpeg,image/png,image/gif,image/webp,video/mp4,video/webm,video/ogg"
                    .to_string(),
            max_file_size_bytes: 50 * 1024 * 1024,
            max_storage_bytes: 6 * 1024 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
