//! Object storage behind the gallery handlers.
//!
//! # Responsibilities
//! - Define the `ObjectStore` seam the handlers talk to
//! - Carry per-object metadata (content type, custom metadata, upload time)
//! - Provide in-memory and filesystem backends
//!
//! # Design Decisions
//! - Keys reaching a backend are already sanitized; backends re-check anyway
//!   and report `InvalidKey` instead of touching the filesystem
//! - Deleting a missing key is not an error
//! - `usage` defaults to summing a listing; backends may override

pub mod filesystem;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};
use crate::security::clock::Clock;

pub use filesystem::FilesystemObjectStore;
pub use memory::MemoryObjectStore;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Metadata supplied when writing an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub content_type: Option<String>,
    #[serde(default)]
    pub custom_metadata: BTreeMap<String, String>,
}

/// A stored object's listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    /// Upload time in epoch milliseconds.
    pub uploaded: u64,
    #[serde(flatten)]
    pub meta: ObjectMeta,
}

/// An object's body together with its listing entry.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub info: ObjectInfo,
    pub body: Bytes,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// All objects whose key starts with `prefix`, ordered by key.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    async fn get(&self, key: &str) -> StorageResult<StoredObject>;

    async fn put(&self, key: &str, body: Bytes, meta: ObjectMeta) -> StorageResult<ObjectInfo>;

    async fn delete(&self, keys: &[String]) -> StorageResult<()>;

    /// Total bytes stored under `prefix`.
    async fn usage(&self, prefix: &str) -> StorageResult<u64> {
        Ok(self.list(prefix).await?.iter().map(|o| o.size).sum())
    }
}

/// Build the backend selected by configuration.
pub async fn store_from_config(
    config: &StorageConfig,
    clock: Arc<dyn Clock>,
) -> StorageResult<Arc<dyn ObjectStore>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory object store");
            Ok(Arc::new(MemoryObjectStore::new(clock)))
        }
        StorageBackend::Filesystem => {
            let store = FilesystemObjectStore::new(&config.root, clock).await?;
            tracing::info!(root = %config.root, "Using filesystem object store");
            Ok(Arc::new(store))
        }
    }
}

/// Reject keys a backend must never map to a location.
pub(crate) fn check_key(key: &str) -> StorageResult<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.starts_with('\\')
        || key.split(['/', '\\']).any(|s| s.is_empty() || s == "." || s == "..");
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
