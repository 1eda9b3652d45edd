//! Filesystem object store.
//!
//! Layout under the root directory:
//! ```text
//! objects/<key>        object bytes
//! meta/<key>.json      ObjectInfo sidecar
//! ```
//! Writes go to a uniquely named temp file and are renamed into place, object
//! first and sidecar last, so a listed object always has its bytes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{check_key, ObjectInfo, ObjectMeta, ObjectStore, StorageError, StorageResult, StoredObject};
use crate::security::clock::Clock;

const OBJECTS_DIR: &str = "objects";
const META_DIR: &str = "meta";
const META_SUFFIX: &str = ".json";

#[derive(Debug)]
pub struct FilesystemObjectStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FilesystemObjectStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(OBJECTS_DIR)).await?;
        fs::create_dir_all(root.join(META_DIR)).await?;
        Ok(Self { root, clock })
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(OBJECTS_DIR).join(key))
    }

    fn meta_path(&self, key: &str) -> StorageResult<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(META_DIR).join(format!("{key}{META_SUFFIX}")))
    }

    async fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, path).await?;
        Ok(())
    }

    async fn read_info(&self, key: &str) -> StorageResult<ObjectInfo> {
        let raw = fs::read(self.meta_path(key)?).await.map_err(|e| not_found_or_io(e, key))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

fn not_found_or_io(e: std::io::Error, key: &str) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

async fn remove_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    #[tracing::instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let mut results = Vec::new();
        let mut stack = vec![self.root.join(META_DIR)];

        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                    continue;
                }
                // Symlinks and in-flight temp files are skipped.
                if !file_type.is_file() || !entry.file_name().to_string_lossy().ends_with(META_SUFFIX) {
                    continue;
                }
                let raw = fs::read(entry.path()).await?;
                match serde_json::from_slice::<ObjectInfo>(&raw) {
                    Ok(info) if info.key.starts_with(prefix) => results.push(info),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(path = ?entry.path(), error = %e, "Skipping unreadable metadata sidecar");
                    }
                }
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    #[tracing::instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<StoredObject> {
        let info = self.read_info(key).await?;
        let body = fs::read(self.object_path(key)?)
            .await
            .map_err(|e| not_found_or_io(e, key))?;
        Ok(StoredObject {
            info,
            body: Bytes::from(body),
        })
    }

    #[tracing::instrument(skip(self, body, meta), fields(backend = "filesystem", size = body.len()))]
    async fn put(&self, key: &str, body: Bytes, meta: ObjectMeta) -> StorageResult<ObjectInfo> {
        let object_path = self.object_path(key)?;
        let meta_path = self.meta_path(key)?;
        let info = ObjectInfo {
            key: key.to_string(),
            size: body.len() as u64,
            uploaded: self.clock.now_millis(),
            meta,
        };

        Self::write_atomic(&object_path, &body).await?;
        Self::write_atomic(&meta_path, &serde_json::to_vec(&info)?).await?;
        Ok(info)
    }

    #[tracing::instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, keys: &[String]) -> StorageResult<()> {
        let mut paths = Vec::with_capacity(keys.len());
        for key in keys {
            paths.push((self.meta_path(key)?, self.object_path(key)?));
        }
        for (meta_path, object_path) in paths {
            remove_if_exists(&meta_path).await?;
            remove_if_exists(&object_path).await?;
        }
        Ok(())
    }
}
