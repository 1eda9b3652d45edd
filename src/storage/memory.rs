//! In-memory object store.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use super::{check_key, ObjectInfo, ObjectMeta, ObjectStore, StorageError, StorageResult, StoredObject};
use crate::security::clock::Clock;

/// Ordered map of key to object. Contents are lost on restart.
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    clock: Arc<dyn Clock>,
}

impl MemoryObjectStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        Ok(self
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, object)| object.info.clone())
            .collect())
    }

    async fn get(&self, key: &str) -> StorageResult<StoredObject> {
        check_key(key)?;
        self.read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, body: Bytes, meta: ObjectMeta) -> StorageResult<ObjectInfo> {
        check_key(key)?;
        let info = ObjectInfo {
            key: key.to_string(),
            size: body.len() as u64,
            uploaded: self.clock.now_millis(),
            meta,
        };
        self.write().insert(
            key.to_string(),
            StoredObject {
                info: info.clone(),
                body,
            },
        );
        Ok(info)
    }

    async fn delete(&self, keys: &[String]) -> StorageResult<()> {
        for key in keys {
            check_key(key)?;
        }
        let mut objects = self.write();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::clock::ManualClock;

    fn store() -> MemoryObjectStore {
        MemoryObjectStore::new(Arc::new(ManualClock::new(5_000)))
    }

    #[tokio::test]
    async fn test_put_get_list_delete() {
        let store = store();
        store
            .put("g/a.png", Bytes::from_static(b"abc"), ObjectMeta::default())
            .await
            .unwrap();
        store
            .put("g/b.png", Bytes::from_static(b"defg"), ObjectMeta::default())
            .await
            .unwrap();
        store
            .put("other/c.png", Bytes::from_static(b"h"), ObjectMeta::default())
            .await
            .unwrap();

        let listed: Vec<_> = store.list("g/").await.unwrap().into_iter().map(|o| o.key).collect();
        assert_eq!(listed, vec!["g/a.png", "g/b.png"]);
        assert_eq!(store.usage("g/").await.unwrap(), 7);
        assert_eq!(store.usage("").await.unwrap(), 8);

        let object = store.get("g/a.png").await.unwrap();
        assert_eq!(object.body, Bytes::from_static(b"abc"));
        assert_eq!(object.info.uploaded, 5_000);

        store.delete(&["g/a.png".to_string(), "missing.png".to_string()]).await.unwrap();
        assert!(matches!(store.get("g/a.png").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let store = store();
        let err = store
            .put("../x", Bytes::new(), ObjectMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
