//! In-process object store backed by a sorted map.

use super::{ObjectInfo, ObjectStore, StoreError, StoreResult, signing_disabled};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{collections::BTreeMap, collections::HashMap, time::Duration};
use tokio::sync::RwLock;

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    info: ObjectInfo,
}

/// Keeps every object in memory. Contents are lost when the process exits.
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    signed_urls: bool,
}

impl MemoryStore {
    pub fn new(signed_urls: bool) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            signed_urls,
        }
    }

    /// Store raw bytes without going through `put`, e.g. to plant a corrupt record.
    #[cfg(test)]
    pub async fn insert_raw(&self, key: &str, data: &[u8]) {
        let info = ObjectInfo {
            key: key.to_string(),
            size: data.len() as i64,
            last_modified: Some(Utc::now()),
            ..ObjectInfo::default()
        };
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data: Bytes::copy_from_slice(data),
                info,
            },
        );
    }

    fn signed_url(&self, method: &str, key: &str, ttl: Duration) -> StoreResult<String> {
        if !self.signed_urls {
            return Err(signing_disabled());
        }
        Ok(format!(
            "memory:///{}?method={}&expires_in={}",
            key,
            method,
            ttl.as_secs()
        ))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StoreResult<ObjectInfo> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let info = ObjectInfo {
            key: key.to_string(),
            content_type: Some(content_type.to_string()),
            size: data.len() as i64,
            etag: Some(format!("{:x}", md5::compute(&data))),
            metadata,
            last_modified: Some(Utc::now()),
        };
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                info: info.clone(),
            },
        );
        Ok(info)
    }

    async fn get(&self, key: &str) -> StoreResult<(Bytes, ObjectInfo)> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|obj| (obj.data.clone(), obj.info.clone()))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, obj)| ObjectInfo {
                key: obj.info.key.clone(),
                size: obj.info.size,
                etag: obj.info.etag.clone(),
                last_modified: obj.info.last_modified,
                ..ObjectInfo::default()
            })
            .collect())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn sign_get(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        self.signed_url("GET", key, ttl)
    }

    async fn sign_put(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        self.signed_url("PUT", key, ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_is_prefix_scoped_and_sorted() {
        let store = MemoryStore::new(false);
        for key in ["users/b/x", "users/a/y", "users/a/x", "usersz/a"] {
            store
                .put(key, Bytes::from_static(b"1"), "text/plain", HashMap::new())
                .await
                .unwrap();
        }

        let keys: Vec<String> = store
            .list("users/a/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["users/a/x", "users/a/y"]);
        assert_eq!(store.list("users/").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_keys_and_idempotent_delete() {
        let store = MemoryStore::new(false);
        assert!(matches!(
            store.get("nope").await,
            Err(StoreError::NotFound(key)) if key == "nope"
        ));
        store.delete("nope").await.unwrap();
        assert!(!store.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn etag_tracks_content() {
        let store = MemoryStore::new(false);
        let first = store
            .put("k", Bytes::from_static(b"one"), "text/plain", HashMap::new())
            .await
            .unwrap();
        let second = store
            .put("k", Bytes::from_static(b"two"), "text/plain", HashMap::new())
            .await
            .unwrap();
        assert_ne!(first.etag, second.etag);
        assert_eq!(first.etag.as_deref(), Some("f97c5d29941bfb1b2fdab0874906ab82"));
    }

    #[tokio::test]
    async fn signing_follows_flag() {
        let disabled = MemoryStore::new(false);
        assert!(matches!(
            disabled.sign_get("k", Duration::from_secs(60)).await,
            Err(StoreError::FeatureDisabled(_))
        ));

        let enabled = MemoryStore::new(true);
        let url = enabled.sign_put("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(url, "memory:///k?method=PUT&expires_in=60");
    }
}
