//! Store wrapper that injects failures for selected keys.

use super::{ObjectInfo, ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::{collections::HashMap, sync::Arc, time::Duration};

/// Delegates to an inner store, failing operations whose key contains a marker.
pub struct FailingStore {
    inner: Arc<dyn ObjectStore>,
    fail_put: Option<String>,
    fail_delete: Option<String>,
    fail_list: Option<String>,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            fail_put: None,
            fail_delete: None,
            fail_list: None,
        }
    }

    pub fn fail_put(mut self, marker: &str) -> Self {
        self.fail_put = Some(marker.to_string());
        self
    }

    pub fn fail_delete(mut self, marker: &str) -> Self {
        self.fail_delete = Some(marker.to_string());
        self
    }

    pub fn fail_list(mut self, marker: &str) -> Self {
        self.fail_list = Some(marker.to_string());
        self
    }

    fn check(marker: &Option<String>, op: &str, key: &str) -> StoreResult<()> {
        match marker {
            Some(m) if key.contains(m.as_str()) => Err(StoreError::Backend(format!(
                "injected {} failure for {}",
                op, key
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StoreResult<ObjectInfo> {
        Self::check(&self.fail_put, "put", key)?;
        self.inner.put(key, data, content_type, metadata).await
    }

    async fn get(&self, key: &str) -> StoreResult<(Bytes, ObjectInfo)> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        Self::check(&self.fail_delete, "delete", key)?;
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>> {
        Self::check(&self.fail_list, "list", prefix)?;
        self.inner.list(prefix).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }

    async fn sign_get(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        self.inner.sign_get(key, ttl).await
    }

    async fn sign_put(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        self.inner.sign_put(key, ttl).await
    }
}
