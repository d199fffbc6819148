//! FileService: user-owned blobs under `users/{user_id}/files/`.
//!
//! The pair (user id, filename) addresses exactly one object; uploading the
//! same pair again overwrites it. Nothing here checks that the user exists.

use crate::{
    keys,
    models::file::{FileInfo, SignedUrl},
    services::error::{ServiceError, ServiceResult},
    store::{DEFAULT_CONTENT_TYPE, ObjectInfo, ObjectStore},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, info};

/// Object metadata entry holding the RFC 3339 upload time.
///
/// Stores only report last-modified, so the upload time is persisted with the
/// object to let `get` return the same value `put` did.
pub const UPLOADED_AT_META: &str = "uploaded-at";

#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn ObjectStore>,
}

impl FileService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Write a blob, replacing any previous one under the same filename.
    pub async fn put(
        &self,
        user_id: &str,
        filename: &str,
        data: Bytes,
        content_type: Option<&str>,
        mut metadata: HashMap<String, String>,
    ) -> ServiceResult<FileInfo> {
        ensure_present(user_id, filename)?;
        let key = keys::file_key(user_id, filename);
        let content_type = content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let uploaded_at = Utc::now();
        metadata.insert(UPLOADED_AT_META.to_string(), uploaded_at.to_rfc3339());

        let stored = self
            .store
            .put(&key, data, content_type, metadata)
            .await
            .map_err(|e| ServiceError::write(format!("failed to upload {}", key), e))?;
        info!("uploaded {} ({} bytes)", key, stored.size);

        let mut file = describe(user_id, stored);
        file.uploaded_at = Some(uploaded_at);
        Ok(file)
    }

    /// Fetch a blob and the descriptor the store reports for it.
    pub async fn get(&self, user_id: &str, filename: &str) -> ServiceResult<(Bytes, FileInfo)> {
        ensure_present(user_id, filename)?;
        let key = keys::file_key(user_id, filename);
        let (data, info) = self.store.get(&key).await.map_err(|e| {
            ServiceError::read(format!("file {} of user {}", filename, user_id), e)
        })?;
        debug!("fetched {} ({} bytes)", key, data.len());
        Ok((data, describe(user_id, info)))
    }

    /// Delete a blob. Deleting a missing file succeeds.
    pub async fn delete(&self, user_id: &str, filename: &str) -> ServiceResult<()> {
        ensure_present(user_id, filename)?;
        let key = keys::file_key(user_id, filename);
        self.store
            .delete(&key)
            .await
            .map_err(|e| ServiceError::write(format!("failed to delete {}", key), e))?;
        info!("deleted {}", key);
        Ok(())
    }

    /// List a user's files with keys shown relative to the files prefix.
    pub async fn list(&self, user_id: &str) -> ServiceResult<Vec<FileInfo>> {
        if user_id.is_empty() {
            return Err(ServiceError::Validation("user id is required".into()));
        }
        let prefix = keys::files_prefix(user_id);
        let objects = self.store.list(&prefix).await.map_err(|e| {
            ServiceError::read(format!("failed to list files of user {}", user_id), e)
        })?;

        Ok(objects
            .into_iter()
            .map(|obj| {
                let mut file = describe(user_id, obj);
                file.key = keys::strip_files_prefix(&file.key, user_id).to_string();
                file
            })
            .collect())
    }

    /// URL that lets a client download the file directly from the store.
    pub async fn signed_download_url(
        &self,
        user_id: &str,
        filename: &str,
        ttl: Duration,
    ) -> ServiceResult<SignedUrl> {
        ensure_present(user_id, filename)?;
        let key = keys::file_key(user_id, filename);
        let url = self.store.sign_get(&key, ttl).await.map_err(|e| {
            ServiceError::read(format!("failed to sign download of {}", key), e)
        })?;
        Ok(SignedUrl {
            url,
            method: "GET",
            expires_in: ttl.as_secs(),
        })
    }

    /// URL that lets a client upload the file directly to the store.
    pub async fn signed_upload_url(
        &self,
        user_id: &str,
        filename: &str,
        ttl: Duration,
    ) -> ServiceResult<SignedUrl> {
        ensure_present(user_id, filename)?;
        let key = keys::file_key(user_id, filename);
        let url = self.store.sign_put(&key, ttl).await.map_err(|e| {
            ServiceError::write(format!("failed to sign upload of {}", key), e)
        })?;
        Ok(SignedUrl {
            url,
            method: "PUT",
            expires_in: ttl.as_secs(),
        })
    }
}

fn ensure_present(user_id: &str, filename: &str) -> ServiceResult<()> {
    if user_id.is_empty() || filename.is_empty() {
        return Err(ServiceError::Validation(
            "user id and filename are required".into(),
        ));
    }
    Ok(())
}

/// Turn store metadata into a file descriptor, lifting out the upload time.
fn describe(user_id: &str, mut obj: ObjectInfo) -> FileInfo {
    let uploaded_at = obj
        .metadata
        .remove(UPLOADED_AT_META)
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    FileInfo {
        filename: keys::filename_of(&obj.key).to_string(),
        key: obj.key,
        user_id: user_id.to_string(),
        content_type: obj.content_type,
        size: obj.size,
        etag: obj.etag,
        metadata: obj.metadata,
        uploaded_at,
        last_modified: obj.last_modified,
    }
}
