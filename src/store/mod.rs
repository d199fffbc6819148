//! Object store abstraction.
//!
//! Repositories only ever talk to an [`ObjectStore`]: a flat key/blob store with
//! prefix listing, existence probes, and optional signed URLs. Backends:
//! - [`s3::S3Store`]: Amazon S3 or any S3-compatible endpoint
//! - [`local::LocalStore`]: files on local disk, for development
//! - [`memory::MemoryStore`]: in-process map, for tests and demos

pub mod local;
pub mod memory;
pub mod s3;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, io, time::Duration};
use thiserror::Error;

/// Content type used when a caller does not supply one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata the store reports about one object.
///
/// Which fields are populated depends on the call: listings usually carry only
/// key, size, etag, and last-modified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub content_type: Option<String>,
    pub size: i64,
    /// Integrity tag assigned by the store, without surrounding quotes.
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("{0}")]
    FeatureDisabled(String),
    #[error("{0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Flat key/blob store used as the only persistence layer.
///
/// Implementations must be cheap to share behind an `Arc` and safe to call from
/// many request tasks at once. Read-after-write consistency is assumed.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Short backend name for logs and readiness output.
    fn backend(&self) -> &'static str;

    /// Write `data` at `key`, replacing any existing object.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StoreResult<ObjectInfo>;

    /// Fetch an object. Missing keys yield [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> StoreResult<(Bytes, ObjectInfo)>;

    /// Remove an object. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Every object whose key starts with `prefix`, in key order.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Time-limited URL that allows a GET of `key` without credentials.
    async fn sign_get(&self, key: &str, ttl: Duration) -> StoreResult<String>;

    /// Time-limited URL that allows a PUT to `key` without credentials.
    async fn sign_put(&self, key: &str, ttl: Duration) -> StoreResult<String>;
}

pub(crate) fn signing_disabled() -> StoreError {
    StoreError::FeatureDisabled("signed URLs are disabled".into())
}

/// Remove the quotes S3-style stores wrap around entity tags.
pub(crate) fn unquote_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}
