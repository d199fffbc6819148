//! Descriptors for user-owned files.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Metadata view of a stored file. The payload itself is never part of it.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FileInfo {
    /// Store key. Listings show it relative to the user's files prefix.
    pub key: String,

    pub user_id: String,

    /// Trailing path segment of the key.
    pub filename: String,

    /// MIME type. Listings do not report it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size: i64,

    /// Integrity tag assigned by the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,

    /// When the current version was uploaded, if the store recorded it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Response body of `GET /api/v1/files/{user_id}`.
#[derive(Serialize, Debug)]
pub struct FileList {
    pub files: Vec<FileInfo>,
    pub count: usize,
}

impl From<Vec<FileInfo>> for FileList {
    fn from(files: Vec<FileInfo>) -> Self {
        Self {
            count: files.len(),
            files,
        }
    }
}

/// A time-limited URL handed to clients for direct store access.
#[derive(Serialize, Clone, Debug)]
pub struct SignedUrl {
    pub url: String,
    /// HTTP method the URL is valid for.
    pub method: &'static str,
    /// Lifetime in seconds.
    pub expires_in: u64,
}
