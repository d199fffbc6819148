//! S3Store: Amazon S3 (or S3-compatible) backend built on `aws-sdk-s3`.
//!
//! Credentials come from the default AWS provider chain. When a custom endpoint
//! is configured (MinIO, LocalStack), path-style addressing is forced.

use super::{
    ObjectInfo, ObjectStore, StoreError, StoreResult, signing_disabled, unquote_etag,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Region, retry::RetryConfig},
    error::DisplayErrorContext,
    operation::{get_object::GetObjectError, head_object::HeadObjectError},
    presigning::PresigningConfig,
    primitives::{ByteStream, DateTime as AwsDateTime},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, time::Duration};
use tracing::debug;

/// Connection settings for [`S3Store`].
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub region: String,
    pub bucket: String,
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,
    pub endpoint_url: Option<String>,
    pub signed_urls: bool,
}

pub struct S3Store {
    client: Client,
    bucket: String,
    signed_urls: bool,
}

impl S3Store {
    /// Load AWS configuration and build the client. Does not contact S3.
    pub async fn connect(settings: &S3Settings) -> Self {
        debug!(
            "Creating S3 client for bucket '{}' in region {}",
            settings.bucket, settings.region
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .retry_config(RetryConfig::standard().with_max_attempts(settings.max_attempts.max(1)));
        if let Some(endpoint) = settings.endpoint_url.as_deref() {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&config);
        if settings.endpoint_url.is_some() {
            builder = builder.force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
            signed_urls: settings.signed_urls,
        }
    }

    fn presigning(&self, ttl: Duration) -> StoreResult<PresigningConfig> {
        if !self.signed_urls {
            return Err(signing_disabled());
        }
        PresigningConfig::expires_in(ttl)
            .map_err(|e| StoreError::Backend(format!("invalid signed URL expiry: {}", e)))
    }
}

fn to_chrono(value: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(value.secs(), value.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3Store {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StoreResult<ObjectInfo> {
        let size = data.len() as i64;
        debug!("PUT {} ({} bytes, {})", key, size, content_type);

        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .set_metadata(Some(metadata.clone()))
            .send()
            .await
            .map_err(|e| {
                StoreError::Backend(format!("failed to put object: {}", DisplayErrorContext(&e)))
            })?;

        Ok(ObjectInfo {
            key: key.to_string(),
            content_type: Some(content_type.to_string()),
            size,
            etag: output.e_tag().map(unquote_etag),
            metadata,
            last_modified: Some(Utc::now()),
        })
    }

    async fn get(&self, key: &str) -> StoreResult<(Bytes, ObjectInfo)> {
        debug!("GET {}", key);

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                return Err(match err.into_service_error() {
                    GetObjectError::NoSuchKey(_) => StoreError::NotFound(key.to_string()),
                    other => StoreError::Backend(format!(
                        "failed to get object: {}",
                        DisplayErrorContext(&other)
                    )),
                });
            }
        };

        let info = ObjectInfo {
            key: key.to_string(),
            content_type: output.content_type().map(str::to_string),
            size: output.content_length().unwrap_or_default(),
            etag: output.e_tag().map(unquote_etag),
            metadata: output.metadata().cloned().unwrap_or_default(),
            last_modified: output.last_modified().and_then(to_chrono),
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Backend(format!("failed to read object body: {}", e)))?
            .into_bytes();

        Ok((data, info))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        debug!("DELETE {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StoreError::Backend(format!(
                    "failed to delete object: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    /// Follows continuation tokens until the listing is exhausted.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>> {
        debug!("LIST prefix={}", prefix);

        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    StoreError::Backend(format!(
                        "failed to list objects: {}",
                        DisplayErrorContext(&e)
                    ))
                })?;

            objects.extend(response.contents().iter().filter_map(|obj| {
                Some(ObjectInfo {
                    key: obj.key()?.to_string(),
                    size: obj.size().unwrap_or_default(),
                    etag: obj.e_tag().map(unquote_etag),
                    last_modified: obj.last_modified().and_then(to_chrono),
                    ..ObjectInfo::default()
                })
            }));

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        debug!("HEAD {}", key);

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => match err.into_service_error() {
                HeadObjectError::NotFound(_) => Ok(false),
                other => Err(StoreError::Backend(format!(
                    "failed to check object existence: {}",
                    DisplayErrorContext(&other)
                ))),
            },
        }
    }

    async fn sign_get(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        let config = self.presigning(ttl)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| {
                StoreError::Backend(format!(
                    "failed to generate signed URL: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(request.uri().to_string())
    }

    async fn sign_put(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        let config = self.presigning(ttl)?;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| {
                StoreError::Backend(format!(
                    "failed to generate signed upload URL: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(request.uri().to_string())
    }
}
