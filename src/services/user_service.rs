//! UserService: user profile records stored as JSON objects.
//!
//! Each profile lives at `users/{id}/profile.json`. There is no index: listing
//! users means listing `users/` and keeping profile-shaped keys. Updates are
//! read-modify-write without any version check, so concurrent writers race and
//! the last one to reach the store wins.

use crate::{
    keys,
    models::user::{CreateUserRequest, UpdateUserRequest, User},
    services::error::{ServiceError, ServiceResult},
    store::{ObjectStore, StoreError},
};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use futures::{StreamExt, stream};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, warn};
use uuid::Uuid;

const PROFILE_CONTENT_TYPE: &str = "application/json";

/// Profiles fetched concurrently while listing.
const LIST_FETCH_CONCURRENCY: usize = 8;

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn ObjectStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Create a user with a fresh id and equal creation/update timestamps.
    pub async fn create(&self, req: CreateUserRequest) -> ServiceResult<User> {
        if req.email.is_empty() || req.name.is_empty() {
            return Err(ServiceError::Validation(
                "email and name are required".into(),
            ));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: req.email,
            name: req.name,
            metadata: req.metadata,
            created_at: now,
            updated_at: now,
        };

        self.save(&user)
            .await
            .map_err(|e| ServiceError::write(format!("failed to save user {}", user.id), e))?;
        info!("created user {}", user.id);
        Ok(user)
    }

    /// Fetch a user. The existence probe separates "absent" from store failures.
    pub async fn get(&self, user_id: &str) -> ServiceResult<User> {
        ensure_user_id(user_id)?;
        if !self.exists(user_id).await? {
            return Err(user_not_found(user_id));
        }

        let key = keys::profile_key(user_id);
        let (data, _) = self
            .store
            .get(&key)
            .await
            .map_err(|e| ServiceError::read(format!("failed to get user {}", user_id), e))?;

        serde_json::from_slice(&data).map_err(|e| {
            ServiceError::Deserialization(format!("failed to decode user {}: {}", user_id, e))
        })
    }

    /// Apply a partial update. Empty `email`/`name` leave the stored value alone.
    pub async fn update(&self, user_id: &str, req: UpdateUserRequest) -> ServiceResult<User> {
        let mut user = self.get(user_id).await?;
        let req = req.normalized();

        if let Some(email) = req.email {
            user.email = email;
        }
        if let Some(name) = req.name {
            user.name = name;
        }
        if let Some(metadata) = req.metadata {
            user.metadata = metadata;
        }
        user.updated_at = next_timestamp(user.updated_at);

        self.save(&user)
            .await
            .map_err(|e| ServiceError::write(format!("failed to update user {}", user_id), e))?;
        debug!("updated user {}", user_id);
        Ok(user)
    }

    /// Delete the profile, then every file under the user's prefix.
    ///
    /// Not atomic: the first failed delete aborts the cascade and is returned,
    /// possibly leaving the profile gone and some files behind.
    pub async fn delete(&self, user_id: &str) -> ServiceResult<()> {
        ensure_user_id(user_id)?;
        if !self.exists(user_id).await? {
            return Err(user_not_found(user_id));
        }

        self.store
            .delete(&keys::profile_key(user_id))
            .await
            .map_err(|e| {
                ServiceError::write(format!("failed to delete profile of user {}", user_id), e)
            })?;

        let prefix = keys::files_prefix(user_id);
        let files = self.store.list(&prefix).await.map_err(|e| {
            ServiceError::read(format!("failed to list files of user {}", user_id), e)
        })?;

        for file in &files {
            self.store.delete(&file.key).await.map_err(|e| {
                ServiceError::write(format!("failed to delete user file {}", file.key), e)
            })?;
        }

        info!("deleted user {} and {} file(s)", user_id, files.len());
        Ok(())
    }

    /// Best-effort listing of every readable profile, in store key order.
    ///
    /// Profiles that cannot be fetched or decoded are logged and skipped, so one
    /// corrupt record never fails the whole listing.
    pub async fn list(&self) -> ServiceResult<Vec<User>> {
        let objects = self
            .store
            .list(keys::USERS_PREFIX)
            .await
            .map_err(|e| ServiceError::read("failed to list users", e))?;

        let profile_keys: Vec<String> = objects
            .into_iter()
            .filter(|obj| keys::profile_owner(&obj.key).is_some())
            .map(|obj| obj.key)
            .collect();

        let fetched: Vec<Option<User>> = stream::iter(profile_keys)
            .map(|key| {
                let store = self.store.clone();
                async move { load_profile(store.as_ref(), &key).await }
            })
            .buffered(LIST_FETCH_CONCURRENCY)
            .collect()
            .await;

        Ok(fetched.into_iter().flatten().collect())
    }

    pub async fn exists(&self, user_id: &str) -> ServiceResult<bool> {
        ensure_user_id(user_id)?;
        self.store
            .exists(&keys::profile_key(user_id))
            .await
            .map_err(|e| ServiceError::read(format!("failed to check user {}", user_id), e))
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let data = serde_json::to_vec(user)?;
        self.store
            .put(
                &keys::profile_key(&user.id),
                Bytes::from(data),
                PROFILE_CONTENT_TYPE,
                HashMap::new(),
            )
            .await?;
        Ok(())
    }
}

async fn load_profile(store: &dyn ObjectStore, key: &str) -> Option<User> {
    let data = match store.get(key).await {
        Ok((data, _)) => data,
        Err(err) => {
            warn!("skipping profile {}: {}", key, err);
            return None;
        }
    };
    match serde_json::from_slice(&data) {
        Ok(user) => Some(user),
        Err(err) => {
            warn!("skipping corrupt profile {}: {}", key, err);
            None
        }
    }
}

fn ensure_user_id(user_id: &str) -> ServiceResult<()> {
    if user_id.is_empty() {
        return Err(ServiceError::Validation("user id is required".into()));
    }
    Ok(())
}

fn user_not_found(user_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("user {} not found", user_id))
}

/// Current time, nudged forward so it is strictly after `previous`.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{memory::MemoryStore, testing::FailingStore};

    fn service() -> (Arc<MemoryStore>, UserService) {
        let store = Arc::new(MemoryStore::new(false));
        (store.clone(), UserService::new(store))
    }

    fn request(email: &str, name: &str) -> CreateUserRequest {
        CreateUserRequest {
            email: email.into(),
            name: name.into(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn create_assigns_unique_ids_and_equal_timestamps() {
        let (_, users) = service();
        let a = users.create(request("a@example.com", "A")).await.unwrap();
        let b = users.create(request("a@example.com", "A")).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
        assert_eq!(b.created_at, b.updated_at);
    }

    #[tokio::test]
    async fn create_requires_email_and_name() {
        let (_, users) = service();
        assert!(matches!(
            users.create(request("", "A")).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            users.create(request("a@example.com", "")).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn get_returns_what_create_returned() {
        let (store, users) = service();
        let mut req = request("a@example.com", "A");
        req.metadata.insert("plan".into(), "pro".into());
        let created = users.create(req).await.unwrap();

        assert_eq!(users.get(&created.id).await.unwrap(), created);
        assert!(store.exists(&keys::profile_key(&created.id)).await.unwrap());
    }

    #[tokio::test]
    async fn get_missing_and_corrupt_profiles() {
        let (store, users) = service();
        assert!(matches!(
            users.get("ghost").await,
            Err(ServiceError::NotFound(_))
        ));

        store.insert_raw("users/bad/profile.json", b"{not json").await;
        assert!(matches!(
            users.get("bad").await,
            Err(ServiceError::Deserialization(_))
        ));
    }

    #[tokio::test]
    async fn update_ignores_empty_fields_and_advances_updated_at() {
        let (_, users) = service();
        let created = users.create(request("a@example.com", "A")).await.unwrap();

        let unchanged = users
            .update(
                &created.id,
                UpdateUserRequest {
                    email: Some(String::new()),
                    name: None,
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(unchanged.email, "a@example.com");
        assert_eq!(unchanged.name, "A");
        assert!(unchanged.updated_at > created.updated_at);
        assert_eq!(unchanged.created_at, created.created_at);

        let changed = users
            .update(
                &created.id,
                UpdateUserRequest {
                    email: Some("b@example.com".into()),
                    name: Some(String::new()),
                    metadata: Some(HashMap::from([("k".into(), "v".into())])),
                },
            )
            .await
            .unwrap();
        assert_eq!(changed.email, "b@example.com");
        assert_eq!(changed.name, "A");
        assert_eq!(changed.metadata.get("k").map(String::as_str), Some("v"));
        assert!(changed.updated_at > unchanged.updated_at);
        assert_eq!(users.get(&created.id).await.unwrap(), changed);
    }

    #[tokio::test]
    async fn update_missing_user_is_not_found() {
        let (_, users) = service();
        assert!(matches!(
            users.update("ghost", UpdateUserRequest::default()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_cascades_to_files() {
        let (store, users) = service();
        let user = users.create(request("a@example.com", "A")).await.unwrap();
        for name in ["a.txt", "b.txt"] {
            store
                .put(
                    &keys::file_key(&user.id, name),
                    Bytes::from_static(b"x"),
                    "text/plain",
                    HashMap::new(),
                )
                .await
                .unwrap();
        }

        users.delete(&user.id).await.unwrap();

        assert!(matches!(
            users.get(&user.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(store.list(&keys::files_prefix(&user.id)).await.unwrap().is_empty());
        assert!(matches!(
            users.delete(&user.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_aborts_on_first_file_failure() {
        let inner = Arc::new(MemoryStore::new(false));
        let store = Arc::new(FailingStore::new(inner.clone()).fail_delete("b.txt"));
        let users = UserService::new(store);
        let user = users.create(request("a@example.com", "A")).await.unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            inner
                .put(
                    &keys::file_key(&user.id, name),
                    Bytes::from_static(b"x"),
                    "text/plain",
                    HashMap::new(),
                )
                .await
                .unwrap();
        }

        let err = users.delete(&user.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::StorageWrite(msg) if msg.contains("b.txt")));

        // Profile and the first file are gone, the rest are orphaned.
        assert!(!inner.exists(&keys::profile_key(&user.id)).await.unwrap());
        let left: Vec<String> = inner
            .list(&keys::files_prefix(&user.id))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(
            left,
            vec![
                keys::file_key(&user.id, "b.txt"),
                keys::file_key(&user.id, "c.txt")
            ]
        );
    }

    #[tokio::test]
    async fn list_skips_corrupt_profiles_and_user_files() {
        let (store, users) = service();
        let a = users.create(request("a@example.com", "A")).await.unwrap();
        let b = users.create(request("b@example.com", "B")).await.unwrap();
        store.insert_raw("users/broken/profile.json", b"garbage").await;
        store
            .insert_raw(&keys::file_key(&a.id, "profile.json"), b"not a profile")
            .await;

        let mut ids: Vec<String> = users.list().await.unwrap().into_iter().map(|u| u.id).collect();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn list_surfaces_store_listing_failures() {
        let inner = Arc::new(MemoryStore::new(false));
        let users = UserService::new(Arc::new(FailingStore::new(inner).fail_list("users/")));
        assert!(matches!(
            users.list().await,
            Err(ServiceError::StorageRead(_))
        ));
    }

    #[tokio::test]
    async fn create_surfaces_write_failures() {
        let inner = Arc::new(MemoryStore::new(false));
        let users = UserService::new(Arc::new(FailingStore::new(inner).fail_put("profile.json")));
        assert!(matches!(
            users.create(request("a@example.com", "A")).await,
            Err(ServiceError::StorageWrite(_))
        ));
        assert!(users.list().await.unwrap().is_empty());
    }
}
