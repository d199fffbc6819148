//! LocalStore: object store on local disk.
//!
//! Keys form a flat namespace, so `docs` and `docs/a.txt` may both exist. On disk
//! every key segment but the last becomes a directory named `{segment}.d` and
//! the last becomes a file named `{segment}.o`; a file and a directory can never
//! share a name, and no segment resolves to `.` or `..`.
//!
//! Payloads live under `base_path/objects` and their metadata in a JSON sidecar
//! at the same encoded path under `base_path/meta`. Both are staged as fsynced
//! temp files in `base_path/tmp` before being renamed into place. If the sidecar
//! cannot be committed the new payload is removed again, so a payload is never
//! left paired with metadata from another write. The entity tag is the MD5 of
//! the payload.

use super::{ObjectInfo, ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const DIR_SUFFIX: &str = ".d";
const OBJECT_SUFFIX: &str = ".o";

/// Sidecar record persisted next to each payload.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    size: i64,
    etag: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    last_modified: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct LocalStore {
    /// Root directory holding `objects/`, `meta/`, and `tmp/`.
    pub base_path: PathBuf,
}

fn is_bad_segment(seg: &str) -> bool {
    seg.is_empty() || seg == "." || seg == ".."
}

fn has_forbidden_bytes(value: &str) -> bool {
    value
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
}

/// Directory holding the objects whose keys start with `{dir_key}/`.
fn encode_dir(root: &Path, dir_key: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    if !dir_key.is_empty() {
        for seg in dir_key.split('/') {
            path.push(format!("{seg}{DIR_SUFFIX}"));
        }
    }
    path
}

/// On-disk location of `key` under `root`.
fn encode_key(root: &Path, key: &str) -> PathBuf {
    match key.rsplit_once('/') {
        Some((dir_key, name)) => encode_dir(root, dir_key).join(format!("{name}{OBJECT_SUFFIX}")),
        None => root.join(format!("{key}{OBJECT_SUFFIX}")),
    }
}

/// Inverse of [`encode_key`]. Paths that do not follow the layout yield `None`.
fn decode_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut components = relative.components().peekable();
    let mut segments = Vec::new();
    while let Some(component) = components.next() {
        let Component::Normal(name) = component else {
            return None;
        };
        let name = name.to_str()?;
        let suffix = if components.peek().is_some() {
            DIR_SUFFIX
        } else {
            OBJECT_SUFFIX
        };
        segments.push(name.strip_suffix(suffix)?);
    }
    (!segments.is_empty()).then(|| segments.join("/"))
}

impl LocalStore {
    /// Create the directory layout under `base_path` if it is missing.
    pub async fn open(base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self {
            base_path: base_path.into(),
        };
        fs::create_dir_all(store.objects_root()).await?;
        fs::create_dir_all(store.meta_root()).await?;
        fs::create_dir_all(store.tmp_root()).await?;
        Ok(store)
    }

    fn objects_root(&self) -> PathBuf {
        self.base_path.join("objects")
    }

    fn meta_root(&self) -> PathBuf {
        self.base_path.join("meta")
    }

    fn tmp_root(&self) -> PathBuf {
        self.base_path.join("tmp")
    }

    /// Reject keys that would escape the base directory or cannot map to a path.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.split('/').any(is_bad_segment)
            || has_forbidden_bytes(key);
        if invalid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Same rules for list prefixes. The empty prefix and a trailing `/` are allowed.
    fn ensure_prefix_safe(&self, prefix: &str) -> StoreResult<()> {
        let (dir_part, tail) = prefix.rsplit_once('/').unwrap_or(("", prefix));
        let invalid = prefix.len() > MAX_OBJECT_KEY_LEN
            || prefix.starts_with('/')
            || (prefix.contains('/') && dir_part.split('/').any(is_bad_segment))
            || tail == "."
            || tail == ".."
            || has_forbidden_bytes(prefix);
        if invalid {
            return Err(StoreError::InvalidKey(prefix.to_string()));
        }
        Ok(())
    }

    fn object_path(&self, key: &str) -> PathBuf {
        encode_key(&self.objects_root(), key)
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        encode_key(&self.meta_root(), key)
    }

    /// Write `data` to a fresh temp file and fsync it.
    async fn stage(&self, data: &[u8]) -> StoreResult<PathBuf> {
        let tmp_path = self.tmp_root().join(format!(".tmp-{}", Uuid::new_v4()));
        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        Ok(tmp_path)
    }

    /// Rename a staged file over `dest`. The staged file is removed on failure.
    async fn commit(&self, staged: &Path, dest: &Path) -> StoreResult<()> {
        let result = async {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::rename(staged, dest).await
        }
        .await;
        if let Err(err) = result {
            let _ = fs::remove_file(staged).await;
            return Err(StoreError::Io(err));
        }
        Ok(())
    }

    async fn read_sidecar(&self, key: &str) -> StoreResult<Option<Sidecar>> {
        match fs::read(self.sidecar_path(key)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Build an `ObjectInfo` from the sidecar, falling back to file metadata.
    async fn describe(&self, key: &str, path: &Path) -> StoreResult<ObjectInfo> {
        if let Some(sidecar) = self.read_sidecar(key).await? {
            return Ok(ObjectInfo {
                key: key.to_string(),
                content_type: Some(sidecar.content_type),
                size: sidecar.size,
                etag: Some(sidecar.etag),
                metadata: sidecar.metadata,
                last_modified: Some(sidecar.last_modified),
            });
        }
        let meta = fs::metadata(path).await?;
        Ok(ObjectInfo {
            key: key.to_string(),
            size: meta.len() as i64,
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
            ..ObjectInfo::default()
        })
    }

    async fn remove_if_present(path: &Path) -> StoreResult<()> {
        match fs::remove_file(path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", path.display());
                Ok(())
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Remove empty directories from `start` upwards, stopping at `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StoreResult<ObjectInfo> {
        self.ensure_key_safe(key)?;

        let sidecar = Sidecar {
            content_type: content_type.to_string(),
            size: data.len() as i64,
            etag: format!("{:x}", md5::compute(&data)),
            metadata,
            last_modified: Utc::now(),
        };

        let object_path = self.object_path(key);
        let staged_payload = self.stage(&data).await?;
        let staged_sidecar = match self.stage(&serde_json::to_vec(&sidecar)?).await {
            Ok(path) => path,
            Err(err) => {
                let _ = fs::remove_file(&staged_payload).await;
                return Err(err);
            }
        };

        if let Err(err) = self.commit(&staged_payload, &object_path).await {
            let _ = fs::remove_file(&staged_sidecar).await;
            return Err(err);
        }
        if let Err(err) = self.commit(&staged_sidecar, &self.sidecar_path(key)).await {
            warn!("sidecar commit for {} failed, removing payload: {}", key, err);
            let _ = fs::remove_file(&object_path).await;
            if let Some(parent) = object_path.parent() {
                self.prune_empty_dirs(parent, &self.objects_root()).await;
            }
            return Err(err);
        }
        debug!("stored {} ({} bytes)", key, sidecar.size);

        Ok(ObjectInfo {
            key: key.to_string(),
            content_type: Some(sidecar.content_type),
            size: sidecar.size,
            etag: Some(sidecar.etag),
            metadata: sidecar.metadata,
            last_modified: Some(sidecar.last_modified),
        })
    }

    async fn get(&self, key: &str) -> StoreResult<(Bytes, ObjectInfo)> {
        self.ensure_key_safe(key)?;
        let path = self.object_path(key);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(err) => return Err(StoreError::Io(err)),
        };
        let info = self.describe(key, &path).await?;
        Ok((Bytes::from(data), info))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.ensure_key_safe(key)?;
        let object_path = self.object_path(key);
        let sidecar_path = self.sidecar_path(key);
        Self::remove_if_present(&object_path).await?;
        Self::remove_if_present(&sidecar_path).await?;

        if let Some(parent) = object_path.parent() {
            self.prune_empty_dirs(parent, &self.objects_root()).await;
        }
        if let Some(parent) = sidecar_path.parent() {
            self.prune_empty_dirs(parent, &self.meta_root()).await;
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>> {
        self.ensure_prefix_safe(prefix)?;

        // Only walk the deepest directory the prefix pins down.
        let root = self.objects_root();
        let start_dir = match prefix.rsplit_once('/') {
            Some((dir_key, _)) => encode_dir(&root, dir_key),
            None => root.clone(),
        };

        let mut pending = vec![start_dir];
        let mut found = Vec::new();
        while let Some(dir) = pending.pop() {
            if !dir.starts_with(&root) {
                continue;
            }
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                    continue;
                }
                Err(err) => return Err(StoreError::Io(err)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                match decode_key(&root, &path) {
                    Some(key) if key.starts_with(prefix) => found.push((key, path)),
                    Some(_) => {}
                    None => debug!("skipping stray file {}", path.display()),
                }
            }
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        let mut objects = Vec::with_capacity(found.len());
        for (key, path) in found {
            let mut info = self.describe(&key, &path).await?;
            info.content_type = None;
            info.metadata.clear();
            objects.push(info);
        }
        Ok(objects)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.ensure_key_safe(key)?;
        match fs::metadata(self.object_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                Ok(false)
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn sign_get(&self, _key: &str, _ttl: Duration) -> StoreResult<String> {
        Err(StoreError::FeatureDisabled(
            "signed URLs are not supported by the local backend".into(),
        ))
    }

    async fn sign_put(&self, _key: &str, _ttl: Duration) -> StoreResult<String> {
        Err(StoreError::FeatureDisabled(
            "signed URLs are not supported by the local backend".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_payload_and_metadata() {
        let (_dir, store) = store().await;
        let metadata = HashMap::from([("user-id".to_string(), "u1".to_string())]);
        let put = store
            .put(
                "users/u1/files/a.txt",
                Bytes::from_static(b"hello"),
                "text/plain",
                metadata.clone(),
            )
            .await
            .unwrap();
        assert_eq!(put.etag.as_deref(), Some("5d41402abc4b2a76b9719d911017c592"));
        assert_eq!(put.size, 5);

        let (data, info) = store.get("users/u1/files/a.txt").await.unwrap();
        assert_eq!(&data[..], b"hello");
        assert_eq!(info.content_type.as_deref(), Some("text/plain"));
        assert_eq!(info.metadata, metadata);
        assert_eq!(info.etag, put.etag);
    }

    #[tokio::test]
    async fn missing_objects() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.get("users/u1/profile.json").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(!store.exists("users/u1/profile.json").await.unwrap());
        store.delete("users/u1/profile.json").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_the_base_dir() {
        let (_dir, store) = store().await;
        for key in ["../etc/passwd", "/abs", "users/u1/files/", "a//b", ""] {
            assert!(
                matches!(
                    store
                        .put(key, Bytes::from_static(b"x"), "text/plain", HashMap::new())
                        .await,
                    Err(StoreError::InvalidKey(_))
                ),
                "{key} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn list_filters_by_prefix_and_delete_prunes_dirs() {
        let (dir, store) = store().await;
        for key in [
            "users/u1/profile.json",
            "users/u1/files/b.txt",
            "users/u1/files/a.txt",
            "users/u2/files/c.txt",
        ] {
            store
                .put(key, Bytes::from_static(b"x"), "text/plain", HashMap::new())
                .await
                .unwrap();
        }

        let keys: Vec<String> = store
            .list("users/u1/files/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["users/u1/files/a.txt", "users/u1/files/b.txt"]);
        assert_eq!(store.list("users/").await.unwrap().len(), 4);
        assert!(store.list("nothing/here/").await.unwrap().is_empty());

        store.delete("users/u2/files/c.txt").await.unwrap();
        assert!(!dir.path().join("objects/users.d/u2.d").exists());
        assert!(!dir.path().join("meta/users.d/u2.d").exists());
        assert!(dir.path().join("objects/users.d/u1.d/files.d/a.txt.o").is_file());
    }

    #[tokio::test]
    async fn list_rejects_prefixes_that_escape_the_base_dir() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path().join("base")).await.unwrap();
        let secret = dir.path().join("secret/files");
        std::fs::create_dir_all(&secret).unwrap();
        std::fs::write(secret.join("passwd.txt"), b"root:x:0:0").unwrap();

        for prefix in [
            "users/../../../secret/files/",
            "users/./u1/",
            "users//files/",
            "/etc/",
            "users/..",
            "users/u1\\files/",
        ] {
            assert!(
                matches!(store.list(prefix).await, Err(StoreError::InvalidKey(_))),
                "{prefix} should be rejected"
            );
        }
        assert!(store.list("").await.unwrap().is_empty());
        assert!(store.list("users/u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn directory_like_keys_behave_as_flat_keys() {
        let (_dir, store) = store().await;
        store
            .put(
                "users/u1/files/docs/a.txt",
                Bytes::from_static(b"nested"),
                "text/plain",
                HashMap::new(),
            )
            .await
            .unwrap();

        assert!(matches!(
            store.get("users/u1/files/docs").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(!store.exists("users/u1/files/docs").await.unwrap());
        store.delete("users/u1/files/docs").await.unwrap();

        store
            .put(
                "users/u1/files/docs",
                Bytes::from_static(b"plain"),
                "text/plain",
                HashMap::new(),
            )
            .await
            .unwrap();
        let (data, _) = store.get("users/u1/files/docs").await.unwrap();
        assert_eq!(&data[..], b"plain");
        let (data, _) = store.get("users/u1/files/docs/a.txt").await.unwrap();
        assert_eq!(&data[..], b"nested");

        let keys: Vec<String> = store
            .list("users/u1/files/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["users/u1/files/docs", "users/u1/files/docs/a.txt"]);

        store.delete("users/u1/files/docs/a.txt").await.unwrap();
        assert!(store.exists("users/u1/files/docs").await.unwrap());
    }

    #[tokio::test]
    async fn object_can_become_a_prefix_of_another_object() {
        let (_dir, store) = store().await;
        store
            .put("users/u1/files/a", Bytes::from_static(b"a"), "text/plain", HashMap::new())
            .await
            .unwrap();
        store
            .put("users/u1/files/a/b", Bytes::from_static(b"b"), "text/plain", HashMap::new())
            .await
            .unwrap();
        assert_eq!(store.list("users/u1/files/a").await.unwrap().len(), 2);
        assert_eq!(store.list("users/u1/files/a/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_sidecar_write_leaves_no_payload_behind() {
        let (dir, store) = store().await;
        // A plain file where the sidecar directory must go blocks the commit.
        std::fs::write(dir.path().join("meta/users.d"), b"").unwrap();

        let result = store
            .put("users/u1/files/a.txt", Bytes::from_static(b"x"), "text/plain", HashMap::new())
            .await;
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert!(matches!(
            store.get("users/u1/files/a.txt").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(!dir.path().join("objects/users.d").exists());
        assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn signing_is_unavailable() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.sign_get("k", Duration::from_secs(60)).await,
            Err(StoreError::FeatureDisabled(_))
        ));
    }
}
