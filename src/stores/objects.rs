//! Named object storage
//!
//! Publishes files (the signing public key) under a name inside a container
//! and hands back a URL for each. Uploads overwrite.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use crate::types::{IamError, Lookup, Result};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` as `name` in `container`, replacing any previous object.
    /// Returns the object's URL.
    async fn upload(&self, data: Bytes, name: &str, container: &str) -> Result<String>;

    /// Every object in a container, name to URL. A missing container is empty.
    async fn list_all(&self, container: &str) -> Result<HashMap<String, String>>;

    async fn get_url(&self, name: &str, container: &str) -> Result<Lookup<String>> {
        let mut objects = self.list_all(container).await?;
        Ok(objects.remove(name).into())
    }

    /// Delete an object, failing with `FileNotAvailable` if it does not exist
    async fn delete(&self, name: &str, container: &str) -> Result<()>;

    /// Download the content behind a URL issued by this store
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    let traversal = value == "." || value == "..";
    if value.is_empty() || traversal || value.contains('/') || value.contains('\\') {
        return Err(IamError::BadRequest(format!("Invalid {} name: {:?}", kind, value)));
    }
    Ok(())
}

fn not_available(name: &str, container: &str) -> IamError {
    IamError::FileNotAvailable {
        name: name.to_string(),
        container: container.to_string(),
    }
}

// =============================================================================
// In-memory
// =============================================================================

const MEMORY_SCHEME: &str = "memory://";

/// Objects kept in process, addressed as `memory://{container}/{name}`
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<(String, String), Bytes>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn url(name: &str, container: &str) -> String {
        format!("{}{}/{}", MEMORY_SCHEME, container, name)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, data: Bytes, name: &str, container: &str) -> Result<String> {
        validate_segment("object", name)?;
        validate_segment("container", container)?;
        self.objects
            .insert((container.to_string(), name.to_string()), data);
        Ok(Self::url(name, container))
    }

    async fn list_all(&self, container: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == container)
            .map(|entry| {
                let name = entry.key().1.clone();
                let url = Self::url(&name, container);
                (name, url)
            })
            .collect())
    }

    async fn delete(&self, name: &str, container: &str) -> Result<()> {
        self.objects
            .remove(&(container.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_available(name, container))
    }

    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let (container, name) = url
            .strip_prefix(MEMORY_SCHEME)
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(|| IamError::Storage(format!("Unsupported object URL: {}", url)))?;

        self.objects
            .get(&(container.to_string(), name.to_string()))
            .map(|data| data.value().clone())
            .ok_or_else(|| not_available(name, container))
    }
}

// =============================================================================
// Filesystem
// =============================================================================

const FILE_SCHEME: &str = "file://";

/// Objects stored as `{root}/{container}/{name}`.
///
/// When a public base URL is configured (the root is served by a web server)
/// URLs are `{base}/{container}/{name}`; otherwise they are `file://` URLs.
pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: Option<String>,
    http: reqwest::Client,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.map(|url| url.trim_end_matches('/').to_string()),
            http: reqwest::Client::new(),
        }
    }

    fn object_path(&self, name: &str, container: &str) -> PathBuf {
        self.root.join(container).join(name)
    }

    fn url_for(&self, path: &Path, name: &str, container: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}/{}", base, container, name),
            None => format!("{}{}", FILE_SCHEME, path.display()),
        }
    }

    /// Map a URL this store issued back to its local file
    fn local_path(&self, url: &str) -> Option<PathBuf> {
        if let Some(path) = url.strip_prefix(FILE_SCHEME) {
            return Some(PathBuf::from(path));
        }
        let base = self.public_base_url.as_deref()?;
        let rest = url.strip_prefix(base)?.strip_prefix('/')?;
        let (container, name) = rest.split_once('/')?;
        let name = urlencoding::decode(name).ok()?;
        Some(self.object_path(&name, container))
    }

    async fn fetch_remote(&self, url: &str) -> Result<Bytes> {
        let response = self.http.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(IamError::FileNotAvailable {
                name: url.to_string(),
                container: String::new(),
            });
        }
        let response = response.error_for_status()?;
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload(&self, data: Bytes, name: &str, container: &str) -> Result<String> {
        validate_segment("object", name)?;
        validate_segment("container", container)?;

        let dir = self.root.join(container);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| IamError::Storage(format!("Failed to create {}: {}", dir.display(), e)))?;

        let path = dir.join(name);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| IamError::Storage(format!("Failed to write {}: {}", path.display(), e)))?;

        let path = match tokio::fs::canonicalize(&path).await {
            Ok(canonical) => canonical,
            Err(e) => {
                debug!("Could not canonicalize {}: {}", path.display(), e);
                path
            }
        };
        debug!("Uploaded {}/{} ({} bytes)", container, name, data.len());
        Ok(self.url_for(&path, name, container))
    }

    async fn list_all(&self, container: &str) -> Result<HashMap<String, String>> {
        validate_segment("container", container)?;

        let dir = self.root.join(container);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(IamError::Storage(format!(
                    "Failed to list {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut objects = HashMap::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let path = match tokio::fs::canonicalize(entry.path()).await {
                Ok(canonical) => canonical,
                Err(e) => {
                    debug!("Could not canonicalize {}: {}", entry.path().display(), e);
                    entry.path()
                }
            };
            let url = self.url_for(&path, &name, container);
            objects.insert(name, url);
        }

        Ok(objects)
    }

    async fn delete(&self, name: &str, container: &str) -> Result<()> {
        validate_segment("object", name)?;
        validate_segment("container", container)?;

        let path = self.object_path(name, container);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_available(name, container)),
            Err(e) => Err(IamError::Storage(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let Some(path) = self.local_path(url) else {
            return self.fetch_remote(url).await;
        };

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(IamError::FileNotAvailable {
                name: path.display().to_string(),
                container: String::new(),
            }),
            Err(e) => Err(IamError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_upload_overwrites() {
        let store = MemoryObjectStore::new();
        let url = store
            .upload(Bytes::from_static(b"one"), "key.pub", "public")
            .await
            .unwrap();
        store
            .upload(Bytes::from_static(b"two"), "key.pub", "public")
            .await
            .unwrap();

        assert_eq!(url, "memory://public/key.pub");
        assert_eq!(store.fetch(&url).await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(store.list_all("public").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_get_url_and_delete() {
        let store = MemoryObjectStore::new();
        assert!(store.get_url("key.pub", "public").await.unwrap().is_absent());

        store
            .upload(Bytes::from_static(b"pem"), "key.pub", "public")
            .await
            .unwrap();
        assert!(store.get_url("key.pub", "public").await.unwrap().is_found());
        assert!(store.get_url("key.pub", "other").await.unwrap().is_absent());

        store.delete("key.pub", "public").await.unwrap();
        let err = store.delete("key.pub", "public").await.unwrap_err();
        assert!(matches!(err, IamError::FileNotAvailable { .. }));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let store = MemoryObjectStore::new();
        let err = store
            .upload(Bytes::new(), "../secret", "public")
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_fs_round_trip_with_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path(), None);

        let url = store
            .upload(Bytes::from_static(b"pem"), "key.pub", "public")
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert_eq!(store.fetch(&url).await.unwrap(), Bytes::from_static(b"pem"));

        let listed = store.list_all("public").await.unwrap();
        assert_eq!(listed.get("key.pub"), Some(&url));

        store.delete("key.pub", "public").await.unwrap();
        assert!(matches!(
            store.fetch(&url).await.unwrap_err(),
            IamError::FileNotAvailable { .. }
        ));
        assert!(store.get_url("key.pub", "public").await.unwrap().is_absent());
    }

    #[tokio::test]
    async fn test_fs_urls_are_canonical() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let store = FsObjectStore::new(dir.path().join("nested").join(".."), None);

        let url = store
            .upload(Bytes::from_static(b"pem"), "key.pub", "public")
            .await
            .unwrap();
        assert!(!url.contains(".."));

        let listed = store.list_all("public").await.unwrap();
        assert_eq!(listed.get("key.pub"), Some(&url));
        assert_eq!(store.fetch(&url).await.unwrap(), Bytes::from_static(b"pem"));
    }

    #[tokio::test]
    async fn test_fs_public_base_url_resolves_locally() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path(), Some("https://cdn.example.com/".into()));

        let url = store
            .upload(Bytes::from_static(b"pem"), "key.pub", "public")
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/public/key.pub");
        assert_eq!(store.fetch(&url).await.unwrap(), Bytes::from_static(b"pem"));
    }

    #[tokio::test]
    async fn test_fs_missing_container_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path(), None);
        assert!(store.list_all("nothing").await.unwrap().is_empty());
    }
}
