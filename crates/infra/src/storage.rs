//! Object storage for generated images.
//!
//! Storage is optional: when it is absent or an upload fails, the worker keeps
//! the bytes inline on the artifact instead.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("storage i/o error: {0}")]
    Io(String),
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    /// Store `bytes` under `key` and return the public URL.
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, StorageError>;
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Writes objects into a local directory served under `public_base_url`.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FilesystemStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for FilesystemStorage {
    #[instrument(skip(self, bytes), fields(size = bytes.len()), err)]
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {}", self.root.display(), e)))?;

        // Write then rename so readers never see a partial file.
        let path = self.root.join(key);
        let tmp = self.root.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "stored object");
        Ok(format!("{}/{}", self.public_base_url.trim_end_matches('/'), key))
    }
}

/// Keeps objects in memory. Tests and database-less development.
#[derive(Debug, Default)]
pub struct InMemoryObjectStorage {
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes and content type for `key`.
    pub fn object(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects.lock().ok()?.get(key).cloned()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        self.objects
            .lock()
            .map_err(|_| StorageError::Io("object map lock poisoned".to_string()))?
            .insert(key.to_string(), (content_type.to_string(), bytes.to_vec()));
        Ok(format!("memory://{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn filesystem_upload_returns_public_url() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("sketches"), "https://cdn.example.com/s/");

        let url = storage.upload("sketch-1.png", b"png", "image/png").await.unwrap();
        assert_eq!(url, "https://cdn.example.com/s/sketch-1.png");

        let stored = std::fs::read(dir.path().join("sketches").join("sketch-1.png")).unwrap();
        assert_eq!(stored, b"png");
    }

    #[tokio::test]
    async fn path_traversal_keys_are_rejected() {
        let storage = InMemoryObjectStorage::new();
        for key in ["../etc/passwd", "a/b.png", "", ".hidden"] {
            assert!(
                matches!(storage.upload(key, b"x", "image/png").await, Err(StorageError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }
}
