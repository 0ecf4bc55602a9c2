//! Object storage for uploaded documents and rendered reports.
//!
//! Keys are relative paths: `docx/{uuid}.docx` for originals and
//! `reports/{uuid}.docx` for reports. Every key is freshly generated, so a put
//! never overwrites another run's object.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key for an uploaded original.
pub fn docx_key() -> String {
    format!("docx/{}.docx", Uuid::new_v4())
}

/// Key for a rendered report.
pub fn report_key() -> String {
    format!("reports/{}.docx", Uuid::new_v4())
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Object store backed by a directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key under the root, refusing anything that could escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(key);
        let clean = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write to a sibling temp file, then rename into place.
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        tokio::fs::write(&tmp, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(key, bytes = data.len(), "object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_key_shapes() {
        let k = docx_key();
        assert!(k.starts_with("docx/") && k.ends_with(".docx"));
        assert!(report_key().starts_with("reports/"));
        assert_ne!(docx_key(), docx_key());
    }

    #[tokio::test]
    async fn test_put_get() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let key = docx_key();
        store.put(&key, b"PK\x03\x04").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), b"PK\x03\x04");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("docx"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(matches!(
            store.put("../x.docx", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.get("/etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.get("docx/none.docx").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
