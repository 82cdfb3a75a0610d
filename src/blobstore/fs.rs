//! `FsBlobStore` — a local-directory `BlobStore`, laid out as
//! `keys/<ruleKey>` (index entries) and `blobs/<fileHash>` (content-addressed
//! blobs).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{BlobMeta, BlobStore};
use crate::error::{Result, ZimError};

/// Blob store backed by a directory tree under `root`. Suitable as the
/// default local cache and as the fixture store in tests; a remote-cache
/// adapter would implement the same trait against an object-store SDK
/// without the core needing to change.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join("blobs").join(key)
    }

    fn index_path(&self, rule_key: &str) -> PathBuf {
        self.root.join("keys").join(rule_key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, local_path: &Path) -> Result<()> {
        let dest = self.blob_path(key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(local_path, &dest).await?;
        Ok(())
    }

    async fn get(&self, key: &str, local_path: &Path) -> Result<()> {
        let src = self.blob_path(key);
        if !src.exists() {
            return Err(ZimError::NotFound { key: key.to_string() });
        }
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&src, local_path).await?;
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<BlobMeta>> {
        let path = self.blob_path(key);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(BlobMeta { size: meta.len(), etag: key.to_string() })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ZimError::IoError(e)),
        }
    }

    async fn put_index(&self, rule_key: &str, blob_keys: &[String]) -> Result<()> {
        let path = self.index_path(rule_key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec(blob_keys)?;
        fs::write(&path, body).await?;
        Ok(())
    }

    async fn get_index(&self, rule_key: &str) -> Result<Option<Vec<String>>> {
        let path = self.index_path(rule_key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ZimError::IoError(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("cache"));

        let src = dir.path().join("src.bin");
        std::fs::write(&src, b"hello blob").unwrap();
        store.put("abc123", &src).await.unwrap();

        let dst = dir.path().join("dst.bin");
        store.get("abc123", &dst).await.unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"hello blob");
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let err = store.get("nope", &dir.path().join("out")).await.unwrap_err();
        assert!(matches!(err, ZimError::NotFound { .. }));
    }

    #[tokio::test]
    async fn head_reports_size_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let src = dir.path().join("src.bin");
        std::fs::write(&src, b"0123456789").unwrap();
        store.put("k", &src).await.unwrap();

        let meta = store.head("k").await.unwrap().unwrap();
        assert_eq!(meta.size, 10);
        assert_eq!(meta.etag, "k");
    }

    #[tokio::test]
    async fn head_is_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.head("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn index_roundtrips_blob_key_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let keys = vec!["blob1".to_string(), "blob2".to_string()];
        store.put_index("svc.build@rulekey", &keys).await.unwrap();

        let loaded = store.get_index("svc.build@rulekey").await.unwrap().unwrap();
        assert_eq!(loaded, keys);
    }

    #[tokio::test]
    async fn get_index_is_none_when_never_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.get_index("nope").await.unwrap().is_none());
    }
}
