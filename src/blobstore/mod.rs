//! BlobStore — content-addressed object store for cached outputs plus a
//! rule-key→blob-set index.
//!
//! The core only ever sees this trait: cloud object-store adapters (S3) and
//! the authentication/signed-URL services that would front a remote
//! implementation are external collaborators out of scope here.
//! [`fs::FsBlobStore`] is the one concrete implementation shipped — a local
//! directory tree, good enough for a single-machine cache and for tests.

mod fs;

pub use fs::FsBlobStore;

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Existence/metadata probe result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub size: u64,
    /// Content-derived identity tag. For a content-addressed store this is
    /// always equal to the key itself, but the field is kept distinct from
    /// `key` so a remote adapter (e.g. an S3 `ETag`) can report its own.
    pub etag: String,
}

/// Content-addressed blob storage plus a rule-key → blob-set index.
///
/// Concurrent access to the same key is safe: "last writer wins" is
/// acceptable because content is addressed by hash, so two concurrent
/// writers of the same key are, by construction, writing the same bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the file at `local_path` under `key`. Idempotent.
    async fn put(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Download the blob stored under `key` to `local_path`.
    /// `ZimError::NotFound` if no such key exists.
    async fn get(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Probe for existence without downloading.
    async fn head(&self, key: &str) -> Result<Option<BlobMeta>>;

    /// Record that rule key `rule_key` produced exactly these output blob
    /// keys — one rule can produce many outputs, hence the index is a list
    /// rather than a single blob.
    async fn put_index(&self, rule_key: &str, blob_keys: &[String]) -> Result<()>;

    /// Look up the blob-key set previously recorded for `rule_key`. `None`
    /// if never recorded (a cache miss, not an error).
    async fn get_index(&self, rule_key: &str) -> Result<Option<Vec<String>>>;
}
