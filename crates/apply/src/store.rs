//! Content-addressed payload cache.
//!
//! Payloads live under `base/<hex[..2]>/<hex[2..]>`, keyed by their
//! blake3 digest. A payload shared by several packages is stored once,
//! and a resumed session never re-acquires what it already holds.

use std::path::{Path, PathBuf};

use bndl_errors::{Error, Result};
use bndl_fileops::RetryPolicy;
use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

/// Store manager for cached payloads.
#[derive(Debug, Clone)]
pub struct CacheStore {
    base: PathBuf,
}

impl CacheStore {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Directory in-flight acquisitions are staged under before
    /// verification moves them into the addressed layout.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.base.join("stage")
    }

    /// Path the payload with `digest` is stored at.
    #[must_use]
    pub fn object_path(&self, digest: &str) -> PathBuf {
        // Declared digests are unvalidated manifest input.
        if digest.len() < 3 {
            return self.base.join(digest);
        }
        self.base.join(&digest[..2]).join(&digest[2..])
    }

    /// Whether the payload with `digest` is already cached.
    pub async fn contains(&self, digest: &str) -> bool {
        fs::try_exists(self.object_path(digest)).await.unwrap_or(false)
    }

    /// Returns the stored path for `digest` when present.
    pub async fn object(&self, digest: &str) -> Option<PathBuf> {
        let path = self.object_path(digest);
        if fs::try_exists(&path).await.unwrap_or(false) {
            Some(path)
        } else {
            None
        }
    }

    /// Streams `path` through blake3 and returns the hex digest.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened or read.
    pub async fn hash_file(path: &Path) -> Result<String> {
        let mut file = File::open(path)
            .await
            .map_err(|err| Error::io_with_path(&err, path))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let n = file
                .read(&mut buffer)
                .await
                .map_err(|err| Error::io_with_path(&err, path))?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Moves `file` into the cache and returns its digest.
    ///
    /// The source file is consumed either way: moved into place, or
    /// deleted when an identical payload is already cached.
    ///
    /// # Errors
    ///
    /// Returns an error when hashing or the move fails.
    pub async fn insert(&self, file: &Path) -> Result<String> {
        let digest = Self::hash_file(file).await?;
        self.insert_prehashed(file, &digest).await?;
        Ok(digest)
    }

    /// Moves `file` into the cache under an already-computed digest.
    ///
    /// # Errors
    ///
    /// Returns an error when the move or a directory creation fails.
    pub async fn insert_prehashed(&self, file: &Path, digest: &str) -> Result<PathBuf> {
        let dest = self.object_path(digest);
        if fs::try_exists(&dest).await? {
            bndl_fileops::delete_file(file, RetryPolicy::none()).await?;
            tracing::debug!(digest, "payload already cached, deduplicated");
            return Ok(dest);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        bndl_fileops::move_file(file, &dest, false, true, RetryPolicy::none()).await?;
        tracing::debug!(digest, path = %dest.display(), "payload cached");
        Ok(dest)
    }

    /// Removes the payload with `digest` if present.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists and cannot be removed.
    pub async fn remove(&self, digest: &str) -> Result<()> {
        bndl_fileops::delete_file(&self.object_path(digest), RetryPolicy::none()).await
    }
}
