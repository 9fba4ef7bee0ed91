//! Copy, move, delete and read with bounded retry
//!
//! Every mutating operation takes a [`RetryPolicy`]; transient lock and
//! access-denied failures are re-attempted, everything else surfaces
//! immediately as a typed [`FileOpError`] cause.

use std::path::{Path, PathBuf};

use bndl_errors::{Error, FileOpError, Result};
use tokio::io::AsyncReadExt;

use crate::retry::{retry, RetryPolicy};
use crate::temp::create_temp_file;

fn fileop(err: &std::io::Error, path: &Path) -> Error {
    Error::FileOp(FileOpError::from_io_with_path(err, path))
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| fileop(&e, parent))?;
        }
    }
    Ok(())
}

/// Copy `src` to `dst`, retrying transient failures.
///
/// Parent directories of `dst` are created. With `overwrite` false an
/// existing destination fails with [`FileOpError::AlreadyExists`].
///
/// # Errors
///
/// Returns [`FileOpError::SourceMissing`] when `src` does not exist, and
/// the mapped cause of the last underlying failure otherwise.
pub async fn copy_file(
    src: &Path,
    dst: &Path,
    overwrite: bool,
    policy: RetryPolicy,
) -> Result<u64> {
    if !tokio::fs::try_exists(src).await.map_err(|e| fileop(&e, src))? {
        return Err(FileOpError::SourceMissing {
            path: src.display().to_string(),
        }
        .into());
    }
    if !overwrite && tokio::fs::try_exists(dst).await.map_err(|e| fileop(&e, dst))? {
        return Err(FileOpError::AlreadyExists {
            path: dst.display().to_string(),
        }
        .into());
    }
    ensure_parent(dst).await?;

    retry(policy, || async {
        tokio::fs::copy(src, dst).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                // Source vanished between the existence check and the copy.
                Error::FileOp(FileOpError::SourceMissing {
                    path: src.display().to_string(),
                })
            } else {
                fileop(&e, dst)
            }
        })
    })
    .await
}

/// Move `src` to `dst`, retrying transient failures.
///
/// A plain rename is attempted first. When the paths live on different
/// volumes the rename fails; with `allow_copy` the move degrades to
/// copy-then-delete, otherwise it fails with
/// [`FileOpError::CrossVolumeMove`].
///
/// # Errors
///
/// Returns the mapped cause of the last underlying failure.
pub async fn move_file(
    src: &Path,
    dst: &Path,
    overwrite: bool,
    allow_copy: bool,
    policy: RetryPolicy,
) -> Result<()> {
    if !tokio::fs::try_exists(src).await.map_err(|e| fileop(&e, src))? {
        return Err(FileOpError::SourceMissing {
            path: src.display().to_string(),
        }
        .into());
    }
    if !overwrite && tokio::fs::try_exists(dst).await.map_err(|e| fileop(&e, dst))? {
        return Err(FileOpError::AlreadyExists {
            path: dst.display().to_string(),
        }
        .into());
    }
    ensure_parent(dst).await?;

    let renamed = retry(policy, || async {
        match tokio::fs::rename(src, dst).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => Ok(false),
            Err(e) => Err(fileop(&e, dst)),
        }
    })
    .await?;

    if renamed {
        return Ok(());
    }
    if !allow_copy {
        return Err(FileOpError::CrossVolumeMove {
            source_path: src.display().to_string(),
            target: dst.display().to_string(),
        }
        .into());
    }
    copy_file(src, dst, overwrite, policy).await?;
    delete_file(src, policy).await
}

/// Delete a file, retrying transient failures. Deleting a missing file
/// succeeds.
///
/// # Errors
///
/// Returns [`FileOpError::TargetLocked`] when the file stayed locked
/// through every attempt.
pub async fn delete_file(path: &Path, policy: RetryPolicy) -> Result<()> {
    retry(policy, || async {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(fileop(&e, path)),
        }
    })
    .await
}

/// Write `data` to `path`, retrying transient failures. Truncates an
/// existing file.
///
/// # Errors
///
/// Returns the mapped cause of the last underlying failure.
pub async fn write_bytes(path: &Path, data: &[u8], policy: RetryPolicy) -> Result<()> {
    ensure_parent(path).await?;
    retry(policy, || async {
        tokio::fs::write(path, data).await.map_err(|e| fileop(&e, path))
    })
    .await
}

/// Write `data` to `path` so that readers observe either the old content
/// or the new, never a torn mix.
///
/// The data lands in a temporary sibling first and is renamed over the
/// destination.
///
/// # Errors
///
/// Returns the mapped cause of the failing step.
pub async fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    ensure_parent(path).await?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp = create_temp_file(&dir, "write", "tmp").await?;
    if let Err(e) = tokio::fs::write(&temp, data).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(fileop(&e, path));
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(fileop(&e, path));
    }
    Ok(())
}

/// Read a whole file.
///
/// # Errors
///
/// Returns [`FileOpError::SourceMissing`] when the file does not exist.
pub async fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| fileop(&e, path))
}

/// Read at most `max` bytes from the start of a file.
///
/// Useful for sniffing headers of files that may be very large.
///
/// # Errors
///
/// Returns [`FileOpError::SourceMissing`] when the file does not exist.
pub async fn read_until(path: &Path, max: usize) -> Result<Vec<u8>> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| fileop(&e, path))?;
    let mut buffer = Vec::with_capacity(max.min(64 * 1024));
    let mut handle = file.take(max as u64);
    handle
        .read_to_end(&mut buffer)
        .await
        .map_err(|e| fileop(&e, path))?;
    Ok(buffer)
}

/// Size of a file in bytes.
///
/// # Errors
///
/// Returns [`FileOpError::SourceMissing`] when the file does not exist.
pub async fn file_size(path: &Path) -> Result<u64> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| fileop(&e, path))?;
    Ok(meta.len())
}

/// Whether two paths refer to the same underlying file.
///
/// Paths are resolved through symlinks before comparison, so `a/../b`
/// and `b` compare equal. Either path missing compares unequal.
#[must_use]
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}
