//! Unique temporary file creation

use std::path::{Path, PathBuf};

use bndl_errors::{Error, FileOpError, Result};
use uuid::Uuid;

/// How many name collisions we tolerate before giving up. Collisions on
/// random names mean something is badly wrong with the directory.
const MAX_ATTEMPTS: u32 = 8;

/// Create an empty file with a unique name in `directory`.
///
/// The name is `<prefix>-<random>.<extension>`. Creation uses
/// `create_new`, so the returned path is guaranteed to have been created
/// by this call and not raced by another process.
///
/// # Errors
///
/// Returns [`FileOpError::TempExhausted`] when every candidate name
/// collided, or the mapped cause of the underlying failure.
pub async fn create_temp_file(directory: &Path, prefix: &str, extension: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(directory)
        .await
        .map_err(|e| Error::FileOp(FileOpError::from_io_with_path(&e, directory)))?;

    for _ in 0..MAX_ATTEMPTS {
        let name = format!("{prefix}-{}.{extension}", Uuid::new_v4().simple());
        let candidate = directory.join(name);
        let created = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await;
        match created {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(Error::FileOp(FileOpError::from_io_with_path(&e, &candidate)));
            }
        }
    }
    Err(FileOpError::TempExhausted {
        directory: directory.display().to_string(),
        attempts: MAX_ATTEMPTS,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn temp_files_are_unique_and_created() {
        let dir = tempfile::tempdir().unwrap();
        let a = create_temp_file(dir.path(), "stage", "tmp").await.unwrap();
        let b = create_temp_file(dir.path(), "stage", "tmp").await.unwrap();
        assert_ne!(a, b);
        assert!(a.exists());
        assert!(b.exists());
        assert!(a.file_name().unwrap().to_str().unwrap().starts_with("stage-"));
        assert!(a.extension().unwrap() == "tmp");
    }

    #[tokio::test]
    async fn missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let path = create_temp_file(&nested, "t", "bin").await.unwrap();
        assert!(path.starts_with(&nested));
    }
}
