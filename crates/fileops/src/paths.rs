//! Path name helpers and file timestamps

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bndl_errors::{Error, FileOpError, Result};

/// `dir/name.ext` becomes `dir/name`. A path with no extension is
/// returned unchanged.
#[must_use]
pub fn strip_extension(path: &Path) -> PathBuf {
    match path.file_stem() {
        Some(stem) => path.with_file_name(stem),
        None => path.to_path_buf(),
    }
}

/// `dir/name.ext` becomes `dir/name.<extension>`.
#[must_use]
pub fn change_extension(path: &Path, extension: &str) -> PathBuf {
    path.with_extension(extension)
}

/// Insert `suffix` between the base name and the extension, so
/// `dir/app.exe` with suffix `.old` becomes `dir/app.old.exe`.
#[must_use]
pub fn add_suffix(path: &Path, suffix: &str) -> PathBuf {
    let Some(stem) = path.file_stem() else {
        return path.to_path_buf();
    };
    let mut name = stem.to_os_string();
    name.push(suffix);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Last modification time of a file.
///
/// # Errors
///
/// Returns the mapped cause when the file cannot be inspected.
pub async fn modified_time(path: &Path) -> Result<SystemTime> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::FileOp(FileOpError::from_io_with_path(&e, path)))?;
    meta.modified()
        .map_err(|e| Error::FileOp(FileOpError::from_io_with_path(&e, path)))
}

/// Set the last modification time of a file.
///
/// # Errors
///
/// Returns the mapped cause when the file cannot be updated.
pub async fn set_modified_time(path: &Path, time: SystemTime) -> Result<()> {
    let path_buf = path.to_path_buf();
    let outcome = tokio::task::spawn_blocking(move || {
        let file = std::fs::OpenOptions::new().append(true).open(&path_buf)?;
        file.set_modified(time)
    })
    .await
    .map_err(|e| Error::internal(format!("set_modified_time task failed: {e}")))?;
    outcome.map_err(|e| Error::FileOp(FileOpError::from_io_with_path(&e, path)))
}

/// Set the modification time to now, creating the file when missing.
///
/// # Errors
///
/// Returns the mapped cause when the file cannot be created or updated.
pub async fn touch(path: &Path) -> Result<()> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|e| Error::FileOp(FileOpError::from_io_with_path(&e, path)))?;
    if !exists {
        tokio::fs::write(path, b"")
            .await
            .map_err(|e| Error::FileOp(FileOpError::from_io_with_path(&e, path)))?;
        return Ok(());
    }
    set_modified_time(path, SystemTime::now()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn strip_and_change_extension() {
        assert_eq!(
            strip_extension(Path::new("/tmp/payload.tar")),
            PathBuf::from("/tmp/payload")
        );
        assert_eq!(
            change_extension(Path::new("/tmp/payload.tar"), "bak"),
            PathBuf::from("/tmp/payload.bak")
        );
        assert_eq!(strip_extension(Path::new("/tmp/noext")), PathBuf::from("/tmp/noext"));
    }

    #[test]
    fn suffix_lands_before_extension() {
        assert_eq!(
            add_suffix(Path::new("/opt/app.exe"), ".old"),
            PathBuf::from("/opt/app.old.exe")
        );
        assert_eq!(
            add_suffix(Path::new("/opt/app"), ".old"),
            PathBuf::from("/opt/app.old")
        );
    }

    #[tokio::test]
    async fn touch_creates_and_bumps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamp");
        touch(&path).await.unwrap();
        assert!(path.exists());

        let old = SystemTime::now() - Duration::from_secs(3600);
        set_modified_time(&path, old).await.unwrap();
        let before = modified_time(&path).await.unwrap();

        touch(&path).await.unwrap();
        let after = modified_time(&path).await.unwrap();
        assert!(after > before);
    }
}
