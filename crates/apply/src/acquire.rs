//! Payload acquisition from local files, download URLs, and tar
//! containers.

use std::path::Path;

use bndl_errors::{CacheError, Error, Result};
use bndl_fileops::RetryPolicy;
use bndl_net::NetClient;
use bndl_types::PayloadSource;
use tar::Archive;

/// Fetches payloads from wherever a manifest says they live.
#[derive(Debug, Clone)]
pub struct Acquirer {
    net: NetClient,
}

impl Acquirer {
    #[must_use]
    pub fn new(net: NetClient) -> Self {
        Self { net }
    }

    /// Acquirer backed by a default network client.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(NetClient::with_defaults()?))
    }

    /// Fetches `source` into `dest` and returns the byte count.
    ///
    /// `progress` receives `(bytes_so_far, total_when_known)` and keeps
    /// the transfer alive by returning `true`. Local sources report a
    /// single tick once the bytes are in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when `progress` returns `false`,
    /// otherwise the underlying copy, download, or extraction error.
    pub async fn fetch<F>(
        &self,
        source: &PayloadSource,
        dest: &Path,
        mut progress: F,
    ) -> Result<u64>
    where
        F: FnMut(u64, Option<u64>) -> bool + Send,
    {
        match source {
            PayloadSource::LocalFile { path } => {
                let bytes = bndl_fileops::copy_file(path, dest, true, RetryPolicy::none()).await?;
                finish_local(dest, bytes, &mut progress).await
            }
            PayloadSource::Url { url } => {
                self.net
                    .download_file(url, dest, |p| progress(p.bytes_downloaded, p.total_bytes))
                    .await
            }
            PayloadSource::Container { path, entry } => {
                let bytes = extract_entry(path, entry, dest).await?;
                finish_local(dest, bytes, &mut progress).await
            }
        }
    }
}

/// Reports the one completion tick a non-streaming source gets.
async fn finish_local<F>(dest: &Path, bytes: u64, progress: &mut F) -> Result<u64>
where
    F: FnMut(u64, Option<u64>) -> bool + Send,
{
    if progress(bytes, Some(bytes)) {
        Ok(bytes)
    } else {
        let _ = tokio::fs::remove_file(dest).await;
        Err(Error::Cancelled)
    }
}

/// Copies one entry out of a tar container into `dest`.
async fn extract_entry(container: &Path, entry_name: &str, dest: &Path) -> Result<u64> {
    let container = container.to_path_buf();
    let entry_name = entry_name.to_string();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || extract_entry_blocking(&container, &entry_name, &dest))
        .await
        .map_err(|err| Error::internal(format!("extract task failed: {err}")))?
}

fn extract_entry_blocking(container: &Path, entry_name: &str, dest: &Path) -> Result<u64> {
    use std::fs::File;
    use std::io::BufWriter;

    let file = File::open(container).map_err(|err| Error::io_with_path(&err, container))?;
    let mut archive = Archive::new(file);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.as_ref() == Path::new(entry_name) {
            let out = File::create(dest).map_err(|err| Error::io_with_path(&err, dest))?;
            let mut writer = BufWriter::new(out);
            let bytes = std::io::copy(&mut entry, &mut writer)?;
            return Ok(bytes);
        }
    }

    Err(CacheError::ExtractFailed {
        container: container.display().to_string(),
        entry: entry_name.to_string(),
        message: "no such entry in container".to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn tar_with_entry(dir: &Path, entry: &str, contents: &[u8]) -> PathBuf {
        let container = dir.join("payloads.tar");
        let file = std::fs::File::create(&container).unwrap();
        let mut builder = tar::Builder::new(file);
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, entry, contents).unwrap();
        builder.finish().unwrap();
        container
    }

    #[tokio::test]
    async fn local_file_source_copies_and_ticks_once() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("payload.bin");
        tokio::fs::write(&src, b"local payload").await.unwrap();
        let dest = dir.path().join("staged.bin");

        let mut ticks = Vec::new();
        let acquirer = Acquirer::with_defaults().unwrap();
        let bytes = acquirer
            .fetch(
                &PayloadSource::LocalFile { path: src },
                &dest,
                |done, total| {
                    ticks.push((done, total));
                    true
                },
            )
            .await
            .unwrap();

        assert_eq!(bytes, 13);
        assert_eq!(ticks, vec![(13, Some(13))]);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"local payload");
    }

    #[tokio::test]
    async fn cancelled_local_fetch_removes_the_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("payload.bin");
        tokio::fs::write(&src, b"bytes").await.unwrap();
        let dest = dir.path().join("staged.bin");

        let acquirer = Acquirer::with_defaults().unwrap();
        let err = acquirer
            .fetch(&PayloadSource::LocalFile { path: src }, &dest, |_, _| false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(!tokio::fs::try_exists(&dest).await.unwrap());
    }

    #[tokio::test]
    async fn container_source_extracts_the_named_entry() {
        let dir = tempfile::tempdir().unwrap();
        let container = tar_with_entry(dir.path(), "nested/app.payload", b"packed bytes");
        let dest = dir.path().join("staged.bin");

        let acquirer = Acquirer::with_defaults().unwrap();
        let bytes = acquirer
            .fetch(
                &PayloadSource::Container {
                    path: container,
                    entry: "nested/app.payload".to_string(),
                },
                &dest,
                |_, _| true,
            )
            .await
            .unwrap();

        assert_eq!(bytes, 12);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"packed bytes");
    }

    #[tokio::test]
    async fn missing_container_entry_is_an_extract_failure() {
        let dir = tempfile::tempdir().unwrap();
        let container = tar_with_entry(dir.path(), "present.payload", b"bytes");
        let dest = dir.path().join("staged.bin");

        let acquirer = Acquirer::with_defaults().unwrap();
        let err = acquirer
            .fetch(
                &PayloadSource::Container {
                    path: container,
                    entry: "absent.payload".to_string(),
                },
                &dest,
                |_, _| true,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Cache(CacheError::ExtractFailed { .. })
        ));
    }
}
