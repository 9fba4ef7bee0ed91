//! HTTP client with retry support

use std::path::Path;
use std::time::Duration;

use bndl_errors::{Error, NetworkError, Result};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

/// Network client configuration
#[derive(Clone, Debug)]
pub struct NetConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Number of re-attempts after a failed request
    pub retry_count: u32,
    /// Delay between attempts
    pub retry_delay: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            user_agent: format!("bndl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Bytes-level progress of a single download
#[derive(Clone, Copy, Debug)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    /// Total size when the server announced one
    pub total_bytes: Option<u64>,
}

/// HTTP client wrapper with retry logic
#[derive(Clone, Debug)]
pub struct NetClient {
    client: reqwest::Client,
    config: NetConfig,
}

impl NetClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying client cannot be built.
    pub fn new(config: NetConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                Error::Network(NetworkError::DownloadFailed {
                    url: String::new(),
                    message: format!("failed to build HTTP client: {e}"),
                })
            })?;
        Ok(Self { client, config })
    }

    /// Create a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying client cannot be built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(NetConfig::default())
    }

    #[must_use]
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Fetch a URL as text with retry.
    ///
    /// # Errors
    ///
    /// Returns the mapped network error of the last attempt.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get_with_retry(url).await?;
        response
            .text()
            .await
            .map_err(|e| map_reqwest_error(&e, url).into())
    }

    /// Download a URL into a file, reporting progress after every chunk.
    ///
    /// The callback returns whether to keep going; returning false stops
    /// the transfer and the whole download fails with
    /// [`Error::Cancelled`]. Only establishing the connection is retried;
    /// a transfer interrupted mid-stream surfaces immediately so the
    /// caller can decide whether to start over.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] on cancellation and the mapped
    /// network error otherwise.
    pub async fn download_file<F>(&self, url: &str, dest: &Path, mut progress: F) -> Result<u64>
    where
        F: FnMut(DownloadProgress) -> bool + Send,
    {
        let response = self.get_with_retry(url).await?;
        let total_bytes = response.content_length();

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut bytes_downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_reqwest_error(&e, url))?;
            file.write_all(&chunk).await?;
            bytes_downloaded += chunk.len() as u64;
            if !progress(DownloadProgress {
                bytes_downloaded,
                total_bytes,
            }) {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(Error::Cancelled);
            }
        }

        file.flush().await?;
        Ok(bytes_downloaded)
    }

    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut last_error = NetworkError::DownloadFailed {
            url: url.to_string(),
            message: "no attempts made".to_string(),
        };

        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                tracing::debug!(url, attempt, "retrying request");
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self.client.get(url).send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        let mapped = map_reqwest_error(&e, url);
                        if !should_retry(&e) {
                            return Err(mapped.into());
                        }
                        last_error = mapped;
                    }
                },
                Err(e) => {
                    let mapped = map_reqwest_error(&e, url);
                    if !should_retry(&e) {
                        return Err(mapped.into());
                    }
                    last_error = mapped;
                }
            }
        }
        Err(last_error.into())
    }
}

fn should_retry(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() {
        return true;
    }
    if let Some(status) = err.status() {
        return status.is_server_error() || status.as_u16() == 429;
    }
    false
}

fn map_reqwest_error(err: &reqwest::Error, url: &str) -> NetworkError {
    if err.is_timeout() {
        return NetworkError::Timeout(url.to_string());
    }
    if err.is_connect() {
        return NetworkError::ConnectionRefused(url.to_string());
    }
    if let Some(status) = err.status() {
        return NetworkError::HttpError {
            status: status.as_u16(),
            url: url.to_string(),
            message: err.to_string(),
        };
    }
    if err.is_builder() {
        return NetworkError::InvalidUrl(url.to_string());
    }
    NetworkError::DownloadFailed {
        url: url.to_string(),
        message: err.to_string(),
    }
}
