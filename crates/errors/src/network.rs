//! Network-related error types

use thiserror::Error;

use crate::{Transient, UserFacingError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NetworkError {
    #[error("connection timeout: {0}")]
    Timeout(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("HTTP error {status}: {message}")]
    HttpError {
        status: u16,
        url: String,
        message: String,
    },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("download failed: {url}")]
    DownloadFailed { url: String, message: String },

    #[error("network unavailable")]
    NetworkUnavailable,
}

impl Transient for NetworkError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::ConnectionRefused(_) | Self::NetworkUnavailable => true,
            Self::HttpError { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidUrl(_) | Self::DownloadFailed { .. } => false,
        }
    }
}

impl UserFacingError for NetworkError {
    fn user_message(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout(_) | Self::NetworkUnavailable => {
                Some("Check your internet connection and try again.")
            }
            Self::HttpError { status, .. } if *status >= 500 => {
                Some("The server is having issues. Try again later.")
            }
            Self::InvalidUrl(_) => Some("Check the payload source URL."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Self::Timeout(_) => Some("net.timeout"),
            Self::ConnectionRefused(_) => Some("net.connection_refused"),
            Self::HttpError { .. } => Some("net.http_error"),
            Self::InvalidUrl(_) => Some("net.invalid_url"),
            Self::DownloadFailed { .. } => Some("net.download_failed"),
            Self::NetworkUnavailable => Some("net.unavailable"),
        }
    }
}
