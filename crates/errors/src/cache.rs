//! Payload cache error types

use thiserror::Error;

use crate::UserFacingError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CacheError {
    #[error("payload digest mismatch for {package}: expected {expected}, got {actual}")]
    DigestMismatch {
        package: String,
        expected: String,
        actual: String,
    },

    #[error("package {package} declares no payload sources")]
    NoSources { package: String },

    #[error("acquiring payload for {package} failed: {message}")]
    AcquireFailed { package: String, message: String },

    #[error("verifying payload for {package} failed: {message}")]
    VerifyFailed { package: String, message: String },

    #[error("extracting {entry} from container {container} failed: {message}")]
    ExtractFailed {
        container: String,
        entry: String,
        message: String,
    },

    #[error("package {package} skipped because {dependency} failed earlier")]
    Blocked { package: String, dependency: String },
}

impl UserFacingError for CacheError {
    fn user_message(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::DigestMismatch { .. } => {
                Some("The payload may be corrupt or tampered with. Re-download the bundle.")
            }
            Self::NoSources { .. } => Some("Add at least one payload source to the manifest."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DigestMismatch { .. } | Self::AcquireFailed { .. } | Self::VerifyFailed { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Self::DigestMismatch { .. } => Some("cache.digest_mismatch"),
            Self::NoSources { .. } => Some("cache.no_sources"),
            Self::AcquireFailed { .. } => Some("cache.acquire_failed"),
            Self::VerifyFailed { .. } => Some("cache.verify_failed"),
            Self::ExtractFailed { .. } => Some("cache.extract_failed"),
            Self::Blocked { .. } => Some("cache.blocked"),
        }
    }
}
