//! File operation error types
//!
//! Failures are classified into typed causes so callers can distinguish a
//! missing source from a locked target or an exhausted disk without parsing
//! message strings.

use thiserror::Error;

use crate::{Transient, UserFacingError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileOpError {
    #[error("source file not found: {path}")]
    SourceMissing { path: String },

    #[error("file is locked by another process: {path}")]
    TargetLocked { path: String },

    #[error("insufficient disk space writing {path}")]
    InsufficientSpace { path: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("file already exists: {path}")]
    AlreadyExists { path: String },

    // The field cannot be called `source`: thiserror reserves that name for
    // `Error::source()`, which `String` cannot satisfy.
    #[error("cannot move {source_path} to {target}: paths are on different volumes")]
    CrossVolumeMove {
        #[cfg_attr(feature = "serde", serde(rename = "source"))]
        source_path: String,
        target: String,
    },

    #[error("could not create a unique temporary file in {directory} after {attempts} attempts")]
    TempExhausted { directory: String, attempts: u32 },

    #[error("not a recognized executable image: {path}")]
    NotExecutable { path: String },

    #[error("no embedded version record found in {path}")]
    VersionNotFound { path: String },

    #[error("text contains U+{codepoint:04X} which cannot be written as {encoding}")]
    UnencodableText { encoding: String, codepoint: u32 },

    #[error("{path} is not well-formed {encoding} text")]
    MalformedText { path: String, encoding: String },

    #[error("path is scheduled for deletion: {path}")]
    PendingDelete { path: String },

    #[error("invalid path: {path}")]
    InvalidPath { path: String },

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl FileOpError {
    /// Map an `io::Error` to a typed cause for the given path.
    ///
    /// `NotFound` maps to [`FileOpError::SourceMissing`], so call sites that
    /// hit `NotFound` on a destination should translate it themselves.
    #[must_use]
    pub fn from_io_with_path(err: &std::io::Error, path: &std::path::Path) -> Self {
        use std::io::ErrorKind;
        let path = path.display().to_string();
        match err.kind() {
            ErrorKind::NotFound => Self::SourceMissing { path },
            ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => {
                Self::InsufficientSpace { path }
            }
            ErrorKind::ResourceBusy
            | ErrorKind::ExecutableFileBusy
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut => Self::TargetLocked { path },
            _ => Self::Io {
                path,
                message: err.to_string(),
            },
        }
    }
}

impl Transient for FileOpError {
    // Antivirus scanners and indexers hold short-lived locks that surface
    // as both lock and access-denied failures, so the access-denied class
    // is part of the retry set.
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TargetLocked { .. } | Self::PermissionDenied { .. }
        )
    }
}

impl UserFacingError for FileOpError {
    fn user_message(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::TargetLocked { .. } => {
                Some("Close programs that may be using the file and try again.")
            }
            Self::InsufficientSpace { .. } => Some("Free up disk space and try again."),
            Self::PermissionDenied { .. } => {
                Some("Check file permissions or run with elevated privileges.")
            }
            Self::PendingDelete { .. } => {
                Some("The file will be removed on the next engine startup.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::TargetLocked { .. } | Self::Io { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Self::SourceMissing { .. } => Some("fileop.source_missing"),
            Self::TargetLocked { .. } => Some("fileop.target_locked"),
            Self::InsufficientSpace { .. } => Some("fileop.insufficient_space"),
            Self::PermissionDenied { .. } => Some("fileop.permission_denied"),
            Self::AlreadyExists { .. } => Some("fileop.already_exists"),
            Self::CrossVolumeMove { .. } => Some("fileop.cross_volume_move"),
            Self::TempExhausted { .. } => Some("fileop.temp_exhausted"),
            Self::NotExecutable { .. } => Some("fileop.not_executable"),
            Self::VersionNotFound { .. } => Some("fileop.version_not_found"),
            Self::UnencodableText { .. } => Some("fileop.unencodable_text"),
            Self::MalformedText { .. } => Some("fileop.malformed_text"),
            Self::PendingDelete { .. } => Some("fileop.pending_delete"),
            Self::InvalidPath { .. } => Some("fileop.invalid_path"),
            Self::Io { .. } => Some("fileop.io"),
        }
    }
}
