//! Journal of deletes that could not happen yet
//!
//! When a locked file refuses to die even after retries, its path goes
//! into this journal. The engine drains the journal on the next startup,
//! before any phase runs, so stale payloads and helper binaries do not
//! survive a session that could not remove them.

use std::path::{Path, PathBuf};

use bndl_errors::{Error, FileOpError, Result};
use serde::{Deserialize, Serialize};

use crate::ops::{atomic_write, delete_file};
use crate::retry::RetryPolicy;

/// Existence of a path with the journal folded in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Present,
    Absent,
    /// On disk now, but scheduled for deletion at next startup
    PendingDelete,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalFile {
    pending: Vec<PathBuf>,
}

/// Result of a drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub deleted: usize,
    /// Paths still locked; they stay in the journal
    pub remaining: usize,
}

/// Persistent list of paths awaiting deletion
#[derive(Debug, Clone)]
pub struct PendingDeleteJournal {
    path: PathBuf,
}

impl PendingDeleteJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<PathBuf>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let journal: JournalFile = serde_json::from_slice(&bytes)?;
                Ok(journal.pending)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::FileOp(FileOpError::from_io_with_path(&e, &self.path))),
        }
    }

    async fn save(&self, pending: Vec<PathBuf>) -> Result<()> {
        if pending.is_empty() {
            return delete_file(&self.path, RetryPolicy::none()).await;
        }
        let bytes = serde_json::to_vec_pretty(&JournalFile { pending })?;
        atomic_write(&self.path, &bytes).await
    }

    /// Record that `target` should be deleted at the next startup.
    ///
    /// # Errors
    ///
    /// Returns an error when the journal itself cannot be updated.
    pub async fn schedule(&self, target: &Path) -> Result<()> {
        let mut pending = self.load().await?;
        if !pending.iter().any(|p| p == target) {
            pending.push(target.to_path_buf());
            self.save(pending).await?;
            tracing::debug!(path = %target.display(), "scheduled pending delete");
        }
        Ok(())
    }

    /// Withdraw a previously scheduled deletion, for example because the
    /// path is about to be rewritten with fresh content.
    ///
    /// # Errors
    ///
    /// Returns an error when the journal itself cannot be updated.
    pub async fn unschedule(&self, target: &Path) -> Result<()> {
        let mut pending = self.load().await?;
        let before = pending.len();
        pending.retain(|p| p != target);
        if pending.len() != before {
            self.save(pending).await?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error when the journal cannot be read.
    pub async fn is_scheduled(&self, target: &Path) -> Result<bool> {
        Ok(self.load().await?.iter().any(|p| p == target))
    }

    /// Existence of `target` with scheduled deletions taken into account.
    ///
    /// # Errors
    ///
    /// Returns an error when the journal or the path cannot be read.
    pub async fn path_state(&self, target: &Path) -> Result<PathState> {
        let exists = tokio::fs::try_exists(target)
            .await
            .map_err(|e| Error::FileOp(FileOpError::from_io_with_path(&e, target)))?;
        if !exists {
            return Ok(PathState::Absent);
        }
        if self.is_scheduled(target).await? {
            return Ok(PathState::PendingDelete);
        }
        Ok(PathState::Present)
    }

    /// Delete `target` now, or schedule it when the delete keeps losing
    /// to a lock. Returns true when the file is gone.
    ///
    /// # Errors
    ///
    /// Returns an error for non-lock failures and journal update failures.
    pub async fn delete_or_schedule(&self, target: &Path, policy: RetryPolicy) -> Result<bool> {
        match delete_file(target, policy).await {
            Ok(()) => {
                self.unschedule(target).await?;
                Ok(true)
            }
            Err(Error::FileOp(
                FileOpError::TargetLocked { .. } | FileOpError::PermissionDenied { .. },
            )) => {
                self.schedule(target).await?;
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Attempt every scheduled deletion. Paths that stay locked remain
    /// scheduled for the next drain.
    ///
    /// # Errors
    ///
    /// Returns an error when the journal itself cannot be read or written.
    pub async fn drain(&self, policy: RetryPolicy) -> Result<DrainReport> {
        let pending = self.load().await?;
        if pending.is_empty() {
            return Ok(DrainReport {
                deleted: 0,
                remaining: 0,
            });
        }

        let mut remaining = Vec::new();
        let mut deleted = 0usize;
        for target in pending {
            match delete_file(&target, policy).await {
                Ok(()) => deleted += 1,
                Err(err) => {
                    tracing::debug!(
                        path = %target.display(),
                        error = %err,
                        "pending delete still blocked"
                    );
                    remaining.push(target);
                }
            }
        }
        let report = DrainReport {
            deleted,
            remaining: remaining.len(),
        };
        self.save(remaining).await?;
        Ok(report)
    }
}
