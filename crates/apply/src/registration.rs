//! Session registration: the on-disk record that an apply pass is in
//! flight.
//!
//! Registration is written before the first mutating step and removed
//! after the last one, so its presence on startup means a previous
//! session did not finish. A registration parked with `resumable` set
//! carries the plan digest the interrupted session was executing, which
//! lets the next session refuse to resume against a different plan.

use std::path::PathBuf;

use async_trait::async_trait;
use bndl_errors::Result;
use bndl_fileops::atomic_write;
use bndl_types::RequestedAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

const REGISTRATION_FILE: &str = "registration.json";

/// Durable record of an apply session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub session_id: Uuid,
    pub bundle_id: String,
    pub action: RequestedAction,
    pub plan_digest: String,
    pub created_at: DateTime<Utc>,
    /// Whether a later session may pick this one up where it stopped.
    pub resumable: bool,
}

impl Registration {
    #[must_use]
    pub fn new(bundle_id: impl Into<String>, action: RequestedAction, plan_digest: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            bundle_id: bundle_id.into(),
            action,
            plan_digest: plan_digest.into(),
            created_at: Utc::now(),
            resumable: false,
        }
    }
}

/// Reads and writes the registration record under a fixed directory.
#[derive(Debug, Clone)]
pub struct RegistrationStore {
    directory: PathBuf,
}

impl RegistrationStore {
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.directory.join(REGISTRATION_FILE)
    }

    /// Loads the current registration, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or
    /// parsed.
    pub async fn load(&self) -> Result<Option<Registration>> {
        let path = self.path();
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let raw = fs::read(&path).await?;
        let registration = serde_json::from_slice(&raw)?;
        Ok(Some(registration))
    }

    /// Writes `registration`, replacing any previous record atomically.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created or the
    /// write fails.
    pub async fn save(&self, registration: &Registration) -> Result<()> {
        fs::create_dir_all(&self.directory).await?;
        let raw = serde_json::to_vec_pretty(registration)?;
        atomic_write(&self.path(), &raw).await?;
        tracing::debug!(
            session_id = %registration.session_id,
            resumable = registration.resumable,
            "registration saved"
        );
        Ok(())
    }

    /// Removes the registration record if present.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists and cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        let path = self.path();
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
            tracing::debug!("registration cleared");
        }
        Ok(())
    }
}

/// Machine-level services the engine brackets an apply pass with.
///
/// Kept behind a trait so hosts without restore-point support (or tests)
/// can skip it without faking the platform.
#[async_trait]
pub trait SystemServices: Send + Sync {
    /// Creates a system restore point described by `description`.
    ///
    /// # Errors
    ///
    /// Returns an error when the platform refuses or fails the request.
    /// Apply treats this as a warning, not a stop.
    async fn create_restore_point(&self, description: &str) -> Result<()>;
}

/// Services stub that fulfils every request by doing nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSystemServices;

#[async_trait]
impl SystemServices for NullSystemServices {
    async fn create_restore_point(&self, _description: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_returns_none_before_first_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistrationStore::new(dir.path());
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistrationStore::new(dir.path());
        let mut registration = Registration::new("demo", RequestedAction::Install, "abc123");
        registration.resumable = true;

        store.save(&registration).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, registration);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistrationStore::new(dir.path());
        let registration = Registration::new("demo", RequestedAction::Install, "abc123");

        store.save(&registration).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }
}
