//! Per-entry and whole-pass outcomes reported after apply.

use bndl_protocol::FailureInfo;
use bndl_types::{ApplyStatus, PackageId, PackageOperation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How one plan entry ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Succeeded,
    Failed,
    /// Succeeded first, then undone when its group rolled back.
    RolledBack,
    /// Never ran because a package it depends on failed to cache.
    Blocked,
    /// Never ran because the pass stopped first.
    Skipped,
}

/// Outcome of one plan entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub package_id: PackageId,
    pub operation: PackageOperation,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
}

/// What an apply pass did, entry by entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub status: ApplyStatus,
    pub session_id: Uuid,
    pub entries: Vec<EntryOutcome>,
    /// The failure that decided a non-success status, when one did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
}

impl ApplySummary {
    #[must_use]
    pub fn outcome(&self, package_id: &PackageId) -> Option<&EntryOutcome> {
        self.entries.iter().find(|e| &e.package_id == package_id)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
