//! The plan and its entries

use bndl_errors::Result;
use bndl_types::package::{BoundaryId, PackageId, Payload};
use bndl_types::{PackageOperation, RequestedAction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One payload to place in the local store before execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub package_id: PackageId,
    pub payload: Payload,
    /// Keep the stored payload after a successful apply
    pub keep: bool,
}

/// One executor invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteEntry {
    pub package_id: PackageId,
    pub operation: PackageOperation,
    pub boundary: BoundaryId,
    /// Index into [`Plan::groups`] when the boundary is transactional
    pub group: Option<usize>,
}

/// Undo for one completed execute entry of a transaction group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEntry {
    pub package_id: PackageId,
    pub operation: PackageOperation,
    pub group: usize,
}

/// A transactional rollback boundary materialized in the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionGroup {
    pub boundary: BoundaryId,
    /// A vital group failing stops the whole apply after rollback
    pub vital: bool,
}

/// Ordered actions for one apply pass
///
/// `rollback` holds, for every transaction group, the inverse of each
/// execute entry; the apply engine replays the completed slice of a
/// failing group in reverse order. Entries whose operation has no
/// inverse never enter a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub bundle_id: String,
    pub action: RequestedAction,
    pub cache: Vec<CacheEntry>,
    pub execute: Vec<ExecuteEntry>,
    pub rollback: Vec<RollbackEntry>,
    pub groups: Vec<TransactionGroup>,
    /// Content digest over everything except the random `id`
    pub digest: String,
}

/// The digest ignores the run-scoped id so re-planning the same inputs
/// is recognizable across sessions.
#[derive(Serialize)]
struct DigestView<'a> {
    bundle_id: &'a str,
    action: RequestedAction,
    cache: &'a [CacheEntry],
    execute: &'a [ExecuteEntry],
    rollback: &'a [RollbackEntry],
    groups: &'a [TransactionGroup],
}

impl Plan {
    pub(crate) fn seal(
        bundle_id: String,
        action: RequestedAction,
        cache: Vec<CacheEntry>,
        execute: Vec<ExecuteEntry>,
        rollback: Vec<RollbackEntry>,
        groups: Vec<TransactionGroup>,
    ) -> Result<Self> {
        let view = DigestView {
            bundle_id: &bundle_id,
            action,
            cache: &cache,
            execute: &execute,
            rollback: &rollback,
            groups: &groups,
        };
        let digest = blake3::hash(&serde_json::to_vec(&view)?).to_hex().to_string();
        Ok(Self {
            id: Uuid::new_v4(),
            bundle_id,
            action,
            cache,
            execute,
            rollback,
            groups,
            digest,
        })
    }

    /// True when the plan would not touch the machine.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.execute.is_empty()
    }

    /// Rollback entries of one group, in replay (reverse) order.
    #[must_use]
    pub fn rollback_for_group(&self, group: usize) -> Vec<&RollbackEntry> {
        self.rollback.iter().filter(|r| r.group == group).collect()
    }

    #[must_use]
    pub fn cache_entry(&self, id: &PackageId) -> Option<&CacheEntry> {
        self.cache.iter().find(|c| &c.package_id == id)
    }
}
