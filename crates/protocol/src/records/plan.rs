//! Plan phase records

use bndl_types::package::{BoundaryId, PackageId};
use bndl_types::{PackageOperation, PackageState};
use serde::{Deserialize, Serialize};

use super::FailureInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanBeginArgs {
    pub package_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPackageBeginArgs {
    pub package_id: PackageId,
    pub state: PackageState,
    /// Operation the planner chose before extension overrides
    pub recommended: PackageOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanPackageBeginResults {
    pub cancel: bool,
    /// Override for the planned operation; `None` accepts the
    /// recommendation
    pub requested: Option<PackageOperation>,
    /// Keep the cached payload after a successful apply.
    /// Since 1.1; `None` for older extensions.
    pub cache_keep: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPackageCompleteArgs {
    pub package_id: PackageId,
    pub operation: PackageOperation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRollbackBoundaryArgs {
    pub boundary_id: BoundaryId,
    /// Whether the manifest marks the boundary transactional
    pub transaction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanRollbackBoundaryResults {
    pub cancel: bool,
    /// Override for the transactional flag; `None` accepts the manifest
    pub transaction: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCompleteArgs {
    pub failure: Option<FailureInfo>,
}
