//! Execute stage records, including transaction open, commit and
//! rollback

use bndl_types::package::{BoundaryId, PackageId};
use bndl_types::PackageOperation;
use serde::{Deserialize, Serialize};

use super::FailureInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecuteBeginArgs {
    pub entry_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOpenBeginArgs {
    pub boundary_id: BoundaryId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionOpenCompleteArgs {
    pub boundary_id: BoundaryId,
    pub failure: Option<FailureInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutePackageBeginArgs {
    pub package_id: PackageId,
    pub operation: PackageOperation,
    /// True while replaying inverse operations during rollback
    pub rollback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteProgressArgs {
    pub package_id: PackageId,
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutePackageCompleteArgs {
    pub package_id: PackageId,
    pub operation: PackageOperation,
    pub failure: Option<FailureInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCommitBeginArgs {
    pub boundary_id: BoundaryId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCommitCompleteArgs {
    pub boundary_id: BoundaryId,
    pub failure: Option<FailureInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRollbackBeginArgs {
    pub boundary_id: BoundaryId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRollbackCompleteArgs {
    pub boundary_id: BoundaryId,
    pub failure: Option<FailureInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteCompleteArgs {
    pub failure: Option<FailureInfo>,
}
