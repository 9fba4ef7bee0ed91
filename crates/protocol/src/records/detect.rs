//! Detect phase records

use bndl_types::package::PackageId;
use bndl_types::version::FileVersion;
use bndl_types::{BundleRelation, PackageState};
use serde::{Deserialize, Serialize};

use super::FailureInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetectBeginArgs {
    pub package_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectRelatedBundleArgs {
    pub bundle_id: String,
    pub relation: BundleRelation,
    pub version: FileVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectPackageBeginArgs {
    pub package_id: PackageId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectPackageCompleteArgs {
    pub package_id: PackageId,
    pub state: PackageState,
    pub installed_version: Option<FileVersion>,
    /// Set when inspection failed and `state` is `Unknown`
    pub failure: Option<FailureInfo>,
    /// Whether the payload is already present in the cache store.
    /// Since 1.1; `None` for older extensions.
    pub cached: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectCompleteArgs {
    pub failure: Option<FailureInfo>,
    /// Packages whose inspection failed, in manifest order
    pub failed_packages: Vec<PackageId>,
}
