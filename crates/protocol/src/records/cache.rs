//! Cache stage records: payload resolution, acquisition and
//! verification

use bndl_types::package::PackageId;
use serde::{Deserialize, Serialize};

use super::FailureInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheBeginArgs {
    pub package_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePackageBeginArgs {
    pub package_id: PackageId,
    pub payload_name: String,
    /// Declared payload size, when the manifest carries one
    pub total_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheAcquireResolvingArgs {
    pub package_id: PackageId,
    /// Candidate sources, rendered for display, in manifest order
    pub sources: Vec<String>,
    /// Index into `sources` the engine would try first
    pub recommended: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheAcquireResolvingResults {
    pub cancel: bool,
    /// Index of the source to try instead; out-of-range picks are
    /// ignored
    pub chosen: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheAcquireBeginArgs {
    pub package_id: PackageId,
    pub source: String,
    /// Zero-based attempt counter across the bounded retry loop
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheAcquireProgressArgs {
    pub package_id: PackageId,
    pub bytes: u64,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheAcquireCompleteArgs {
    pub package_id: PackageId,
    pub failure: Option<FailureInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheVerifyBeginArgs {
    pub package_id: PackageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheVerifyProgressArgs {
    pub package_id: PackageId,
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheVerifyCompleteArgs {
    pub package_id: PackageId,
    pub failure: Option<FailureInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePackageCompleteArgs {
    pub package_id: PackageId,
    pub failure: Option<FailureInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheCompleteArgs {
    pub failure: Option<FailureInfo>,
}
