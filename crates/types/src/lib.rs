#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core types shared across the bndl bootstrapper
//!
//! The bundle model (packages, payloads, rollback boundaries), the packed
//! four-part file version, and the small enums every phase speaks.

pub mod package;
pub mod version;

pub use package::{
    BoundaryId, Bundle, Feature, Package, PackageId, Payload, PayloadSource, RollbackBoundary,
};
pub use version::FileVersion;

use serde::{Deserialize, Serialize};

/// Processor architecture of an executable image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86,
    X64,
    Arm64,
    Unknown,
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X86 => write!(f, "x86"),
            Self::X64 => write!(f, "x64"),
            Self::Arm64 => write!(f, "arm64"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Overall action the caller asked the engine to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedAction {
    Install,
    Uninstall,
    Repair,
    Modify,
}

impl std::fmt::Display for RequestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Uninstall => write!(f, "uninstall"),
            Self::Repair => write!(f, "repair"),
            Self::Modify => write!(f, "modify"),
        }
    }
}

/// Operation planned for a single package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageOperation {
    None,
    Install,
    Repair,
    Patch,
    Uninstall,
}

impl PackageOperation {
    /// Whether executing this operation requires the package payload
    /// to be present in the cache.
    #[must_use]
    pub const fn needs_payload(self) -> bool {
        matches!(self, Self::Install | Self::Repair | Self::Patch)
    }

    /// Operation that restores the pre-transaction state after this one
    /// ran inside a rolled-back transaction. Repair is its own inverse.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Install | Self::Patch => Self::Uninstall,
            Self::Repair => Self::Repair,
            Self::Uninstall => Self::Install,
        }
    }
}

impl std::fmt::Display for PackageOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Install => write!(f, "install"),
            Self::Repair => write!(f, "repair"),
            Self::Patch => write!(f, "patch"),
            Self::Uninstall => write!(f, "uninstall"),
        }
    }
}

/// Observed state of a package on the machine
///
/// `Obsolete` means the installed copy is older than the bundled package;
/// `Superseded` means it is newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageState {
    Unknown,
    Absent,
    Present,
    Obsolete,
    Superseded,
}

impl std::fmt::Display for PackageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Absent => write!(f, "absent"),
            Self::Present => write!(f, "present"),
            Self::Obsolete => write!(f, "obsolete"),
            Self::Superseded => write!(f, "superseded"),
        }
    }
}

/// Final disposition of an apply pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    Success,
    SuccessWithWarnings,
    Failed,
    FailedRolledBack,
}

impl ApplyStatus {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::SuccessWithWarnings)
    }
}

impl std::fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::SuccessWithWarnings => write!(f, "success_with_warnings"),
            Self::Failed => write!(f, "failed"),
            Self::FailedRolledBack => write!(f, "failed_rolled_back"),
        }
    }
}

/// How another bundle found on the machine relates to this one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleRelation {
    Upgrade,
    Downgrade,
    Addon,
    Patch,
}

impl std::fmt::Display for BundleRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upgrade => write!(f, "upgrade"),
            Self::Downgrade => write!(f, "downgrade"),
            Self::Addon => write!(f, "addon"),
            Self::Patch => write!(f, "patch"),
        }
    }
}
