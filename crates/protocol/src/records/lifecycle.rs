//! Session lifecycle, error escalation and progress records

use bndl_types::package::PackageId;
use serde::{Deserialize, Serialize};

use super::FailureInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartupArgs {
    /// True when a registration from an interrupted apply was found
    pub resume: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShutdownArgs {}

/// How an extension wants an out-of-transaction execute failure handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    Retry,
    Ignore,
    Abort,
}

impl std::fmt::Display for ErrorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retry => write!(f, "retry"),
            Self::Ignore => write!(f, "ignore"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorArgs {
    pub package_id: Option<PackageId>,
    pub failure: FailureInfo,
    /// Actions the engine is willing to honor for this failure
    pub allowed: Vec<ErrorAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorResults {
    /// None defers to the engine default for the failing package
    pub action: Option<ErrorAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressArgs {
    /// Progress of the current stage, 0 to 100
    pub percent: u8,
    /// Progress of the whole apply, 0 to 100
    pub overall_percent: u8,
}
