//! Detection results

use bndl_protocol::FailureInfo;
use bndl_types::package::PackageId;
use bndl_types::version::FileVersion;
use bndl_types::PackageState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inspector::RelatedBundle;

/// Classify an installed version against the declared one.
///
/// An older installed version reads as `Obsolete`, a newer one as
/// `Superseded`; the planner turns those into upgrade and downgrade
/// decisions.
#[must_use]
pub fn classify(declared: FileVersion, installed: Option<FileVersion>) -> PackageState {
    match installed {
        None => PackageState::Absent,
        Some(found) if found == declared => PackageState::Present,
        Some(found) if found < declared => PackageState::Obsolete,
        Some(_) => PackageState::Superseded,
    }
}

/// One package's detection outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPackage {
    pub id: PackageId,
    pub declared_version: FileVersion,
    pub state: PackageState,
    pub installed_version: Option<FileVersion>,
    /// Whether the payload already sits in the local store; `None` when
    /// no store was consulted
    pub cached: Option<bool>,
    /// Inspection failure that left the state `Unknown`
    pub failure: Option<FailureInfo>,
}

/// Machine state captured by one detect pass
///
/// Plans are built against a snapshot, never against the live machine,
/// so one detect pass can back several planning attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSnapshot {
    pub bundle_id: String,
    pub taken_at: DateTime<Utc>,
    /// Manifest order
    pub packages: Vec<DetectedPackage>,
    pub related_bundles: Vec<RelatedBundle>,
}

impl DetectionSnapshot {
    #[must_use]
    pub fn package(&self, id: &PackageId) -> Option<&DetectedPackage> {
        self.packages.iter().find(|p| &p.id == id)
    }

    /// Ids of packages whose inspection failed, in manifest order.
    #[must_use]
    pub fn failed_packages(&self) -> Vec<PackageId> {
        self.packages
            .iter()
            .filter(|p| p.failure.is_some())
            .map(|p| p.id.clone())
            .collect()
    }
}
