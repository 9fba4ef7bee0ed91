//! Bundle manifest model
//!
//! A [`Bundle`] names an ordered set of [`Package`]s, each carrying one
//! [`Payload`] and an assignment to a [`RollbackBoundary`]. Manifest order
//! is meaningful: planning uses it to break ties deterministically.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Arch, FileVersion};

/// Stable identifier of a package within its bundle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(String);

impl PackageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PackageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable identifier of a rollback boundary within its bundle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundaryId(String);

impl BoundaryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BoundaryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a payload can be acquired from, in preference order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSource {
    /// A file already on the local machine
    LocalFile { path: PathBuf },
    /// A download URL
    Url { url: String },
    /// An entry inside a tar container on the local machine
    Container { path: PathBuf, entry: String },
}

impl std::fmt::Display for PayloadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalFile { path } => write!(f, "file:{}", path.display()),
            Self::Url { url } => write!(f, "{url}"),
            Self::Container { path, entry } => {
                write!(f, "container:{}!{entry}", path.display())
            }
        }
    }
}

/// The single payload a package installs from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// File name the payload is staged under
    pub name: String,
    /// Expected blake3 digest, hex encoded. None skips the declared check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Expected size in bytes, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Acquisition sources in preference order
    pub sources: Vec<PayloadSource>,
}

impl Payload {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            digest: None,
            size: None,
            sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: PayloadSource) -> Self {
        self.sources.push(source);
        self
    }
}

/// An optional user-selectable feature of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub title: String,
    /// Whether the feature is selected in the current request
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

impl Feature {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            enabled: true,
        }
    }
}

/// A unit of installation inside a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub version: FileVersion,
    #[serde(default = "default_arch")]
    pub arch: Arch,
    /// A vital package failing fails the whole apply
    #[serde(default = "default_true")]
    pub vital: bool,
    /// Permanent packages are never uninstalled
    #[serde(default)]
    pub permanent: bool,
    /// Packages that must be processed before this one
    #[serde(default)]
    pub depends_on: Vec<PackageId>,
    pub payload: Payload,
    #[serde(default)]
    pub features: Vec<Feature>,
    /// Rollback boundary this package belongs to
    pub boundary: BoundaryId,
}

const fn default_arch() -> Arch {
    Arch::Unknown
}

impl Package {
    pub fn new(
        id: impl Into<PackageId>,
        version: FileVersion,
        boundary: impl Into<BoundaryId>,
    ) -> Self {
        let id = id.into();
        Self {
            payload: Payload::new(format!("{id}.payload")),
            id,
            version,
            arch: Arch::Unknown,
            vital: true,
            permanent: false,
            depends_on: Vec::new(),
            features: Vec::new(),
            boundary: boundary.into(),
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_dependency(mut self, dependency: impl Into<PackageId>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    #[must_use]
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    #[must_use]
    pub const fn vital(mut self, vital: bool) -> Self {
        self.vital = vital;
        self
    }

    #[must_use]
    pub const fn permanent(mut self, permanent: bool) -> Self {
        self.permanent = permanent;
        self
    }

    #[must_use]
    pub const fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }
}

/// A point in the package chain where rollback stops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackBoundary {
    pub id: BoundaryId,
    /// Transactional boundaries undo their completed packages on failure
    #[serde(default)]
    pub transaction: bool,
    /// A vital boundary failing stops the apply after rollback
    #[serde(default = "default_true")]
    pub vital: bool,
}

impl RollbackBoundary {
    pub fn new(id: impl Into<BoundaryId>) -> Self {
        Self {
            id: id.into(),
            transaction: false,
            vital: true,
        }
    }

    #[must_use]
    pub const fn transactional(mut self, transaction: bool) -> Self {
        self.transaction = transaction;
        self
    }

    #[must_use]
    pub const fn vital(mut self, vital: bool) -> Self {
        self.vital = vital;
        self
    }
}

/// The root manifest the engine operates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: String,
    pub name: String,
    pub version: FileVersion,
    /// Packages in manifest order
    pub packages: Vec<Package>,
    /// Boundaries in manifest order
    pub boundaries: Vec<RollbackBoundary>,
}

impl Bundle {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: FileVersion) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version,
            packages: Vec::new(),
            boundaries: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_package(mut self, package: Package) -> Self {
        self.packages.push(package);
        self
    }

    #[must_use]
    pub fn with_boundary(mut self, boundary: RollbackBoundary) -> Self {
        self.boundaries.push(boundary);
        self
    }

    #[must_use]
    pub fn package(&self, id: &PackageId) -> Option<&Package> {
        self.packages.iter().find(|p| &p.id == id)
    }

    #[must_use]
    pub fn boundary(&self, id: &BoundaryId) -> Option<&RollbackBoundary> {
        self.boundaries.iter().find(|b| &b.id == id)
    }
}
