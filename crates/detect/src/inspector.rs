//! Machine inspection seam
//!
//! [`MachineInspector`] answers the two questions detection asks: what
//! version of a package is installed, and which related bundles are
//! registered. [`PathProbeInspector`] is the file-based implementation;
//! tests and embedders substitute their own.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bndl_errors::Result;
use bndl_types::package::{Bundle, Package, PackageId};
use bndl_types::version::FileVersion;
use bndl_types::BundleRelation;
use serde::{Deserialize, Serialize};

/// Another bundle registered on the machine that relates to this one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedBundle {
    pub bundle_id: String,
    pub relation: BundleRelation,
    pub version: FileVersion,
}

/// Read-only view of the machine used during detection
#[async_trait]
pub trait MachineInspector: Send + Sync {
    /// Version of the package currently installed, `None` when absent.
    ///
    /// # Errors
    ///
    /// Any inspection failure. The phase records the package as
    /// `Unknown` and continues.
    async fn installed_version(&self, package: &Package) -> Result<Option<FileVersion>>;

    /// Registered bundles related to the one being detected.
    ///
    /// # Errors
    ///
    /// Enumeration failures abort the whole detect phase.
    async fn related_bundles(&self, bundle: &Bundle) -> Result<Vec<RelatedBundle>>;
}

/// Answers whether a package payload is already in the local store
#[async_trait]
pub trait CacheProbe: Send + Sync {
    async fn contains(&self, package: &Package) -> bool;
}

/// Inspector that probes one key file per package
///
/// A package is considered installed when its probe file exists; the
/// installed version is the file's embedded [`FileVersion`], or zero
/// when the file carries no version resource. Packages without a
/// registered probe always read as absent.
#[derive(Debug, Clone, Default)]
pub struct PathProbeInspector {
    probes: HashMap<PackageId, PathBuf>,
    related: Vec<RelatedBundle>,
}

impl PathProbeInspector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_probe(mut self, package_id: impl Into<PackageId>, path: impl Into<PathBuf>) -> Self {
        self.probes.insert(package_id.into(), path.into());
        self
    }

    #[must_use]
    pub fn with_related(mut self, related: RelatedBundle) -> Self {
        self.related.push(related);
        self
    }
}

#[async_trait]
impl MachineInspector for PathProbeInspector {
    async fn installed_version(&self, package: &Package) -> Result<Option<FileVersion>> {
        let Some(path) = self.probes.get(&package.id) else {
            tracing::debug!(package = %package.id, "no probe registered, treating as absent");
            return Ok(None);
        };
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }
        match bndl_fileops::inspect::file_version(path).await {
            Ok(version) => Ok(Some(version)),
            Err(bndl_errors::Error::FileOp(bndl_errors::FileOpError::VersionNotFound { .. })) => {
                Ok(Some(FileVersion::ZERO))
            }
            Err(err) => Err(err),
        }
    }

    async fn related_bundles(&self, _bundle: &Bundle) -> Result<Vec<RelatedBundle>> {
        Ok(self.related.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(id: &str) -> Package {
        Package::new(id, FileVersion::new(1, 0, 0, 0), "main")
    }

    #[tokio::test]
    async fn unregistered_package_reads_absent() {
        let inspector = PathProbeInspector::new();
        let found = inspector.installed_version(&package("app")).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn missing_probe_file_reads_absent() {
        let dir = tempfile::tempdir().unwrap();
        let inspector =
            PathProbeInspector::new().with_probe("app", dir.path().join("not-there.bin"));
        let found = inspector.installed_version(&package("app")).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn versionless_file_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.bin");
        tokio::fs::write(&path, b"no version resource here").await.unwrap();
        let inspector = PathProbeInspector::new().with_probe("app", &path);
        let found = inspector.installed_version(&package("app")).await.unwrap();
        assert_eq!(found, Some(FileVersion::ZERO));
    }
}
