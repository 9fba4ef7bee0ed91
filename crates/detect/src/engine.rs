//! The detect pass

use std::sync::Arc;

use bndl_errors::{DetectError, Result};
use bndl_protocol::records::{
    DetectBeginArgs, DetectCompleteArgs, DetectPackageBeginArgs, DetectPackageCompleteArgs,
    DetectRelatedBundleArgs,
};
use bndl_protocol::{Dispatcher, FailureInfo, MessageArgs};
use bndl_types::package::Bundle;
use bndl_types::PackageState;
use chrono::Utc;

use crate::inspector::{CacheProbe, MachineInspector};
use crate::snapshot::{classify, DetectedPackage, DetectionSnapshot};

/// Runs detection over one bundle and reports every step to the
/// extension
pub struct DetectEngine {
    dispatcher: Arc<Dispatcher>,
    cache_probe: Option<Arc<dyn CacheProbe>>,
}

impl DetectEngine {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            cache_probe: None,
        }
    }

    /// Consult a payload store so detection can report cached state.
    #[must_use]
    pub fn with_cache_probe(mut self, probe: Arc<dyn CacheProbe>) -> Self {
        self.cache_probe = Some(probe);
        self
    }

    /// Run one detect pass over the bundle.
    ///
    /// Per-package inspection failures do not abort the pass; they are
    /// folded into the snapshot as `Unknown` packages.
    ///
    /// # Errors
    ///
    /// Returns an error when the extension cancels or related bundle
    /// enumeration fails. `DetectComplete` is dispatched either way.
    pub async fn detect(
        &self,
        bundle: &Bundle,
        inspector: &dyn MachineInspector,
    ) -> Result<DetectionSnapshot> {
        self.dispatcher
            .dispatch_checked(MessageArgs::DetectBegin(DetectBeginArgs {
                package_count: bundle.packages.len(),
            }))?;
        tracing::info!(bundle = %bundle.id, packages = bundle.packages.len(), "detect started");

        match self.run(bundle, inspector).await {
            Ok(snapshot) => {
                self.dispatcher
                    .announce(MessageArgs::DetectComplete(DetectCompleteArgs {
                        failure: None,
                        failed_packages: snapshot.failed_packages(),
                    }));
                Ok(snapshot)
            }
            Err(err) => {
                self.dispatcher
                    .announce(MessageArgs::DetectComplete(DetectCompleteArgs {
                        failure: Some(FailureInfo::from_error(&err)),
                        failed_packages: Vec::new(),
                    }));
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        bundle: &Bundle,
        inspector: &dyn MachineInspector,
    ) -> Result<DetectionSnapshot> {
        let related_bundles = inspector.related_bundles(bundle).await.map_err(|err| {
            DetectError::EnumerationFailed {
                message: err.to_string(),
            }
        })?;
        for related in &related_bundles {
            tracing::info!(
                bundle = %related.bundle_id,
                relation = %related.relation,
                version = %related.version,
                "related bundle registered"
            );
            self.dispatcher
                .dispatch_checked(MessageArgs::DetectRelatedBundle(DetectRelatedBundleArgs {
                    bundle_id: related.bundle_id.clone(),
                    relation: related.relation,
                    version: related.version,
                }))?;
        }

        let mut packages = Vec::with_capacity(bundle.packages.len());
        for package in &bundle.packages {
            self.dispatcher
                .dispatch_checked(MessageArgs::DetectPackageBegin(DetectPackageBeginArgs {
                    package_id: package.id.clone(),
                }))?;

            let mut detected = match inspector.installed_version(package).await {
                Ok(installed) => DetectedPackage {
                    id: package.id.clone(),
                    declared_version: package.version,
                    state: classify(package.version, installed),
                    installed_version: installed,
                    cached: None,
                    failure: None,
                },
                Err(err) => {
                    tracing::warn!(package = %package.id, error = %err, "inspection failed");
                    DetectedPackage {
                        id: package.id.clone(),
                        declared_version: package.version,
                        state: PackageState::Unknown,
                        installed_version: None,
                        cached: None,
                        failure: Some(FailureInfo::from_error(&err)),
                    }
                }
            };
            if let Some(probe) = &self.cache_probe {
                detected.cached = Some(probe.contains(package).await);
            }

            self.dispatcher
                .announce(MessageArgs::DetectPackageComplete(
                    DetectPackageCompleteArgs {
                        package_id: detected.id.clone(),
                        state: detected.state,
                        installed_version: detected.installed_version,
                        failure: detected.failure.clone(),
                        cached: detected.cached,
                    },
                ));
            tracing::debug!(package = %package.id, state = %detected.state, "package detected");
            packages.push(detected);
        }

        Ok(DetectionSnapshot {
            bundle_id: bundle.id.clone(),
            taken_at: Utc::now(),
            packages,
            related_bundles,
        })
    }
}
