//! Execution seam between the engine and whatever applies packages to
//! the machine.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bndl_errors::Result;
use bndl_protocol::records::ExecuteProgressArgs;
use bndl_protocol::{Dispatcher, MessageArgs};
use bndl_types::{Package, PackageId, PackageOperation};

/// Progress channel handed to an executor for one package.
///
/// Forward progress is cancelable through the extension; rollback
/// progress is announced but a rollback never stops halfway.
pub struct ExecutionProgress {
    dispatcher: Arc<Dispatcher>,
    package_id: PackageId,
    rollback: bool,
}

impl ExecutionProgress {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, package_id: PackageId, rollback: bool) -> Self {
        Self {
            dispatcher,
            package_id,
            rollback,
        }
    }

    /// Reports `percent` complete and returns whether to keep going.
    #[must_use]
    pub fn report(&self, percent: u8) -> bool {
        let results = self
            .dispatcher
            .dispatch(MessageArgs::ExecuteProgress(ExecuteProgressArgs {
                package_id: self.package_id.clone(),
                percent,
            }));
        self.rollback || !results.cancel_requested()
    }
}

impl std::fmt::Debug for ExecutionProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionProgress")
            .field("package_id", &self.package_id)
            .field("rollback", &self.rollback)
            .finish_non_exhaustive()
    }
}

/// Applies one plan entry to the machine.
///
/// The engine owns ordering, rollback, and failure policy; an executor
/// only has to make a single `(package, operation)` happen. `payload`
/// points into the cache for operations that install bytes and is
/// `None` for uninstalls.
#[async_trait]
pub trait PackageExecutor: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the operation cannot be completed. The
    /// engine decides whether that aborts, rolls back, or is ignored.
    async fn execute(
        &self,
        package: &Package,
        operation: PackageOperation,
        payload: Option<&Path>,
        progress: &ExecutionProgress,
    ) -> Result<()>;
}

/// Extra validation over a staged payload before it enters the cache.
///
/// The digest comparison always runs; a verifier adds checks the digest
/// cannot express, like signature validation.
#[async_trait]
pub trait PayloadVerifier: Send + Sync {
    /// # Errors
    ///
    /// Returns an error to reject the payload; the acquisition is then
    /// retried or failed like any other verification mismatch.
    async fn verify(&self, package: &Package, payload: &Path) -> Result<()>;
}

/// Verifier that accepts every payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVerifier;

#[async_trait]
impl PayloadVerifier for NullVerifier {
    async fn verify(&self, _package: &Package, _payload: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bndl_protocol::{ApiVersion, Extension, MessageResults};

    struct CancelEverything;

    impl Extension for CancelEverything {
        fn api_version(&self) -> ApiVersion {
            ApiVersion::CURRENT
        }

        fn on_message(&self, _args: &MessageArgs, results: &mut MessageResults) -> Result<()> {
            results.veto();
            Ok(())
        }
    }

    fn cancelling_dispatcher() -> Arc<Dispatcher> {
        Arc::new(Dispatcher::create(Arc::new(CancelEverything)).unwrap())
    }

    #[test]
    fn forward_progress_honours_cancellation() {
        let progress = ExecutionProgress::new(cancelling_dispatcher(), "app".into(), false);
        assert!(!progress.report(40));
    }

    #[test]
    fn rollback_progress_ignores_cancellation() {
        let progress = ExecutionProgress::new(cancelling_dispatcher(), "app".into(), true);
        assert!(progress.report(40));
    }

    #[test]
    fn progress_reports_the_package_id() {
        struct SawPackage(std::sync::Mutex<Option<PackageId>>);

        impl Extension for SawPackage {
            fn api_version(&self) -> ApiVersion {
                ApiVersion::CURRENT
            }

            fn on_message(&self, args: &MessageArgs, _results: &mut MessageResults) -> Result<()> {
                if let MessageArgs::ExecuteProgress(args) = args {
                    *self.0.lock().unwrap() = Some(args.package_id.clone());
                }
                Ok(())
            }
        }

        let extension = Arc::new(SawPackage(std::sync::Mutex::new(None)));
        let dispatcher = Arc::new(Dispatcher::create(extension.clone()).unwrap());
        let progress = ExecutionProgress::new(dispatcher, "app.core".into(), false);
        assert!(progress.report(10));
        assert_eq!(
            extension.0.lock().unwrap().clone(),
            Some(PackageId::from("app.core"))
        );
    }
}
