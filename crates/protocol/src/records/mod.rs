//! Argument and result records for every core message
//!
//! One argument record and one result record per [`Message`]. Argument
//! records are written by the engine and read by extensions; result
//! records travel the other way. Fields added after protocol 1.0 carry a
//! `since` note and are cleared by [`MessageArgs::clamp_to`] and
//! [`MessageResults::clamp_to`] when the negotiated version predates
//! them, so neither side ever observes a field the other cannot know.

pub mod apply;
pub mod cache;
pub mod detect;
pub mod execute;
pub mod lifecycle;
pub mod plan;

use bndl_errors::UserFacingError;
use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::version::ApiVersion;

pub use apply::{
    ApplyBeginArgs, ApplyCompleteArgs, RegisterBeginArgs, RegisterCompleteArgs,
    RestorePointBeginArgs, RestorePointCompleteArgs, UnregisterBeginArgs, UnregisterCompleteArgs,
};
pub use cache::{
    CacheAcquireBeginArgs, CacheAcquireCompleteArgs, CacheAcquireProgressArgs,
    CacheAcquireResolvingArgs, CacheAcquireResolvingResults, CacheBeginArgs,
    CacheCompleteArgs, CachePackageBeginArgs, CachePackageCompleteArgs, CacheVerifyBeginArgs,
    CacheVerifyCompleteArgs, CacheVerifyProgressArgs,
};
pub use detect::{
    DetectBeginArgs, DetectCompleteArgs, DetectPackageBeginArgs, DetectPackageCompleteArgs,
    DetectRelatedBundleArgs,
};
pub use execute::{
    ExecuteBeginArgs, ExecuteCompleteArgs, ExecutePackageBeginArgs, ExecutePackageCompleteArgs,
    ExecuteProgressArgs, TransactionCommitBeginArgs, TransactionCommitCompleteArgs,
    TransactionOpenBeginArgs, TransactionOpenCompleteArgs, TransactionRollbackBeginArgs,
    TransactionRollbackCompleteArgs,
};
pub use lifecycle::{
    ErrorAction, ErrorArgs, ErrorResults, ProgressArgs, ShutdownArgs, StartupArgs,
};
pub use plan::{
    PlanBeginArgs, PlanCompleteArgs, PlanPackageBeginArgs, PlanPackageBeginResults,
    PlanPackageCompleteArgs, PlanRollbackBoundaryArgs, PlanRollbackBoundaryResults,
};

/// User-presentable description of a failure, built from any error in
/// the workspace taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Stable machine-readable code such as `cache.digest_mismatch`
    pub code: Option<String>,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl FailureInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            hint: None,
            retryable: false,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Capture code, message, hint and retryability from an error.
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self {
            code: error.user_code().map(String::from),
            message: error.user_message().into_owned(),
            hint: error.user_hint().map(String::from),
            retryable: error.is_retryable(),
        }
    }
}

/// Result record for cancelable messages with no other writable fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CancelResults {
    pub cancel: bool,
}

/// Result record for informational messages; nothing to write back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AckResults {}

/// Argument record of a dispatch, tagged by message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageArgs {
    Startup(StartupArgs),
    Shutdown(ShutdownArgs),
    DetectBegin(DetectBeginArgs),
    DetectRelatedBundle(DetectRelatedBundleArgs),
    DetectPackageBegin(DetectPackageBeginArgs),
    DetectPackageComplete(DetectPackageCompleteArgs),
    DetectComplete(DetectCompleteArgs),
    PlanBegin(PlanBeginArgs),
    PlanPackageBegin(PlanPackageBeginArgs),
    PlanPackageComplete(PlanPackageCompleteArgs),
    PlanRollbackBoundary(PlanRollbackBoundaryArgs),
    PlanComplete(PlanCompleteArgs),
    ApplyBegin(ApplyBeginArgs),
    RegisterBegin(RegisterBeginArgs),
    RestorePointBegin(RestorePointBeginArgs),
    RestorePointComplete(RestorePointCompleteArgs),
    RegisterComplete(RegisterCompleteArgs),
    CacheBegin(CacheBeginArgs),
    CachePackageBegin(CachePackageBeginArgs),
    CacheAcquireResolving(CacheAcquireResolvingArgs),
    CacheAcquireBegin(CacheAcquireBeginArgs),
    CacheAcquireProgress(CacheAcquireProgressArgs),
    CacheAcquireComplete(CacheAcquireCompleteArgs),
    CacheVerifyBegin(CacheVerifyBeginArgs),
    CacheVerifyProgress(CacheVerifyProgressArgs),
    CacheVerifyComplete(CacheVerifyCompleteArgs),
    CachePackageComplete(CachePackageCompleteArgs),
    CacheComplete(CacheCompleteArgs),
    ExecuteBegin(ExecuteBeginArgs),
    TransactionOpenBegin(TransactionOpenBeginArgs),
    TransactionOpenComplete(TransactionOpenCompleteArgs),
    ExecutePackageBegin(ExecutePackageBeginArgs),
    ExecuteProgress(ExecuteProgressArgs),
    ExecutePackageComplete(ExecutePackageCompleteArgs),
    TransactionCommitBegin(TransactionCommitBeginArgs),
    TransactionCommitComplete(TransactionCommitCompleteArgs),
    TransactionRollbackBegin(TransactionRollbackBeginArgs),
    TransactionRollbackComplete(TransactionRollbackCompleteArgs),
    ExecuteComplete(ExecuteCompleteArgs),
    UnregisterBegin(UnregisterBeginArgs),
    UnregisterComplete(UnregisterCompleteArgs),
    ApplyComplete(ApplyCompleteArgs),
    Error(ErrorArgs),
    Progress(ProgressArgs),
}

impl MessageArgs {
    /// Message these arguments belong to.
    #[must_use]
    pub const fn message(&self) -> Message {
        match self {
            Self::Startup(_) => Message::Startup,
            Self::Shutdown(_) => Message::Shutdown,
            Self::DetectBegin(_) => Message::DetectBegin,
            Self::DetectRelatedBundle(_) => Message::DetectRelatedBundle,
            Self::DetectPackageBegin(_) => Message::DetectPackageBegin,
            Self::DetectPackageComplete(_) => Message::DetectPackageComplete,
            Self::DetectComplete(_) => Message::DetectComplete,
            Self::PlanBegin(_) => Message::PlanBegin,
            Self::PlanPackageBegin(_) => Message::PlanPackageBegin,
            Self::PlanPackageComplete(_) => Message::PlanPackageComplete,
            Self::PlanRollbackBoundary(_) => Message::PlanRollbackBoundary,
            Self::PlanComplete(_) => Message::PlanComplete,
            Self::ApplyBegin(_) => Message::ApplyBegin,
            Self::RegisterBegin(_) => Message::RegisterBegin,
            Self::RestorePointBegin(_) => Message::RestorePointBegin,
            Self::RestorePointComplete(_) => Message::RestorePointComplete,
            Self::RegisterComplete(_) => Message::RegisterComplete,
            Self::CacheBegin(_) => Message::CacheBegin,
            Self::CachePackageBegin(_) => Message::CachePackageBegin,
            Self::CacheAcquireResolving(_) => Message::CacheAcquireResolving,
            Self::CacheAcquireBegin(_) => Message::CacheAcquireBegin,
            Self::CacheAcquireProgress(_) => Message::CacheAcquireProgress,
            Self::CacheAcquireComplete(_) => Message::CacheAcquireComplete,
            Self::CacheVerifyBegin(_) => Message::CacheVerifyBegin,
            Self::CacheVerifyProgress(_) => Message::CacheVerifyProgress,
            Self::CacheVerifyComplete(_) => Message::CacheVerifyComplete,
            Self::CachePackageComplete(_) => Message::CachePackageComplete,
            Self::CacheComplete(_) => Message::CacheComplete,
            Self::ExecuteBegin(_) => Message::ExecuteBegin,
            Self::TransactionOpenBegin(_) => Message::TransactionOpenBegin,
            Self::TransactionOpenComplete(_) => Message::TransactionOpenComplete,
            Self::ExecutePackageBegin(_) => Message::ExecutePackageBegin,
            Self::ExecuteProgress(_) => Message::ExecuteProgress,
            Self::ExecutePackageComplete(_) => Message::ExecutePackageComplete,
            Self::TransactionCommitBegin(_) => Message::TransactionCommitBegin,
            Self::TransactionCommitComplete(_) => Message::TransactionCommitComplete,
            Self::TransactionRollbackBegin(_) => Message::TransactionRollbackBegin,
            Self::TransactionRollbackComplete(_) => Message::TransactionRollbackComplete,
            Self::ExecuteComplete(_) => Message::ExecuteComplete,
            Self::UnregisterBegin(_) => Message::UnregisterBegin,
            Self::UnregisterComplete(_) => Message::UnregisterComplete,
            Self::ApplyComplete(_) => Message::ApplyComplete,
            Self::Error(_) => Message::Error,
            Self::Progress(_) => Message::Progress,
        }
    }

    /// Clear argument fields newer than the negotiated version.
    pub fn clamp_to(&mut self, version: ApiVersion) {
        if version.supports(ApiVersion::V1_1) {
            return;
        }
        if let Self::DetectPackageComplete(args) = self {
            args.cached = None;
        }
    }
}

/// Result record of a dispatch, tagged by message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageResults {
    Startup(AckResults),
    Shutdown(AckResults),
    DetectBegin(CancelResults),
    DetectRelatedBundle(CancelResults),
    DetectPackageBegin(CancelResults),
    DetectPackageComplete(AckResults),
    DetectComplete(AckResults),
    PlanBegin(CancelResults),
    PlanPackageBegin(PlanPackageBeginResults),
    PlanPackageComplete(AckResults),
    PlanRollbackBoundary(PlanRollbackBoundaryResults),
    PlanComplete(AckResults),
    ApplyBegin(CancelResults),
    RegisterBegin(CancelResults),
    RestorePointBegin(AckResults),
    RestorePointComplete(AckResults),
    RegisterComplete(AckResults),
    CacheBegin(CancelResults),
    CachePackageBegin(CancelResults),
    CacheAcquireResolving(CacheAcquireResolvingResults),
    CacheAcquireBegin(CancelResults),
    CacheAcquireProgress(CancelResults),
    CacheAcquireComplete(AckResults),
    CacheVerifyBegin(CancelResults),
    CacheVerifyProgress(CancelResults),
    CacheVerifyComplete(AckResults),
    CachePackageComplete(AckResults),
    CacheComplete(AckResults),
    ExecuteBegin(CancelResults),
    TransactionOpenBegin(CancelResults),
    TransactionOpenComplete(AckResults),
    ExecutePackageBegin(CancelResults),
    ExecuteProgress(CancelResults),
    ExecutePackageComplete(AckResults),
    TransactionCommitBegin(CancelResults),
    TransactionCommitComplete(AckResults),
    TransactionRollbackBegin(AckResults),
    TransactionRollbackComplete(AckResults),
    ExecuteComplete(AckResults),
    UnregisterBegin(AckResults),
    UnregisterComplete(AckResults),
    ApplyComplete(AckResults),
    Error(ErrorResults),
    Progress(CancelResults),
}

impl MessageResults {
    /// Fresh result record for a message, every field at its default.
    #[must_use]
    pub fn for_message(message: Message) -> Self {
        match message {
            Message::Startup => Self::Startup(AckResults::default()),
            Message::Shutdown => Self::Shutdown(AckResults::default()),
            Message::DetectBegin => Self::DetectBegin(CancelResults::default()),
            Message::DetectRelatedBundle => Self::DetectRelatedBundle(CancelResults::default()),
            Message::DetectPackageBegin => Self::DetectPackageBegin(CancelResults::default()),
            Message::DetectPackageComplete => Self::DetectPackageComplete(AckResults::default()),
            Message::DetectComplete => Self::DetectComplete(AckResults::default()),
            Message::PlanBegin => Self::PlanBegin(CancelResults::default()),
            Message::PlanPackageBegin => Self::PlanPackageBegin(PlanPackageBeginResults::default()),
            Message::PlanPackageComplete => Self::PlanPackageComplete(AckResults::default()),
            Message::PlanRollbackBoundary => {
                Self::PlanRollbackBoundary(PlanRollbackBoundaryResults::default())
            }
            Message::PlanComplete => Self::PlanComplete(AckResults::default()),
            Message::ApplyBegin => Self::ApplyBegin(CancelResults::default()),
            Message::RegisterBegin => Self::RegisterBegin(CancelResults::default()),
            Message::RestorePointBegin => Self::RestorePointBegin(AckResults::default()),
            Message::RestorePointComplete => Self::RestorePointComplete(AckResults::default()),
            Message::RegisterComplete => Self::RegisterComplete(AckResults::default()),
            Message::CacheBegin => Self::CacheBegin(CancelResults::default()),
            Message::CachePackageBegin => Self::CachePackageBegin(CancelResults::default()),
            Message::CacheAcquireResolving => {
                Self::CacheAcquireResolving(CacheAcquireResolvingResults::default())
            }
            Message::CacheAcquireBegin => Self::CacheAcquireBegin(CancelResults::default()),
            Message::CacheAcquireProgress => Self::CacheAcquireProgress(CancelResults::default()),
            Message::CacheAcquireComplete => Self::CacheAcquireComplete(AckResults::default()),
            Message::CacheVerifyBegin => Self::CacheVerifyBegin(CancelResults::default()),
            Message::CacheVerifyProgress => Self::CacheVerifyProgress(CancelResults::default()),
            Message::CacheVerifyComplete => Self::CacheVerifyComplete(AckResults::default()),
            Message::CachePackageComplete => Self::CachePackageComplete(AckResults::default()),
            Message::CacheComplete => Self::CacheComplete(AckResults::default()),
            Message::ExecuteBegin => Self::ExecuteBegin(CancelResults::default()),
            Message::TransactionOpenBegin => Self::TransactionOpenBegin(CancelResults::default()),
            Message::TransactionOpenComplete => Self::TransactionOpenComplete(AckResults::default()),
            Message::ExecutePackageBegin => Self::ExecutePackageBegin(CancelResults::default()),
            Message::ExecuteProgress => Self::ExecuteProgress(CancelResults::default()),
            Message::ExecutePackageComplete => Self::ExecutePackageComplete(AckResults::default()),
            Message::TransactionCommitBegin => Self::TransactionCommitBegin(CancelResults::default()),
            Message::TransactionCommitComplete => {
                Self::TransactionCommitComplete(AckResults::default())
            }
            Message::TransactionRollbackBegin => {
                Self::TransactionRollbackBegin(AckResults::default())
            }
            Message::TransactionRollbackComplete => {
                Self::TransactionRollbackComplete(AckResults::default())
            }
            Message::ExecuteComplete => Self::ExecuteComplete(AckResults::default()),
            Message::UnregisterBegin => Self::UnregisterBegin(AckResults::default()),
            Message::UnregisterComplete => Self::UnregisterComplete(AckResults::default()),
            Message::ApplyComplete => Self::ApplyComplete(AckResults::default()),
            Message::Error => Self::Error(ErrorResults::default()),
            Message::Progress => Self::Progress(CancelResults::default()),
        }
    }

    /// Message these results belong to.
    #[must_use]
    pub fn message(&self) -> Message {
        match self {
            Self::Startup(_) => Message::Startup,
            Self::Shutdown(_) => Message::Shutdown,
            Self::DetectBegin(_) => Message::DetectBegin,
            Self::DetectRelatedBundle(_) => Message::DetectRelatedBundle,
            Self::DetectPackageBegin(_) => Message::DetectPackageBegin,
            Self::DetectPackageComplete(_) => Message::DetectPackageComplete,
            Self::DetectComplete(_) => Message::DetectComplete,
            Self::PlanBegin(_) => Message::PlanBegin,
            Self::PlanPackageBegin(_) => Message::PlanPackageBegin,
            Self::PlanPackageComplete(_) => Message::PlanPackageComplete,
            Self::PlanRollbackBoundary(_) => Message::PlanRollbackBoundary,
            Self::PlanComplete(_) => Message::PlanComplete,
            Self::ApplyBegin(_) => Message::ApplyBegin,
            Self::RegisterBegin(_) => Message::RegisterBegin,
            Self::RestorePointBegin(_) => Message::RestorePointBegin,
            Self::RestorePointComplete(_) => Message::RestorePointComplete,
            Self::RegisterComplete(_) => Message::RegisterComplete,
            Self::CacheBegin(_) => Message::CacheBegin,
            Self::CachePackageBegin(_) => Message::CachePackageBegin,
            Self::CacheAcquireResolving(_) => Message::CacheAcquireResolving,
            Self::CacheAcquireBegin(_) => Message::CacheAcquireBegin,
            Self::CacheAcquireProgress(_) => Message::CacheAcquireProgress,
            Self::CacheAcquireComplete(_) => Message::CacheAcquireComplete,
            Self::CacheVerifyBegin(_) => Message::CacheVerifyBegin,
            Self::CacheVerifyProgress(_) => Message::CacheVerifyProgress,
            Self::CacheVerifyComplete(_) => Message::CacheVerifyComplete,
            Self::CachePackageComplete(_) => Message::CachePackageComplete,
            Self::CacheComplete(_) => Message::CacheComplete,
            Self::ExecuteBegin(_) => Message::ExecuteBegin,
            Self::TransactionOpenBegin(_) => Message::TransactionOpenBegin,
            Self::TransactionOpenComplete(_) => Message::TransactionOpenComplete,
            Self::ExecutePackageBegin(_) => Message::ExecutePackageBegin,
            Self::ExecuteProgress(_) => Message::ExecuteProgress,
            Self::ExecutePackageComplete(_) => Message::ExecutePackageComplete,
            Self::TransactionCommitBegin(_) => Message::TransactionCommitBegin,
            Self::TransactionCommitComplete(_) => Message::TransactionCommitComplete,
            Self::TransactionRollbackBegin(_) => Message::TransactionRollbackBegin,
            Self::TransactionRollbackComplete(_) => Message::TransactionRollbackComplete,
            Self::ExecuteComplete(_) => Message::ExecuteComplete,
            Self::UnregisterBegin(_) => Message::UnregisterBegin,
            Self::UnregisterComplete(_) => Message::UnregisterComplete,
            Self::ApplyComplete(_) => Message::ApplyComplete,
            Self::Error(_) => Message::Error,
            Self::Progress(_) => Message::Progress,
        }
    }

    /// Whether the extension asked to cancel through these results.
    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        match self {
            Self::DetectBegin(r)
            | Self::DetectRelatedBundle(r)
            | Self::DetectPackageBegin(r)
            | Self::PlanBegin(r)
            | Self::ApplyBegin(r)
            | Self::RegisterBegin(r)
            | Self::CacheBegin(r)
            | Self::CachePackageBegin(r)
            | Self::CacheAcquireBegin(r)
            | Self::CacheAcquireProgress(r)
            | Self::CacheVerifyBegin(r)
            | Self::CacheVerifyProgress(r)
            | Self::ExecuteBegin(r)
            | Self::TransactionOpenBegin(r)
            | Self::ExecutePackageBegin(r)
            | Self::ExecuteProgress(r)
            | Self::TransactionCommitBegin(r)
            | Self::Progress(r) => r.cancel,
            Self::PlanPackageBegin(r) => r.cancel,
            Self::PlanRollbackBoundary(r) => r.cancel,
            Self::CacheAcquireResolving(r) => r.cancel,
            _ => false,
        }
    }

    /// Treat a failed dispatch of a cancelable message as its strictest
    /// response: cancel where the record can cancel, abort for
    /// [`Message::Error`].
    pub fn veto(&mut self) {
        match self {
            Self::DetectBegin(r)
            | Self::DetectRelatedBundle(r)
            | Self::DetectPackageBegin(r)
            | Self::PlanBegin(r)
            | Self::ApplyBegin(r)
            | Self::RegisterBegin(r)
            | Self::CacheBegin(r)
            | Self::CachePackageBegin(r)
            | Self::CacheAcquireBegin(r)
            | Self::CacheAcquireProgress(r)
            | Self::CacheVerifyBegin(r)
            | Self::CacheVerifyProgress(r)
            | Self::ExecuteBegin(r)
            | Self::TransactionOpenBegin(r)
            | Self::ExecutePackageBegin(r)
            | Self::ExecuteProgress(r)
            | Self::TransactionCommitBegin(r)
            | Self::Progress(r) => r.cancel = true,
            Self::PlanPackageBegin(r) => r.cancel = true,
            Self::PlanRollbackBoundary(r) => r.cancel = true,
            Self::CacheAcquireResolving(r) => r.cancel = true,
            Self::Error(r) => r.action = Some(ErrorAction::Abort),
            _ => {}
        }
    }

    /// Clear result fields newer than the negotiated version.
    pub fn clamp_to(&mut self, version: ApiVersion) {
        if version.supports(ApiVersion::V1_1) {
            return;
        }
        if let Self::PlanPackageBegin(results) = self {
            results.cache_keep = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_results_never_cancel() {
        for message in Message::ALL {
            let results = MessageResults::for_message(message);
            assert!(!results.cancel_requested(), "{message} defaulted to cancel");
            assert_eq!(results.message(), message);
        }
    }

    #[test]
    fn veto_cancels_every_cancelable_message() {
        for message in Message::ALL.into_iter().filter(|m| m.cancelable()) {
            let mut results = MessageResults::for_message(message);
            results.veto();
            let vetoed = results.cancel_requested()
                || matches!(
                    results,
                    MessageResults::Error(ErrorResults {
                        action: Some(ErrorAction::Abort)
                    })
                );
            assert!(vetoed, "veto had no effect on {message}");
        }
    }

    #[test]
    fn veto_leaves_informational_messages_alone() {
        for message in Message::ALL.into_iter().filter(|m| !m.cancelable()) {
            let mut results = MessageResults::for_message(message);
            let before = results.clone();
            results.veto();
            assert_eq!(results, before);
        }
    }

    #[test]
    fn clamp_strips_newer_result_fields() {
        let mut results = MessageResults::PlanPackageBegin(PlanPackageBeginResults {
            cancel: false,
            requested: None,
            cache_keep: Some(true),
        });
        results.clamp_to(ApiVersion::V1_1);
        assert!(matches!(
            &results,
            MessageResults::PlanPackageBegin(r) if r.cache_keep == Some(true)
        ));
        results.clamp_to(ApiVersion::V1_0);
        assert!(matches!(
            &results,
            MessageResults::PlanPackageBegin(r) if r.cache_keep.is_none()
        ));
    }

    #[test]
    fn failure_info_captures_error_surface() {
        let err = bndl_errors::CacheError::DigestMismatch {
            package: "app".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        let info = FailureInfo::from_error(&err);
        assert_eq!(info.code.as_deref(), Some("cache.digest_mismatch"));
        assert!(info.retryable);
        assert!(info.hint.is_some());
        assert!(info.message.contains("app"));
    }
}
