//! Wire-freeze and dispatch behavior tests
//!
//! The numbering table below is the compatibility contract with every
//! shipped extension. A failure here means an id or cancel polarity
//! moved; fix the code, never the table.

use std::sync::{Arc, Mutex};

use bndl_protocol::records::{
    DetectPackageCompleteArgs, PlanPackageBeginArgs, ShutdownArgs, StartupArgs,
};
use bndl_protocol::{ApiVersion, Dispatcher, Extension, Message, MessageArgs, MessageResults};
use bndl_types::package::PackageId;
use bndl_types::version::FileVersion;
use bndl_types::{PackageOperation, PackageState};

const FROZEN_MESSAGES: [(Message, u32, bool); 44] = [
    (Message::Startup, 0, false),
    (Message::Shutdown, 1, false),
    (Message::DetectBegin, 2, true),
    (Message::DetectRelatedBundle, 3, true),
    (Message::DetectPackageBegin, 4, true),
    (Message::DetectPackageComplete, 5, false),
    (Message::DetectComplete, 6, false),
    (Message::PlanBegin, 7, true),
    (Message::PlanPackageBegin, 8, true),
    (Message::PlanPackageComplete, 9, false),
    (Message::PlanRollbackBoundary, 10, true),
    (Message::PlanComplete, 11, false),
    (Message::ApplyBegin, 12, true),
    (Message::RegisterBegin, 13, true),
    (Message::RestorePointBegin, 14, false),
    (Message::RestorePointComplete, 15, false),
    (Message::RegisterComplete, 16, false),
    (Message::CacheBegin, 17, true),
    (Message::CachePackageBegin, 18, true),
    (Message::CacheAcquireResolving, 19, true),
    (Message::CacheAcquireBegin, 20, true),
    (Message::CacheAcquireProgress, 21, true),
    (Message::CacheAcquireComplete, 22, false),
    (Message::CacheVerifyBegin, 23, true),
    (Message::CacheVerifyProgress, 24, true),
    (Message::CacheVerifyComplete, 25, false),
    (Message::CachePackageComplete, 26, false),
    (Message::CacheComplete, 27, false),
    (Message::ExecuteBegin, 28, true),
    (Message::TransactionOpenBegin, 29, true),
    (Message::TransactionOpenComplete, 30, false),
    (Message::ExecutePackageBegin, 31, true),
    (Message::ExecuteProgress, 32, true),
    (Message::ExecutePackageComplete, 33, false),
    (Message::TransactionCommitBegin, 34, true),
    (Message::TransactionCommitComplete, 35, false),
    (Message::TransactionRollbackBegin, 36, false),
    (Message::TransactionRollbackComplete, 37, false),
    (Message::ExecuteComplete, 38, false),
    (Message::UnregisterBegin, 39, false),
    (Message::UnregisterComplete, 40, false),
    (Message::ApplyComplete, 41, false),
    (Message::Error, 42, true),
    (Message::Progress, 43, true),
];

#[test]
fn message_table_is_frozen() {
    assert_eq!(Message::ALL.len(), FROZEN_MESSAGES.len());
    for (message, id, cancelable) in FROZEN_MESSAGES {
        assert_eq!(message.id(), id, "{message} moved off its frozen id");
        assert_eq!(
            message.cancelable(),
            cancelable,
            "{message} changed cancel polarity"
        );
        assert_eq!(Message::from_id(id), Some(message));
    }
    for message in Message::ALL {
        assert!(message.id() < Message::EXTENSION_BASE);
    }
}

#[test]
fn record_wire_shape_is_stable() {
    let args = DetectPackageCompleteArgs {
        package_id: PackageId::from("app.core"),
        state: PackageState::Obsolete,
        installed_version: Some(FileVersion::new(1, 2, 0, 0)),
        failure: None,
        cached: Some(false),
    };
    let json = serde_json::to_value(&args).unwrap();
    assert_eq!(json["package_id"], "app.core");
    assert_eq!(json["state"], "obsolete");
    assert_eq!(json["installed_version"], "1.2.0.0");
    assert_eq!(json["cached"], false);
}

/// Extension built against protocol 1.0, before `cached` and
/// `cache_keep` existed.
struct LegacyExtension {
    saw_cached: Mutex<Option<Option<bool>>>,
}

impl Extension for LegacyExtension {
    fn api_version(&self) -> ApiVersion {
        ApiVersion::V1_0
    }

    fn on_message(&self, args: &MessageArgs, results: &mut MessageResults) -> bndl_errors::Result<()> {
        match (args, results) {
            (MessageArgs::DetectPackageComplete(args), _) => {
                *self.saw_cached.lock().unwrap() = Some(args.cached);
            }
            (MessageArgs::PlanPackageBegin(_), MessageResults::PlanPackageBegin(results)) => {
                results.requested = Some(PackageOperation::Repair);
                // A 1.0 extension cannot write this, but a buggy one
                // might; the dispatcher must strip it either way.
                results.cache_keep = Some(true);
            }
            _ => {}
        }
        Ok(())
    }
}

#[test]
fn negotiated_version_gates_fields_both_ways() {
    let extension = Arc::new(LegacyExtension {
        saw_cached: Mutex::new(None),
    });
    let dispatcher = Dispatcher::create(extension.clone()).unwrap();
    assert_eq!(dispatcher.version(), ApiVersion::V1_0);

    dispatcher.announce(MessageArgs::DetectPackageComplete(
        DetectPackageCompleteArgs {
            package_id: PackageId::from("app.core"),
            state: PackageState::Present,
            installed_version: None,
            failure: None,
            cached: Some(true),
        },
    ));
    assert_eq!(*extension.saw_cached.lock().unwrap(), Some(None));

    let results = dispatcher.dispatch(MessageArgs::PlanPackageBegin(PlanPackageBeginArgs {
        package_id: PackageId::from("app.core"),
        state: PackageState::Present,
        recommended: PackageOperation::None,
    }));
    let MessageResults::PlanPackageBegin(results) = results else {
        panic!("wrong results record");
    };
    assert_eq!(results.requested, Some(PackageOperation::Repair));
    assert_eq!(results.cache_keep, None);
}

struct VetoOnCacheBegin;

impl Extension for VetoOnCacheBegin {
    fn api_version(&self) -> ApiVersion {
        ApiVersion::CURRENT
    }

    fn on_message(&self, args: &MessageArgs, _results: &mut MessageResults) -> bndl_errors::Result<()> {
        match args {
            MessageArgs::CacheBegin(_) => Err(bndl_errors::Error::internal("not today")),
            MessageArgs::Shutdown(_) => Err(bndl_errors::Error::internal("too late to matter")),
            _ => Ok(()),
        }
    }
}

#[test]
fn extension_errors_split_by_cancelability() {
    let dispatcher = Dispatcher::create(Arc::new(VetoOnCacheBegin)).unwrap();

    let results = dispatcher.dispatch(MessageArgs::CacheBegin(
        bndl_protocol::records::CacheBeginArgs { package_count: 1 },
    ));
    assert!(results.cancel_requested(), "cancelable error must veto");

    let results = dispatcher.dispatch(MessageArgs::Shutdown(ShutdownArgs {}));
    assert!(!results.cancel_requested(), "informational error must be ignored");
    assert_eq!(results, MessageResults::for_message(Message::Shutdown));

    let checked = dispatcher.dispatch_checked(MessageArgs::Startup(StartupArgs { resume: false }));
    assert!(checked.is_ok());
}

struct FutureExtension;

impl Extension for FutureExtension {
    fn api_version(&self) -> ApiVersion {
        ApiVersion::new(2, 0)
    }

    fn on_message(&self, _: &MessageArgs, _: &mut MessageResults) -> bndl_errors::Result<()> {
        Ok(())
    }
}

#[test]
fn major_version_mismatch_refuses_extension() {
    let err = Dispatcher::create(Arc::new(FutureExtension)).unwrap_err();
    assert!(err.to_string().contains("requires protocol 2.0"));
}
