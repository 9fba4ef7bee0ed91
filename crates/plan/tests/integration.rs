//! Planner behavior: ordering, boundaries, overrides, determinism

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bndl_detect::{DetectedPackage, DetectionSnapshot};
use bndl_errors::{Error, PlanError};
use bndl_plan::Planner;
use bndl_protocol::{ApiVersion, Dispatcher, Extension, Message, MessageArgs, MessageResults};
use bndl_types::package::{Bundle, Package, PackageId, RollbackBoundary};
use bndl_types::version::FileVersion;
use bndl_types::{PackageOperation, PackageState, RequestedAction};

/// Scripted extension: optional per-package operation overrides, a
/// boundary transaction toggle, and a message to cancel on.
#[derive(Default)]
struct PlanScript {
    seen: Mutex<Vec<MessageArgs>>,
    requested: HashMap<String, PackageOperation>,
    cache_keep: Option<bool>,
    boundary_transaction: Option<bool>,
    cancel_on: Option<Message>,
}

impl Extension for PlanScript {
    fn api_version(&self) -> ApiVersion {
        ApiVersion::CURRENT
    }

    fn on_message(
        &self,
        args: &MessageArgs,
        results: &mut MessageResults,
    ) -> bndl_errors::Result<()> {
        self.seen.lock().unwrap().push(args.clone());
        if self.cancel_on == Some(args.message()) {
            results.veto();
            return Ok(());
        }
        match (args, results) {
            (MessageArgs::PlanPackageBegin(args), MessageResults::PlanPackageBegin(results)) => {
                if let Some(op) = self.requested.get(args.package_id.as_str()) {
                    results.requested = Some(*op);
                }
                results.cache_keep = self.cache_keep;
            }
            (
                MessageArgs::PlanRollbackBoundary(_),
                MessageResults::PlanRollbackBoundary(results),
            ) => {
                results.transaction = self.boundary_transaction;
            }
            _ => {}
        }
        Ok(())
    }
}

fn planner_with(script: PlanScript) -> (Planner, Arc<PlanScript>) {
    let script = Arc::new(script);
    let planner = Planner::new(Arc::new(Dispatcher::create(script.clone()).unwrap()));
    (planner, script)
}

/// Two packages in one transactional boundary; `app` depends on
/// `runtime` but is listed first in the manifest.
fn suite_bundle() -> Bundle {
    Bundle::new("com.example.suite", "Example Suite", FileVersion::new(1, 0, 0, 0))
        .with_boundary(RollbackBoundary::new("main").transactional(true))
        .with_package(
            Package::new("app", FileVersion::new(1, 0, 0, 0), "main").with_dependency("runtime"),
        )
        .with_package(Package::new("runtime", FileVersion::new(1, 0, 0, 0), "main"))
}

fn snapshot_with_state(bundle: &Bundle, state: PackageState) -> DetectionSnapshot {
    DetectionSnapshot {
        bundle_id: bundle.id.clone(),
        taken_at: chrono::Utc::now(),
        packages: bundle
            .packages
            .iter()
            .map(|p| DetectedPackage {
                id: p.id.clone(),
                declared_version: p.version,
                state,
                installed_version: (state == PackageState::Present).then_some(p.version),
                cached: None,
                failure: None,
            })
            .collect(),
        related_bundles: Vec::new(),
    }
}

fn execute_ids(plan: &bndl_plan::Plan) -> Vec<&str> {
    plan.execute.iter().map(|e| e.package_id.as_str()).collect()
}

#[test]
fn install_orders_dependencies_before_dependents() {
    let bundle = suite_bundle();
    let snapshot = snapshot_with_state(&bundle, PackageState::Absent);
    let (planner, script) = planner_with(PlanScript::default());

    let plan = planner
        .plan(&bundle, &snapshot, RequestedAction::Install)
        .unwrap();

    assert_eq!(execute_ids(&plan), ["runtime", "app"]);
    assert!(plan.execute.iter().all(|e| e.operation == PackageOperation::Install));
    assert_eq!(plan.cache.len(), 2);
    assert_eq!(plan.groups.len(), 1);
    assert!(plan.groups[0].vital);

    let messages: Vec<Message> = script
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(MessageArgs::message)
        .collect();
    assert_eq!(
        messages,
        vec![
            Message::PlanBegin,
            Message::PlanPackageBegin,
            Message::PlanPackageComplete,
            Message::PlanPackageBegin,
            Message::PlanPackageComplete,
            Message::PlanRollbackBoundary,
            Message::PlanComplete,
        ]
    );
}

#[test]
fn rollback_entries_mirror_the_group_in_reverse() {
    let bundle = suite_bundle();
    let snapshot = snapshot_with_state(&bundle, PackageState::Absent);
    let (planner, _) = planner_with(PlanScript::default());

    let plan = planner
        .plan(&bundle, &snapshot, RequestedAction::Install)
        .unwrap();

    let rollback: Vec<(&str, PackageOperation)> = plan
        .rollback
        .iter()
        .map(|r| (r.package_id.as_str(), r.operation))
        .collect();
    assert_eq!(
        rollback,
        [
            ("app", PackageOperation::Uninstall),
            ("runtime", PackageOperation::Uninstall),
        ]
    );
    assert!(plan.rollback.iter().all(|r| r.group == 0));
}

#[test]
fn uninstall_runs_in_reverse_install_order_and_caches_for_rollback() {
    let bundle = suite_bundle();
    let snapshot = snapshot_with_state(&bundle, PackageState::Present);
    let (planner, _) = planner_with(PlanScript::default());

    let plan = planner
        .plan(&bundle, &snapshot, RequestedAction::Uninstall)
        .unwrap();

    assert_eq!(execute_ids(&plan), ["app", "runtime"]);
    assert!(plan.execute.iter().all(|e| e.operation == PackageOperation::Uninstall));
    // Rolling back an uninstall is an install, which needs the payload.
    assert_eq!(plan.cache.len(), 2);
    let rollback_ops: Vec<PackageOperation> =
        plan.rollback.iter().map(|r| r.operation).collect();
    assert_eq!(
        rollback_ops,
        [PackageOperation::Install, PackageOperation::Install]
    );
}

#[test]
fn planning_is_deterministic_with_fresh_ids() {
    let bundle = suite_bundle();
    let snapshot = snapshot_with_state(&bundle, PackageState::Absent);

    let (planner, _) = planner_with(PlanScript::default());
    let first = planner
        .plan(&bundle, &snapshot, RequestedAction::Install)
        .unwrap();
    let (planner, _) = planner_with(PlanScript::default());
    let second = planner
        .plan(&bundle, &snapshot, RequestedAction::Install)
        .unwrap();

    assert_eq!(first.execute, second.execute);
    assert_eq!(first.cache, second.cache);
    assert_eq!(first.rollback, second.rollback);
    assert_eq!(first.digest, second.digest);
    assert_ne!(first.id, second.id);
}

#[test]
fn dependency_cycle_is_fatal() {
    let bundle = Bundle::new("b", "B", FileVersion::ZERO)
        .with_boundary(RollbackBoundary::new("main"))
        .with_package(
            Package::new("a", FileVersion::ZERO, "main").with_dependency("b"),
        )
        .with_package(
            Package::new("b", FileVersion::ZERO, "main").with_dependency("a"),
        );
    let snapshot = snapshot_with_state(&bundle, PackageState::Absent);
    let (planner, script) = planner_with(PlanScript::default());

    let err = planner
        .plan(&bundle, &snapshot, RequestedAction::Install)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Plan(PlanError::DependencyCycle { .. })
    ));

    let seen = script.seen.lock().unwrap();
    let Some(MessageArgs::PlanComplete(complete)) = seen.last() else {
        panic!("expected PlanComplete last");
    };
    assert_eq!(
        complete.failure.as_ref().unwrap().code.as_deref(),
        Some("plan.dependency_cycle")
    );
}

#[test]
fn interleaved_boundaries_are_fatal() {
    // Dependency order forces a-X, b-Y, c-X: X is split by Y.
    let bundle = Bundle::new("b", "B", FileVersion::ZERO)
        .with_boundary(RollbackBoundary::new("x"))
        .with_boundary(RollbackBoundary::new("y"))
        .with_package(Package::new("a", FileVersion::ZERO, "x"))
        .with_package(Package::new("b", FileVersion::ZERO, "y"))
        .with_package(Package::new("c", FileVersion::ZERO, "x").with_dependency("b"));
    let snapshot = snapshot_with_state(&bundle, PackageState::Absent);
    let (planner, _) = planner_with(PlanScript::default());

    let err = planner
        .plan(&bundle, &snapshot, RequestedAction::Install)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Plan(PlanError::BoundaryInterleaved { .. })
    ));
}

#[test]
fn invalid_override_is_rejected() {
    let bundle = suite_bundle();
    let snapshot = snapshot_with_state(&bundle, PackageState::Absent);
    let (planner, _) = planner_with(PlanScript {
        requested: HashMap::from([("app".to_string(), PackageOperation::Uninstall)]),
        ..Default::default()
    });

    let err = planner
        .plan(&bundle, &snapshot, RequestedAction::Install)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Plan(PlanError::OperationNotAllowed { .. })
    ));
}

#[test]
fn extension_can_drop_a_package_and_detransactionalize() {
    let bundle = suite_bundle();
    let snapshot = snapshot_with_state(&bundle, PackageState::Absent);
    let (planner, _) = planner_with(PlanScript {
        requested: HashMap::from([("app".to_string(), PackageOperation::None)]),
        boundary_transaction: Some(false),
        ..Default::default()
    });

    let plan = planner
        .plan(&bundle, &snapshot, RequestedAction::Install)
        .unwrap();

    assert_eq!(execute_ids(&plan), ["runtime"]);
    assert!(plan.groups.is_empty());
    assert!(plan.rollback.is_empty());
    assert_eq!(plan.execute[0].group, None);
}

#[test]
fn cache_keep_override_marks_entries() {
    let bundle = suite_bundle();
    let snapshot = snapshot_with_state(&bundle, PackageState::Absent);
    let (planner, _) = planner_with(PlanScript {
        cache_keep: Some(true),
        ..Default::default()
    });

    let plan = planner
        .plan(&bundle, &snapshot, RequestedAction::Install)
        .unwrap();
    assert!(plan.cache.iter().all(|c| c.keep));
}

#[test]
fn permanent_packages_are_never_uninstalled() {
    let bundle = Bundle::new("b", "B", FileVersion::ZERO)
        .with_boundary(RollbackBoundary::new("main"))
        .with_package(Package::new("keeper", FileVersion::ZERO, "main").permanent(true));
    let snapshot = snapshot_with_state(&bundle, PackageState::Present);
    let (planner, _) = planner_with(PlanScript::default());

    let plan = planner
        .plan(&bundle, &snapshot, RequestedAction::Uninstall)
        .unwrap();
    assert!(plan.is_noop());
}

#[test]
fn repair_installs_what_is_missing() {
    let bundle = suite_bundle();
    let mut snapshot = snapshot_with_state(&bundle, PackageState::Present);
    // runtime went missing behind our back
    let runtime = snapshot
        .packages
        .iter_mut()
        .find(|p| p.id == PackageId::from("runtime"))
        .unwrap();
    runtime.state = PackageState::Absent;
    runtime.installed_version = None;

    let (planner, _) = planner_with(PlanScript::default());
    let plan = planner
        .plan(&bundle, &snapshot, RequestedAction::Repair)
        .unwrap();

    let ops: HashMap<&str, PackageOperation> = plan
        .execute
        .iter()
        .map(|e| (e.package_id.as_str(), e.operation))
        .collect();
    assert_eq!(ops["runtime"], PackageOperation::Install);
    assert_eq!(ops["app"], PackageOperation::Repair);
}

#[test]
fn cancel_during_package_begin_aborts_planning() {
    let bundle = suite_bundle();
    let snapshot = snapshot_with_state(&bundle, PackageState::Absent);
    let (planner, script) = planner_with(PlanScript {
        cancel_on: Some(Message::PlanPackageBegin),
        ..Default::default()
    });

    let err = planner
        .plan(&bundle, &snapshot, RequestedAction::Install)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    let seen = script.seen.lock().unwrap();
    assert_eq!(
        seen.last().map(MessageArgs::message),
        Some(Message::PlanComplete)
    );
}
