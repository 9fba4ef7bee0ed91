//! Plan computation

use std::collections::HashMap;
use std::sync::Arc;

use bndl_detect::DetectionSnapshot;
use bndl_errors::{Error, PlanError, ProtocolError, Result};
use bndl_protocol::records::{
    PlanBeginArgs, PlanCompleteArgs, PlanPackageBeginArgs, PlanPackageCompleteArgs,
    PlanRollbackBoundaryArgs,
};
use bndl_protocol::{Dispatcher, FailureInfo, MessageArgs, MessageResults};
use bndl_types::package::{BoundaryId, Bundle, Package};
use bndl_types::{PackageOperation, PackageState, RequestedAction};

use crate::plan::{CacheEntry, ExecuteEntry, Plan, RollbackEntry, TransactionGroup};

/// Per-package outcome of the decision pass
struct Decision {
    operation: PackageOperation,
    keep: bool,
}

/// Computes plans from detection snapshots
pub struct Planner {
    dispatcher: Arc<Dispatcher>,
    default_keep: bool,
}

impl Planner {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            default_keep: false,
        }
    }

    /// Payload retention when the extension does not override it.
    #[must_use]
    pub fn with_default_keep(mut self, keep: bool) -> Self {
        self.default_keep = keep;
        self
    }

    /// Compute a plan for one requested action.
    ///
    /// # Errors
    ///
    /// Cancellation, structural manifest errors (unknown references,
    /// cycles, interleaved boundaries) and rejected operation
    /// overrides. `PlanComplete` is dispatched either way.
    pub fn plan(
        &self,
        bundle: &Bundle,
        snapshot: &DetectionSnapshot,
        action: RequestedAction,
    ) -> Result<Plan> {
        self.dispatcher
            .dispatch_checked(MessageArgs::PlanBegin(PlanBeginArgs {
                package_count: bundle.packages.len(),
            }))?;
        tracing::info!(bundle = %bundle.id, %action, "plan started");

        match self.run(bundle, snapshot, action) {
            Ok(plan) => {
                self.dispatcher
                    .announce(MessageArgs::PlanComplete(PlanCompleteArgs { failure: None }));
                tracing::info!(
                    execute = plan.execute.len(),
                    cache = plan.cache.len(),
                    groups = plan.groups.len(),
                    digest = %plan.digest,
                    "plan complete"
                );
                Ok(plan)
            }
            Err(err) => {
                self.dispatcher
                    .announce(MessageArgs::PlanComplete(PlanCompleteArgs {
                        failure: Some(FailureInfo::from_error(&err)),
                    }));
                Err(err)
            }
        }
    }

    fn run(
        &self,
        bundle: &Bundle,
        snapshot: &DetectionSnapshot,
        action: RequestedAction,
    ) -> Result<Plan> {
        validate_references(bundle)?;
        let order = topo_order(bundle)?;
        let decisions = self.decide_packages(bundle, snapshot, action)?;
        let transactional = self.boundary_flags(bundle, &decisions)?;

        let mut ordered: Vec<usize> = order
            .into_iter()
            .filter(|&i| decisions[i].operation != PackageOperation::None)
            .collect();
        // Uninstalls run in reverse install order.
        if action == RequestedAction::Uninstall {
            ordered.reverse();
        }

        let boundary_run = contiguous_boundaries(bundle, &ordered)?;
        let (groups, group_of) = build_groups(bundle, &boundary_run, &transactional);

        let execute: Vec<ExecuteEntry> = ordered
            .iter()
            .map(|&i| {
                let package = &bundle.packages[i];
                ExecuteEntry {
                    package_id: package.id.clone(),
                    operation: decisions[i].operation,
                    boundary: package.boundary.clone(),
                    group: group_of.get(&package.boundary).copied(),
                }
            })
            .collect();

        let mut rollback = Vec::new();
        for group in 0..groups.len() {
            for entry in execute.iter().filter(|e| e.group == Some(group)).rev() {
                rollback.push(RollbackEntry {
                    package_id: entry.package_id.clone(),
                    operation: entry.operation.inverse(),
                    group,
                });
            }
        }

        let mut cache = Vec::new();
        for (i, package) in bundle.packages.iter().enumerate() {
            let decision = &decisions[i];
            if decision.operation == PackageOperation::None {
                continue;
            }
            let rollback_needs_payload = group_of.contains_key(&package.boundary)
                && decision.operation.inverse().needs_payload();
            if decision.operation.needs_payload() || rollback_needs_payload {
                cache.push(CacheEntry {
                    package_id: package.id.clone(),
                    payload: package.payload.clone(),
                    keep: decision.keep,
                });
            }
        }

        Plan::seal(bundle.id.clone(), action, cache, execute, rollback, groups)
    }

    /// Recommend an operation per package and let the extension
    /// override it. Messages go out in manifest order.
    fn decide_packages(
        &self,
        bundle: &Bundle,
        snapshot: &DetectionSnapshot,
        action: RequestedAction,
    ) -> Result<Vec<Decision>> {
        let mut decisions = Vec::with_capacity(bundle.packages.len());
        for package in &bundle.packages {
            let state = snapshot
                .package(&package.id)
                .map_or(PackageState::Unknown, |p| p.state);
            let recommended = recommended_operation(action, state, package);

            let results =
                self.dispatcher
                    .dispatch(MessageArgs::PlanPackageBegin(PlanPackageBeginArgs {
                        package_id: package.id.clone(),
                        state,
                        recommended,
                    }));
            if results.cancel_requested() {
                return Err(Error::Cancelled);
            }
            let MessageResults::PlanPackageBegin(results) = results else {
                return Err(ProtocolError::RecordMismatch {
                    message: "PlanPackageBegin".into(),
                }
                .into());
            };

            let operation = match results.requested {
                Some(requested) => {
                    validate_override(package, state, requested)?;
                    if requested != recommended {
                        tracing::debug!(
                            package = %package.id,
                            %recommended,
                            %requested,
                            "extension overrode planned operation"
                        );
                    }
                    requested
                }
                None => recommended,
            };

            self.dispatcher
                .announce(MessageArgs::PlanPackageComplete(PlanPackageCompleteArgs {
                    package_id: package.id.clone(),
                    operation,
                }));
            decisions.push(Decision {
                operation,
                keep: results.cache_keep.unwrap_or(self.default_keep),
            });
        }
        Ok(decisions)
    }

    /// Resolve each planned boundary's transaction flag, with the
    /// extension able to toggle it.
    fn boundary_flags(
        &self,
        bundle: &Bundle,
        decisions: &[Decision],
    ) -> Result<HashMap<BoundaryId, bool>> {
        let mut flags = HashMap::new();
        for boundary in &bundle.boundaries {
            let planned = bundle
                .packages
                .iter()
                .zip(decisions)
                .any(|(p, d)| p.boundary == boundary.id && d.operation != PackageOperation::None);
            if !planned {
                continue;
            }

            let results = self.dispatcher.dispatch(MessageArgs::PlanRollbackBoundary(
                PlanRollbackBoundaryArgs {
                    boundary_id: boundary.id.clone(),
                    transaction: boundary.transaction,
                },
            ));
            if results.cancel_requested() {
                return Err(Error::Cancelled);
            }
            let MessageResults::PlanRollbackBoundary(results) = results else {
                return Err(ProtocolError::RecordMismatch {
                    message: "PlanRollbackBoundary".into(),
                }
                .into());
            };
            flags.insert(
                boundary.id.clone(),
                results.transaction.unwrap_or(boundary.transaction),
            );
        }
        Ok(flags)
    }
}

/// Operation the matrix recommends before any extension override.
fn recommended_operation(
    action: RequestedAction,
    state: PackageState,
    package: &Package,
) -> PackageOperation {
    match action {
        RequestedAction::Install => match state {
            PackageState::Absent | PackageState::Obsolete => PackageOperation::Install,
            _ => PackageOperation::None,
        },
        RequestedAction::Uninstall => match state {
            PackageState::Present | PackageState::Obsolete | PackageState::Superseded
                if !package.permanent =>
            {
                PackageOperation::Uninstall
            }
            _ => PackageOperation::None,
        },
        RequestedAction::Repair => match state {
            PackageState::Present => PackageOperation::Repair,
            PackageState::Absent | PackageState::Obsolete => PackageOperation::Install,
            _ => PackageOperation::None,
        },
        RequestedAction::Modify => match state {
            PackageState::Absent if package.features.iter().any(|f| f.enabled) => {
                PackageOperation::Install
            }
            _ => PackageOperation::None,
        },
    }
}

fn validate_override(
    package: &Package,
    state: PackageState,
    operation: PackageOperation,
) -> Result<()> {
    let allowed = match operation {
        PackageOperation::None => true,
        PackageOperation::Install => {
            matches!(state, PackageState::Absent | PackageState::Obsolete)
        }
        PackageOperation::Repair => state == PackageState::Present,
        PackageOperation::Patch => {
            matches!(state, PackageState::Present | PackageState::Obsolete)
        }
        PackageOperation::Uninstall => {
            !package.permanent
                && matches!(
                    state,
                    PackageState::Present | PackageState::Obsolete | PackageState::Superseded
                )
        }
    };
    if allowed {
        Ok(())
    } else {
        Err(PlanError::OperationNotAllowed {
            package: package.id.to_string(),
            operation: operation.to_string(),
            state: state.to_string(),
        }
        .into())
    }
}

fn validate_references(bundle: &Bundle) -> Result<()> {
    for package in &bundle.packages {
        for dependency in &package.depends_on {
            if bundle.package(dependency).is_none() {
                return Err(PlanError::UnknownDependency {
                    package: package.id.to_string(),
                    dependency: dependency.to_string(),
                }
                .into());
            }
        }
        if bundle.boundary(&package.boundary).is_none() {
            return Err(PlanError::UnknownBoundary {
                package: package.id.to_string(),
                boundary: package.boundary.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Stable topological order: each step takes the first package in
/// manifest order whose prerequisites are all placed. Deterministic by
/// construction.
fn topo_order(bundle: &Bundle) -> Result<Vec<usize>> {
    let count = bundle.packages.len();
    let mut remaining: Vec<usize> = bundle
        .packages
        .iter()
        .map(|p| p.depends_on.len())
        .collect();
    let mut placed = vec![false; count];
    let mut order = Vec::with_capacity(count);

    for _ in 0..count {
        let Some(next) = (0..count).find(|&i| !placed[i] && remaining[i] == 0) else {
            let stuck = (0..count).find(|&i| !placed[i]).unwrap_or(0);
            return Err(PlanError::DependencyCycle {
                package: bundle.packages[stuck].id.to_string(),
            }
            .into());
        };
        placed[next] = true;
        order.push(next);
        let placed_id = &bundle.packages[next].id;
        for (i, package) in bundle.packages.iter().enumerate() {
            if !placed[i] {
                // Counts duplicates so `remaining` stays in step with
                // the initial `depends_on` length.
                remaining[i] -= package.depends_on.iter().filter(|d| *d == placed_id).count();
            }
        }
    }
    Ok(order)
}

/// Boundaries in order of first appearance, failing when a boundary's
/// entries are not contiguous in the final order.
fn contiguous_boundaries(bundle: &Bundle, ordered: &[usize]) -> Result<Vec<BoundaryId>> {
    let mut run: Vec<BoundaryId> = Vec::new();
    for &i in ordered {
        let boundary = &bundle.packages[i].boundary;
        if run.last() == Some(boundary) {
            continue;
        }
        if run.contains(boundary) {
            return Err(PlanError::BoundaryInterleaved {
                boundary: boundary.to_string(),
            }
            .into());
        }
        run.push(boundary.clone());
    }
    Ok(run)
}

fn build_groups(
    bundle: &Bundle,
    boundary_run: &[BoundaryId],
    transactional: &HashMap<BoundaryId, bool>,
) -> (Vec<TransactionGroup>, HashMap<BoundaryId, usize>) {
    let mut groups = Vec::new();
    let mut group_of = HashMap::new();
    for boundary in boundary_run {
        if transactional.get(boundary).copied().unwrap_or(false) {
            group_of.insert(boundary.clone(), groups.len());
            groups.push(TransactionGroup {
                boundary: boundary.clone(),
                vital: bundle.boundary(boundary).is_none_or(|b| b.vital),
            });
        }
    }
    (groups, group_of)
}
