//! The apply pass: register, cache, execute, commit or roll back,
//! unregister.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bndl_errors::{ApplyError, CacheError, Error, Result};
use bndl_fileops::RetryPolicy;
use bndl_plan::{CacheEntry, ExecuteEntry, Plan};
use bndl_protocol::records::{
    ApplyBeginArgs, ApplyCompleteArgs, CacheAcquireBeginArgs, CacheAcquireCompleteArgs,
    CacheAcquireProgressArgs, CacheAcquireResolvingArgs, CacheBeginArgs, CacheCompleteArgs,
    CachePackageBeginArgs, CachePackageCompleteArgs, CacheVerifyBeginArgs,
    CacheVerifyCompleteArgs, CacheVerifyProgressArgs, ErrorAction, ErrorArgs, ExecuteBeginArgs,
    ExecuteCompleteArgs, ExecutePackageBeginArgs, ExecutePackageCompleteArgs, ProgressArgs,
    RegisterBeginArgs, RegisterCompleteArgs, RestorePointBeginArgs, RestorePointCompleteArgs,
    TransactionCommitBeginArgs, TransactionCommitCompleteArgs, TransactionOpenBeginArgs,
    TransactionOpenCompleteArgs, TransactionRollbackBeginArgs, TransactionRollbackCompleteArgs,
    UnregisterBeginArgs, UnregisterCompleteArgs,
};
use bndl_protocol::{Dispatcher, FailureInfo, MessageArgs, MessageResults};
use bndl_types::{ApplyStatus, BoundaryId, Bundle, Package, PackageId, PackageOperation, Payload, PayloadSource};

use crate::acquire::Acquirer;
use crate::executor::{ExecutionProgress, NullVerifier, PackageExecutor, PayloadVerifier};
use crate::registration::{Registration, RegistrationStore, SystemServices};
use crate::store::CacheStore;
use crate::summary::{ApplySummary, EntryOutcome, EntryStatus};

/// Drives one apply pass over a sealed plan.
pub struct ApplyEngine {
    dispatcher: Arc<Dispatcher>,
    store: CacheStore,
    acquirer: Acquirer,
    registration: RegistrationStore,
    executor: Arc<dyn PackageExecutor>,
    verifier: Arc<dyn PayloadVerifier>,
    services: Option<Arc<dyn SystemServices>>,
    retry: RetryPolicy,
}

impl ApplyEngine {
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        store: CacheStore,
        acquirer: Acquirer,
        registration: RegistrationStore,
        executor: Arc<dyn PackageExecutor>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            acquirer,
            registration,
            executor,
            verifier: Arc::new(NullVerifier),
            services: None,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn PayloadVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    #[must_use]
    pub fn with_system_services(mut self, services: Arc<dyn SystemServices>) -> Self {
        self.services = Some(services);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Applies `plan` to the machine described by `bundle`.
    ///
    /// Once the session is registered, failures no longer surface as
    /// `Err`: they fold into the summary status, and a failed pass
    /// parks its registration resumable. `Err` is reserved for refusals
    /// before anything was touched: an invalid plan, a veto on
    /// `ApplyBegin` or `RegisterBegin`, or a failure writing the
    /// registration itself.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` on a pre-registration veto, an apply
    /// error when the plan does not match the bundle, or the I/O error
    /// that prevented registration.
    pub async fn apply(&self, bundle: &Bundle, plan: &Plan) -> Result<ApplySummary> {
        match self.run(bundle, plan).await {
            Ok(summary) => {
                self.dispatcher
                    .announce(MessageArgs::ApplyComplete(ApplyCompleteArgs {
                        status: summary.status,
                        failure: summary.failure.clone(),
                    }));
                tracing::info!(status = ?summary.status, "apply pass finished");
                Ok(summary)
            }
            Err(err) => {
                self.dispatcher
                    .announce(MessageArgs::ApplyComplete(ApplyCompleteArgs {
                        status: ApplyStatus::Failed,
                        failure: Some(FailureInfo::from_error(&err)),
                    }));
                Err(err)
            }
        }
    }

    async fn run(&self, bundle: &Bundle, plan: &Plan) -> Result<ApplySummary> {
        validate_plan(bundle, plan)?;

        self.dispatcher
            .dispatch_checked(MessageArgs::ApplyBegin(ApplyBeginArgs {
                execute_count: plan.execute.len(),
                cache_count: plan.cache.len(),
            }))?;

        let registration = Registration::new(&bundle.id, plan.action, &plan.digest);
        self.dispatcher
            .dispatch_checked(MessageArgs::RegisterBegin(RegisterBeginArgs {
                session_id: registration.session_id,
            }))?;
        if let Err(err) = self.registration.save(&registration).await {
            self.dispatcher
                .announce(MessageArgs::RegisterComplete(RegisterCompleteArgs {
                    failure: Some(FailureInfo::from_error(&err)),
                }));
            return Err(err);
        }
        tracing::info!(
            session_id = %registration.session_id,
            bundle_id = %bundle.id,
            digest = %plan.digest,
            "apply session registered"
        );

        self.restore_point(bundle).await;
        self.dispatcher
            .announce(MessageArgs::RegisterComplete(RegisterCompleteArgs {
                failure: None,
            }));

        let mut run = ApplyRun::default();
        self.cache_stage(bundle, plan, &mut run).await;
        self.execute_stage(bundle, plan, &mut run).await;
        self.finish(plan, &registration, run).await
    }

    async fn restore_point(&self, bundle: &Bundle) {
        let Some(services) = &self.services else {
            return;
        };
        self.dispatcher
            .announce(MessageArgs::RestorePointBegin(RestorePointBeginArgs {}));
        let failure = match services.create_restore_point(&bundle.name).await {
            Ok(()) => {
                tracing::debug!("restore point created");
                None
            }
            Err(err) => {
                tracing::warn!(%err, "restore point creation failed, continuing without one");
                Some(FailureInfo::from_error(&err))
            }
        };
        self.dispatcher
            .announce(MessageArgs::RestorePointComplete(RestorePointCompleteArgs {
                failure,
            }));
    }

    async fn cache_stage(&self, bundle: &Bundle, plan: &Plan, run: &mut ApplyRun) {
        if plan.cache.is_empty() {
            return;
        }

        let results = self
            .dispatcher
            .dispatch(MessageArgs::CacheBegin(CacheBeginArgs {
                package_count: plan.cache.len(),
            }));
        if results.cancel_requested() {
            run.fatal = Some(cancelled());
        } else {
            let mut settled = 0usize;
            for entry in &plan.cache {
                let Some(package) = bundle.package(&entry.package_id) else {
                    continue;
                };
                if let Some(dependency) = package
                    .depends_on
                    .iter()
                    .find(|d| run.cache_failures.contains_key(*d))
                {
                    let blocked = CacheError::Blocked {
                        package: entry.package_id.to_string(),
                        dependency: dependency.to_string(),
                    };
                    tracing::warn!(
                        package_id = %entry.package_id,
                        %dependency,
                        "payload skipped, dependency failed earlier"
                    );
                    run.cache_failures.insert(
                        entry.package_id.clone(),
                        (EntryStatus::Blocked, FailureInfo::from_error(&blocked)),
                    );
                } else {
                    match self.cache_package(package, entry).await {
                        CacheOutcome::Cached(path) => {
                            run.payloads.insert(entry.package_id.clone(), path);
                        }
                        CacheOutcome::Failed(failure) => {
                            run.cache_failures
                                .insert(entry.package_id.clone(), (EntryStatus::Failed, failure));
                        }
                        CacheOutcome::Cancelled => {
                            run.fatal = Some(cancelled());
                            break;
                        }
                    }
                }
                settled += 1;
                if !self.progress_step(settled, plan.cache.len(), settled, plan_steps(plan)) {
                    run.fatal = Some(cancelled());
                    break;
                }
            }
        }
        self.dispatcher
            .announce(MessageArgs::CacheComplete(CacheCompleteArgs {
                failure: run.fatal.clone(),
            }));
    }

    async fn cache_package(&self, package: &Package, entry: &CacheEntry) -> CacheOutcome {
        let package_id = &entry.package_id;
        let payload = &entry.payload;

        let results = self
            .dispatcher
            .dispatch(MessageArgs::CachePackageBegin(CachePackageBeginArgs {
                package_id: package_id.clone(),
                payload_name: payload.name.clone(),
                total_bytes: payload.size,
            }));
        if results.cancel_requested() {
            self.close_cache_package(package_id, Some(cancelled()));
            return CacheOutcome::Cancelled;
        }

        // A payload with a declared digest may already be in the store.
        if let Some(digest) = &payload.digest {
            if let Some(path) = self.store.object(digest).await {
                tracing::debug!(%package_id, %digest, "payload already cached");
                self.close_cache_package(package_id, None);
                return CacheOutcome::Cached(path);
            }
        }

        if payload.sources.is_empty() {
            let err = CacheError::NoSources {
                package: package_id.to_string(),
            };
            let failure = FailureInfo::from_error(&err);
            self.close_cache_package(package_id, Some(failure.clone()));
            return CacheOutcome::Failed(failure);
        }

        let source = match self.resolve_source(package_id, payload) {
            Ok(source) => source,
            Err(Error::Cancelled) => {
                self.close_cache_package(package_id, Some(cancelled()));
                return CacheOutcome::Cancelled;
            }
            Err(err) => {
                let failure = FailureInfo::from_error(&err);
                self.close_cache_package(package_id, Some(failure.clone()));
                return CacheOutcome::Failed(failure);
            }
        };

        let staging = self.store.staging_dir();
        let mut attempt: u32 = 0;
        loop {
            match self.acquire_attempt(package, payload, source, attempt, &staging).await {
                Ok(path) => {
                    self.close_cache_package(package_id, None);
                    return CacheOutcome::Cached(path);
                }
                Err(Error::Cancelled) => {
                    self.close_cache_package(package_id, Some(cancelled()));
                    return CacheOutcome::Cancelled;
                }
                Err(err) => {
                    let failure = FailureInfo::from_error(&err);
                    attempt += 1;
                    if failure.retryable && attempt < self.retry.max_runs() {
                        tracing::debug!(%package_id, attempt, %err, "payload attempt failed, retrying");
                        tokio::time::sleep(self.retry.wait).await;
                        continue;
                    }
                    tracing::warn!(%package_id, %err, "payload could not be cached");
                    self.close_cache_package(package_id, Some(failure.clone()));
                    return CacheOutcome::Failed(failure);
                }
            }
        }
    }

    fn close_cache_package(&self, package_id: &PackageId, failure: Option<FailureInfo>) {
        self.dispatcher
            .announce(MessageArgs::CachePackageComplete(CachePackageCompleteArgs {
                package_id: package_id.clone(),
                failure,
            }));
    }

    /// Offers the extension the source list and applies its pick when
    /// it is in range.
    fn resolve_source<'a>(
        &self,
        package_id: &PackageId,
        payload: &'a Payload,
    ) -> Result<&'a PayloadSource> {
        let recommended = 0;
        let results = self
            .dispatcher
            .dispatch(MessageArgs::CacheAcquireResolving(CacheAcquireResolvingArgs {
                package_id: package_id.clone(),
                sources: payload.sources.iter().map(ToString::to_string).collect(),
                recommended,
            }));
        if results.cancel_requested() {
            return Err(Error::Cancelled);
        }

        let mut chosen = recommended;
        if let MessageResults::CacheAcquireResolving(resolving) = results {
            if let Some(pick) = resolving.chosen {
                if pick < payload.sources.len() {
                    chosen = pick;
                } else {
                    tracing::warn!(%package_id, pick, "source choice out of range, using recommended");
                }
            }
        }
        payload
            .sources
            .get(chosen)
            .ok_or_else(|| Error::internal("resolved source index out of range"))
    }

    async fn acquire_attempt(
        &self,
        package: &Package,
        payload: &Payload,
        source: &PayloadSource,
        attempt: u32,
        staging: &Path,
    ) -> Result<PathBuf> {
        let package_id = package.id.clone();

        let results = self
            .dispatcher
            .dispatch(MessageArgs::CacheAcquireBegin(CacheAcquireBeginArgs {
                package_id: package_id.clone(),
                source: source.to_string(),
                attempt,
            }));
        if results.cancel_requested() {
            return Err(Error::Cancelled);
        }

        let staged = bndl_fileops::create_temp_file(staging, &payload.name, "part").await?;
        let fetched = self
            .acquirer
            .fetch(source, &staged, |bytes, total| {
                let results = self
                    .dispatcher
                    .dispatch(MessageArgs::CacheAcquireProgress(CacheAcquireProgressArgs {
                        package_id: package_id.clone(),
                        bytes,
                        total,
                    }));
                !results.cancel_requested()
            })
            .await;

        self.dispatcher
            .announce(MessageArgs::CacheAcquireComplete(CacheAcquireCompleteArgs {
                package_id: package_id.clone(),
                failure: fetched.as_ref().err().map(FailureInfo::from_error),
            }));
        if let Err(err) = fetched {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(err);
        }

        let results = self
            .dispatcher
            .dispatch(MessageArgs::CacheVerifyBegin(CacheVerifyBeginArgs {
                package_id: package_id.clone(),
            }));
        if results.cancel_requested() {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(Error::Cancelled);
        }

        match self.verify_staged(package, payload, &staged).await {
            Ok(digest) => {
                let results = self
                    .dispatcher
                    .dispatch(MessageArgs::CacheVerifyProgress(CacheVerifyProgressArgs {
                        package_id: package_id.clone(),
                        percent: 100,
                    }));
                let vetoed = results.cancel_requested();
                self.dispatcher
                    .announce(MessageArgs::CacheVerifyComplete(CacheVerifyCompleteArgs {
                        package_id: package_id.clone(),
                        failure: vetoed.then(cancelled),
                    }));
                if vetoed {
                    let _ = tokio::fs::remove_file(&staged).await;
                    return Err(Error::Cancelled);
                }
                self.store.insert_prehashed(&staged, &digest).await
            }
            Err(err) => {
                self.dispatcher
                    .announce(MessageArgs::CacheVerifyComplete(CacheVerifyCompleteArgs {
                        package_id: package_id.clone(),
                        failure: Some(FailureInfo::from_error(&err)),
                    }));
                let _ = tokio::fs::remove_file(&staged).await;
                Err(err)
            }
        }
    }

    /// Size check, digest check, then the pluggable verifier.
    async fn verify_staged(
        &self,
        package: &Package,
        payload: &Payload,
        staged: &Path,
    ) -> Result<String> {
        if let Some(expected) = payload.size {
            let actual = bndl_fileops::file_size(staged).await?;
            if actual != expected {
                return Err(CacheError::VerifyFailed {
                    package: package.id.to_string(),
                    message: format!("expected {expected} bytes, got {actual}"),
                }
                .into());
            }
        }

        let digest = CacheStore::hash_file(staged).await?;
        if let Some(expected) = &payload.digest {
            if expected != &digest {
                return Err(CacheError::DigestMismatch {
                    package: package.id.to_string(),
                    expected: expected.clone(),
                    actual: digest,
                }
                .into());
            }
        }

        self.verifier
            .verify(package, staged)
            .await
            .map_err(|err| CacheError::VerifyFailed {
                package: package.id.to_string(),
                message: err.to_string(),
            })?;
        Ok(digest)
    }

    async fn execute_stage(&self, bundle: &Bundle, plan: &Plan, run: &mut ApplyRun) {
        if run.fatal.is_some() || plan.execute.is_empty() {
            return;
        }

        let results = self
            .dispatcher
            .dispatch(MessageArgs::ExecuteBegin(ExecuteBeginArgs {
                entry_count: plan.execute.len(),
            }));
        if results.cancel_requested() {
            run.fatal = Some(cancelled());
        } else {
            let mut index = 0;
            while index < plan.execute.len() {
                if run.fatal.is_some() {
                    break;
                }
                let entry = &plan.execute[index];
                if let Some(group) = entry.group {
                    let span = plan.execute[index..]
                        .iter()
                        .take_while(|e| e.group == Some(group))
                        .count();
                    self.run_group(bundle, plan, group, &plan.execute[index..index + span], run)
                        .await;
                    index += span;
                } else {
                    self.run_single(bundle, entry, run).await;
                    index += 1;
                }
                if run.fatal.is_none()
                    && !self.progress_step(
                        index,
                        plan.execute.len(),
                        plan.cache.len() + index,
                        plan_steps(plan),
                    )
                {
                    run.fatal = Some(cancelled());
                }
            }
        }

        self.dispatcher
            .announce(MessageArgs::ExecuteComplete(ExecuteCompleteArgs {
                failure: run.fatal.clone(),
            }));
    }

    async fn run_single(&self, bundle: &Bundle, entry: &ExecuteEntry, run: &mut ApplyRun) {
        let cache_row = run
            .cache_failures
            .get(&entry.package_id)
            .map(|(status, failure)| (*status, failure.clone()));
        if let Some((status, failure)) = cache_row {
            run.push_outcome(entry, status, Some(failure));
            return;
        }
        let Some(package) = bundle.package(&entry.package_id) else {
            return;
        };

        let mut attempt: u32 = 0;
        loop {
            let results = self
                .dispatcher
                .dispatch(MessageArgs::ExecutePackageBegin(ExecutePackageBeginArgs {
                    package_id: entry.package_id.clone(),
                    operation: entry.operation,
                    rollback: false,
                }));
            if results.cancel_requested() {
                run.fatal = Some(cancelled());
                run.push_outcome(entry, EntryStatus::Skipped, None);
                return;
            }

            match self.execute_entry(package, entry.operation, false, &run.payloads).await {
                Ok(()) => {
                    self.close_execute(entry, None);
                    run.push_outcome(entry, EntryStatus::Succeeded, None);
                    return;
                }
                Err(Error::Cancelled) => {
                    let failure = cancelled();
                    self.close_execute(entry, Some(failure.clone()));
                    run.fatal = Some(failure.clone());
                    run.push_outcome(entry, EntryStatus::Failed, Some(failure));
                    return;
                }
                Err(err) => {
                    let failure = FailureInfo::from_error(&err);
                    self.close_execute(entry, Some(failure.clone()));
                    tracing::warn!(package_id = %entry.package_id, %err, "package operation failed");

                    match self.error_action(package, &failure, &mut attempt) {
                        ErrorAction::Retry => {}
                        ErrorAction::Abort => {
                            run.fatal = Some(failure.clone());
                            run.push_outcome(entry, EntryStatus::Failed, Some(failure));
                            return;
                        }
                        ErrorAction::Ignore => {
                            run.push_outcome(entry, EntryStatus::Failed, Some(failure));
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Asks the extension what to do about an execute failure. The
    /// default follows the package's vital flag, and retry requests are
    /// bounded by the engine's retry policy.
    fn error_action(&self, package: &Package, failure: &FailureInfo, attempt: &mut u32) -> ErrorAction {
        let results = self.dispatcher.dispatch(MessageArgs::Error(ErrorArgs {
            package_id: Some(package.id.clone()),
            failure: failure.clone(),
            allowed: vec![ErrorAction::Retry, ErrorAction::Ignore, ErrorAction::Abort],
        }));
        let chosen = match results {
            MessageResults::Error(results) => results.action,
            _ => None,
        };
        let default = if package.vital {
            ErrorAction::Abort
        } else {
            ErrorAction::Ignore
        };
        match chosen.unwrap_or(default) {
            ErrorAction::Retry => {
                if *attempt < self.retry.attempts {
                    *attempt += 1;
                    tracing::debug!(package_id = %package.id, attempt = *attempt, "retry requested");
                    ErrorAction::Retry
                } else {
                    tracing::debug!(package_id = %package.id, "retries exhausted");
                    default
                }
            }
            action => action,
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn run_group(
        &self,
        bundle: &Bundle,
        plan: &Plan,
        group: usize,
        entries: &[ExecuteEntry],
        run: &mut ApplyRun,
    ) {
        let Some(descriptor) = plan.groups.get(group) else {
            return;
        };
        let boundary = descriptor.boundary.clone();

        // A group with an uncached member never opens.
        if let Some(missing) = entries
            .iter()
            .find(|e| run.cache_failures.contains_key(&e.package_id))
        {
            let missing_id = missing.package_id.clone();
            tracing::warn!(boundary = %boundary, package_id = %missing_id, "transaction skipped, payload missing");
            for entry in entries {
                let cache_row = run
                    .cache_failures
                    .get(&entry.package_id)
                    .map(|(status, failure)| (*status, failure.clone()));
                if let Some((status, failure)) = cache_row {
                    run.push_outcome(entry, status, Some(failure));
                } else {
                    let blocked = CacheError::Blocked {
                        package: entry.package_id.to_string(),
                        dependency: missing_id.to_string(),
                    };
                    run.push_outcome(
                        entry,
                        EntryStatus::Skipped,
                        Some(FailureInfo::from_error(&blocked)),
                    );
                }
            }
            return;
        }

        let results = self
            .dispatcher
            .dispatch(MessageArgs::TransactionOpenBegin(TransactionOpenBeginArgs {
                boundary_id: boundary.clone(),
            }));
        if results.cancel_requested() {
            run.fatal = Some(cancelled());
            for entry in entries {
                run.push_outcome(entry, EntryStatus::Skipped, None);
            }
            return;
        }
        self.dispatcher
            .announce(MessageArgs::TransactionOpenComplete(TransactionOpenCompleteArgs {
                boundary_id: boundary.clone(),
                failure: None,
            }));
        tracing::info!(boundary = %boundary, entries = entries.len(), "transaction opened");

        let mut completed: Vec<PackageId> = Vec::new();
        let mut failed: Option<GroupFailure> = None;

        for entry in entries {
            let Some(package) = bundle.package(&entry.package_id) else {
                continue;
            };

            let results = self
                .dispatcher
                .dispatch(MessageArgs::ExecutePackageBegin(ExecutePackageBeginArgs {
                    package_id: entry.package_id.clone(),
                    operation: entry.operation,
                    rollback: false,
                }));
            if results.cancel_requested() {
                failed = Some(GroupFailure {
                    package_id: Some(entry.package_id.clone()),
                    failure: cancelled(),
                    cancel: true,
                });
                break;
            }

            match self.execute_entry(package, entry.operation, false, &run.payloads).await {
                Ok(()) => {
                    self.close_execute(entry, None);
                    completed.push(entry.package_id.clone());
                }
                Err(err) => {
                    let cancel = matches!(err, Error::Cancelled);
                    let failure = FailureInfo::from_error(&err);
                    self.close_execute(entry, Some(failure.clone()));
                    tracing::warn!(
                        package_id = %entry.package_id,
                        %err,
                        "package operation failed inside transaction"
                    );
                    failed = Some(GroupFailure {
                        package_id: Some(entry.package_id.clone()),
                        failure,
                        cancel,
                    });
                    break;
                }
            }
        }

        if failed.is_none() {
            let results = self
                .dispatcher
                .dispatch(MessageArgs::TransactionCommitBegin(TransactionCommitBeginArgs {
                    boundary_id: boundary.clone(),
                }));
            if results.cancel_requested() {
                self.dispatcher
                    .announce(MessageArgs::TransactionCommitComplete(TransactionCommitCompleteArgs {
                        boundary_id: boundary.clone(),
                        failure: Some(cancelled()),
                    }));
                failed = Some(GroupFailure {
                    package_id: None,
                    failure: cancelled(),
                    cancel: true,
                });
            } else {
                self.dispatcher
                    .announce(MessageArgs::TransactionCommitComplete(TransactionCommitCompleteArgs {
                        boundary_id: boundary.clone(),
                        failure: None,
                    }));
                tracing::info!(boundary = %boundary, "transaction committed");
                for entry in entries {
                    run.push_outcome(entry, EntryStatus::Succeeded, None);
                }
                return;
            }
        }

        let Some(group_failure) = failed else {
            return;
        };

        match self
            .rollback_group(bundle, plan, group, &boundary, &completed, &run.payloads)
            .await
        {
            Ok(()) => {
                for entry in entries {
                    if completed.contains(&entry.package_id) {
                        run.push_outcome(entry, EntryStatus::RolledBack, None);
                    } else if Some(&entry.package_id) == group_failure.package_id.as_ref() {
                        run.push_outcome(
                            entry,
                            EntryStatus::Failed,
                            Some(group_failure.failure.clone()),
                        );
                    } else {
                        run.push_outcome(entry, EntryStatus::Skipped, None);
                    }
                }
                if group_failure.cancel || descriptor.vital {
                    run.fatal = Some(group_failure.failure);
                    run.rolled_back = true;
                } else {
                    tracing::info!(boundary = %boundary, "non-vital transaction rolled back, continuing");
                }
            }
            Err(unrecoverable) => {
                for entry in entries {
                    if Some(&entry.package_id) == group_failure.package_id.as_ref() {
                        run.push_outcome(
                            entry,
                            EntryStatus::Failed,
                            Some(group_failure.failure.clone()),
                        );
                    } else if completed.contains(&entry.package_id) {
                        run.push_outcome(entry, EntryStatus::Failed, None);
                    } else {
                        run.push_outcome(entry, EntryStatus::Skipped, None);
                    }
                }
                run.fatal = Some(unrecoverable);
                run.rolled_back = false;
            }
        }
    }

    /// Replays the group's inverse operations over everything that
    /// completed, newest first. Cancellation is ignored throughout.
    async fn rollback_group(
        &self,
        bundle: &Bundle,
        plan: &Plan,
        group: usize,
        boundary: &BoundaryId,
        completed: &[PackageId],
        payloads: &HashMap<PackageId, PathBuf>,
    ) -> std::result::Result<(), FailureInfo> {
        self.dispatcher
            .announce(MessageArgs::TransactionRollbackBegin(TransactionRollbackBeginArgs {
                boundary_id: boundary.clone(),
            }));
        tracing::warn!(boundary = %boundary, "rolling back transaction");

        let mut failure = None;
        for entry in plan.rollback_for_group(group) {
            if !completed.contains(&entry.package_id) {
                continue;
            }
            let Some(package) = bundle.package(&entry.package_id) else {
                continue;
            };

            self.dispatcher
                .announce(MessageArgs::ExecutePackageBegin(ExecutePackageBeginArgs {
                    package_id: entry.package_id.clone(),
                    operation: entry.operation,
                    rollback: true,
                }));
            match self.execute_entry(package, entry.operation, true, payloads).await {
                Ok(()) => {
                    self.dispatcher
                        .announce(MessageArgs::ExecutePackageComplete(ExecutePackageCompleteArgs {
                            package_id: entry.package_id.clone(),
                            operation: entry.operation,
                            failure: None,
                        }));
                }
                Err(err) => {
                    self.dispatcher
                        .announce(MessageArgs::ExecutePackageComplete(ExecutePackageCompleteArgs {
                            package_id: entry.package_id.clone(),
                            operation: entry.operation,
                            failure: Some(FailureInfo::from_error(&err)),
                        }));
                    tracing::error!(
                        package_id = %entry.package_id,
                        %err,
                        "rollback step failed, machine state is unknown"
                    );
                    let unrecoverable = ApplyError::Unrecoverable {
                        boundary: boundary.to_string(),
                    };
                    failure = Some(FailureInfo::from_error(&unrecoverable));
                    break;
                }
            }
        }

        self.dispatcher
            .announce(MessageArgs::TransactionRollbackComplete(TransactionRollbackCompleteArgs {
                boundary_id: boundary.clone(),
                failure: failure.clone(),
            }));
        match failure {
            None => Ok(()),
            Some(failure) => Err(failure),
        }
    }

    async fn execute_entry(
        &self,
        package: &Package,
        operation: PackageOperation,
        rollback: bool,
        payloads: &HashMap<PackageId, PathBuf>,
    ) -> Result<()> {
        let payload = if operation.needs_payload() {
            match payloads.get(&package.id) {
                Some(path) => Some(path.clone()),
                None => {
                    return Err(ApplyError::PlanInvalid {
                        message: format!("no cached payload for {}", package.id),
                    }
                    .into())
                }
            }
        } else {
            None
        };
        let progress =
            ExecutionProgress::new(self.dispatcher.clone(), package.id.clone(), rollback);
        self.executor
            .execute(package, operation, payload.as_deref(), &progress)
            .await
    }

    fn close_execute(&self, entry: &ExecuteEntry, failure: Option<FailureInfo>) {
        self.dispatcher
            .announce(MessageArgs::ExecutePackageComplete(ExecutePackageCompleteArgs {
                package_id: entry.package_id.clone(),
                operation: entry.operation,
                failure,
            }));
    }

    /// Reports stage and whole-pass completion after an entry settles.
    /// Returns false when the extension cancels; cancellation between
    /// entries stops the pass before the next one starts.
    fn progress_step(
        &self,
        stage_done: usize,
        stage_total: usize,
        overall_done: usize,
        overall_total: usize,
    ) -> bool {
        let results = self
            .dispatcher
            .dispatch(MessageArgs::Progress(ProgressArgs {
                percent: percent_of(stage_done, stage_total),
                overall_percent: percent_of(overall_done, overall_total),
            }));
        !results.cancel_requested()
    }

    async fn finish(
        &self,
        plan: &Plan,
        registration: &Registration,
        mut run: ApplyRun,
    ) -> Result<ApplySummary> {
        for entry in &plan.execute {
            if run.has_outcome(&entry.package_id) {
                continue;
            }
            let (status, failure) = match run.cache_failures.get(&entry.package_id) {
                Some((status, failure)) => (*status, Some(failure.clone())),
                None => (EntryStatus::Skipped, None),
            };
            run.push_outcome(entry, status, failure);
        }

        let status = if run.fatal.is_some() {
            if run.rolled_back {
                ApplyStatus::FailedRolledBack
            } else {
                ApplyStatus::Failed
            }
        } else if run.outcomes.iter().all(|o| o.status == EntryStatus::Succeeded) {
            ApplyStatus::Success
        } else {
            ApplyStatus::SuccessWithWarnings
        };

        let keep_registration = !status.is_success();
        if keep_registration {
            let mut parked = registration.clone();
            parked.resumable = true;
            if let Err(err) = self.registration.save(&parked).await {
                tracing::warn!(%err, "could not park registration for resume");
            }
        } else {
            if let Err(err) = self.registration.clear().await {
                tracing::warn!(%err, "could not clear registration");
            }
            self.drop_unkept_payloads(plan, &run).await;
        }

        self.dispatcher
            .announce(MessageArgs::UnregisterBegin(UnregisterBeginArgs {
                keep_registration,
            }));
        self.dispatcher
            .announce(MessageArgs::UnregisterComplete(UnregisterCompleteArgs {}));

        Ok(ApplySummary {
            status,
            session_id: registration.session_id,
            entries: run.outcomes,
            failure: run.fatal,
        })
    }

    async fn drop_unkept_payloads(&self, plan: &Plan, run: &ApplyRun) {
        let kept: HashSet<&PathBuf> = plan
            .cache
            .iter()
            .filter(|entry| entry.keep)
            .filter_map(|entry| run.payloads.get(&entry.package_id))
            .collect();
        for entry in &plan.cache {
            if entry.keep {
                continue;
            }
            let Some(path) = run.payloads.get(&entry.package_id) else {
                continue;
            };
            if kept.contains(path) {
                continue;
            }
            if let Err(err) = bndl_fileops::delete_file(path, RetryPolicy::none()).await {
                tracing::debug!(%err, path = %path.display(), "payload cleanup skipped");
            }
        }
    }
}

impl std::fmt::Debug for ApplyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyEngine")
            .field("store", &self.store)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Mutable state threaded through the passes of one apply run.
#[derive(Default)]
struct ApplyRun {
    outcomes: Vec<EntryOutcome>,
    payloads: HashMap<PackageId, PathBuf>,
    cache_failures: HashMap<PackageId, (EntryStatus, FailureInfo)>,
    fatal: Option<FailureInfo>,
    rolled_back: bool,
}

impl ApplyRun {
    fn has_outcome(&self, package_id: &PackageId) -> bool {
        self.outcomes.iter().any(|o| &o.package_id == package_id)
    }

    fn push_outcome(&mut self, entry: &ExecuteEntry, status: EntryStatus, failure: Option<FailureInfo>) {
        self.outcomes.push(EntryOutcome {
            package_id: entry.package_id.clone(),
            operation: entry.operation,
            status,
            failure,
        });
    }
}

struct GroupFailure {
    package_id: Option<PackageId>,
    failure: FailureInfo,
    cancel: bool,
}

enum CacheOutcome {
    Cached(PathBuf),
    Failed(FailureInfo),
    Cancelled,
}

fn cancelled() -> FailureInfo {
    FailureInfo::from_error(&Error::Cancelled)
}

fn plan_steps(plan: &Plan) -> usize {
    plan.cache.len() + plan.execute.len()
}

fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(done.saturating_mul(100) / total).unwrap_or(100)
}

fn validate_plan(bundle: &Bundle, plan: &Plan) -> Result<()> {
    if plan.bundle_id != bundle.id {
        return Err(ApplyError::PlanInvalid {
            message: format!("plan was sealed for bundle {}, not {}", plan.bundle_id, bundle.id),
        }
        .into());
    }
    let missing = plan
        .execute
        .iter()
        .map(|e| &e.package_id)
        .chain(plan.cache.iter().map(|e| &e.package_id))
        .chain(plan.rollback.iter().map(|e| &e.package_id))
        .find(|id| bundle.package(id).is_none());
    if let Some(id) = missing {
        return Err(ApplyError::PlanInvalid {
            message: format!("package {id} is not in the bundle"),
        }
        .into());
    }
    if plan
        .execute
        .iter()
        .filter_map(|e| e.group)
        .any(|g| g >= plan.groups.len())
    {
        return Err(ApplyError::PlanInvalid {
            message: "execute entry references a missing transaction group".to_string(),
        }
        .into());
    }
    Ok(())
}
