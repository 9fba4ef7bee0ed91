#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Top level engine: one bundle, one extension, one phase cycle
//!
//! [`Engine`] owns the dispatcher, the collaborator handles, and the
//! working directories, and drives Detect, Plan, and Apply in order.
//! Illegal orderings are refused with a typed phase error. A session
//! opens with [`Engine::startup`], which drains the pending delete
//! journal and surfaces a registration parked by an interrupted apply,
//! and closes with [`Engine::shutdown`], after which the extension is
//! released.

mod config;
mod phase;

pub use config::{
    CacheConfig, EngineConfig, NetworkConfig, RegistrationConfig, RestorePointConfig, RetryConfig,
};
pub use phase::EnginePhase;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bndl_apply::{
    Acquirer, ApplyEngine, ApplySummary, CacheStore, PackageExecutor, PayloadVerifier,
    Registration, RegistrationStore, SystemServices,
};
use bndl_detect::{CacheProbe, DetectEngine, DetectionSnapshot, MachineInspector};
use bndl_errors::{EngineError, Result};
use bndl_fileops::{DrainReport, PendingDeleteJournal};
use bndl_net::NetClient;
use bndl_plan::{Plan, Planner};
use bndl_protocol::records::{ShutdownArgs, StartupArgs};
use bndl_protocol::{Dispatcher, Extension, MessageArgs};
use bndl_types::{Bundle, Package, RequestedAction};

const PENDING_DELETES_FILE: &str = "pending-deletes.json";

/// What [`Engine::startup`] found on disk
#[derive(Debug, Clone)]
pub struct StartupReport {
    /// Outcome of draining the pending delete journal
    pub pending_deletes: DrainReport,
    /// Resumable registration left behind by an interrupted apply
    pub parked: Option<Registration>,
}

/// Drives one bundle through Detect, Plan, and Apply
pub struct Engine {
    dispatcher: Arc<Dispatcher>,
    bundle: Bundle,
    config: EngineConfig,
    working_dir: PathBuf,
    inspector: Arc<dyn MachineInspector>,
    executor: Arc<dyn PackageExecutor>,
    verifier: Option<Arc<dyn PayloadVerifier>>,
    services: Option<Arc<dyn SystemServices>>,
    store: CacheStore,
    registration: RegistrationStore,
    journal: PendingDeleteJournal,
    phase: EnginePhase,
    started: bool,
    snapshot: Option<DetectionSnapshot>,
    plan: Option<Plan>,
    parked: Option<Registration>,
}

impl Engine {
    /// Attach the extension and build an engine over `bundle`.
    ///
    /// `working_dir` anchors the payload store, the registration
    /// journal, and the pending delete journal unless the configuration
    /// points them elsewhere.
    ///
    /// # Errors
    ///
    /// Fails when the extension targets an incompatible protocol major
    /// version.
    pub fn create(
        bundle: Bundle,
        extension: Arc<dyn Extension>,
        working_dir: impl Into<PathBuf>,
        inspector: Arc<dyn MachineInspector>,
        executor: Arc<dyn PackageExecutor>,
    ) -> Result<Self> {
        let dispatcher = Arc::new(Dispatcher::create(extension)?);
        let working_dir = working_dir.into();
        let config = EngineConfig::default();
        let session_dir = config.registration_dir(&working_dir);
        Ok(Self {
            store: CacheStore::new(config.cache_dir(&working_dir)),
            registration: RegistrationStore::new(session_dir.clone()),
            journal: PendingDeleteJournal::new(session_dir.join(PENDING_DELETES_FILE)),
            dispatcher,
            bundle,
            config,
            working_dir,
            inspector,
            executor,
            verifier: None,
            services: None,
            phase: EnginePhase::Idle,
            started: false,
            snapshot: None,
            plan: None,
            parked: None,
        })
    }

    /// Replace the default configuration, re-anchoring the store and
    /// journal directories.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        let session_dir = self.config.registration_dir(&self.working_dir);
        self.store = CacheStore::new(self.config.cache_dir(&self.working_dir));
        self.registration = RegistrationStore::new(session_dir.clone());
        self.journal = PendingDeleteJournal::new(session_dir.join(PENDING_DELETES_FILE));
        self
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn PayloadVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Attach system services; restore points are still gated on the
    /// `restore_point.enabled` configuration flag.
    #[must_use]
    pub fn with_system_services(mut self, services: Arc<dyn SystemServices>) -> Self {
        self.services = Some(services);
        self
    }

    /// Open the session: drain deletes owed from earlier sessions, look
    /// for a parked registration, and announce `Startup`.
    ///
    /// # Errors
    ///
    /// Returns an error when called twice, or when the journals cannot
    /// be read.
    pub async fn startup(&mut self) -> Result<StartupReport> {
        if self.started {
            return Err(EngineError::InvalidPhase {
                operation: "startup".to_string(),
                phase: "already started".to_string(),
            }
            .into());
        }

        let pending_deletes = self.journal.drain(self.config.retry_policy()).await?;
        if pending_deletes.deleted > 0 || pending_deletes.remaining > 0 {
            tracing::info!(
                deleted = pending_deletes.deleted,
                remaining = pending_deletes.remaining,
                "pending delete journal drained"
            );
        }

        self.parked = self.registration.load().await?.filter(|r| r.resumable);
        self.started = true;
        self.dispatcher
            .announce(MessageArgs::Startup(StartupArgs {
                resume: self.parked.is_some(),
            }));
        tracing::info!(
            bundle = %self.bundle.id,
            resume = self.parked.is_some(),
            "engine session started"
        );

        Ok(StartupReport {
            pending_deletes,
            parked: self.parked.clone(),
        })
    }

    /// Announce `Shutdown` and release the extension.
    pub fn shutdown(self) {
        if self.started {
            self.dispatcher
                .announce(MessageArgs::Shutdown(ShutdownArgs {}));
            tracing::info!("engine session closed");
        }
    }

    /// Inspect the machine and store a fresh snapshot.
    ///
    /// Allowed from any settled phase; a new snapshot invalidates any
    /// previously computed plan.
    ///
    /// # Errors
    ///
    /// Phase violations, extension cancellation, and related bundle
    /// enumeration failures. The phase is restored on error.
    pub async fn detect(&mut self) -> Result<DetectionSnapshot> {
        let prior = self.enter(
            "detect",
            &[
                EnginePhase::Idle,
                EnginePhase::Detected,
                EnginePhase::Planned,
                EnginePhase::Applied,
            ],
            EnginePhase::Detecting,
        )?;

        let detect = DetectEngine::new(self.dispatcher.clone()).with_cache_probe(Arc::new(
            StoreProbe {
                store: self.store.clone(),
            },
        ));
        match detect.detect(&self.bundle, self.inspector.as_ref()).await {
            Ok(snapshot) => {
                self.phase = EnginePhase::Detected;
                self.plan = None;
                self.snapshot = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(err) => {
                self.phase = prior;
                Err(err)
            }
        }
    }

    /// Compute and seal a plan for `action` over the current snapshot.
    ///
    /// When a parked session exists, the new plan must digest to the
    /// parked plan; anything else is refused until the parked session is
    /// finished or [discarded](Engine::discard_parked).
    ///
    /// # Errors
    ///
    /// Phase violations, structural manifest errors, extension
    /// cancellation, and a parked session digest mismatch. The phase is
    /// restored on error.
    pub fn plan(&mut self, action: RequestedAction) -> Result<Plan> {
        let prior = self.enter(
            "plan",
            &[EnginePhase::Detected, EnginePhase::Planned],
            EnginePhase::Planning,
        )?;

        match self.compute_plan(action) {
            Ok(plan) => {
                self.phase = EnginePhase::Planned;
                self.plan = Some(plan.clone());
                Ok(plan)
            }
            Err(err) => {
                self.phase = prior;
                Err(err)
            }
        }
    }

    fn compute_plan(&self, action: RequestedAction) -> Result<Plan> {
        let Some(snapshot) = &self.snapshot else {
            return Err(EngineError::SnapshotMissing.into());
        };
        let plan = Planner::new(self.dispatcher.clone())
            .with_default_keep(self.config.cache.keep_payloads)
            .plan(&self.bundle, snapshot, action)?;

        if let Some(parked) = &self.parked {
            if parked.plan_digest == plan.digest {
                tracing::info!(
                    session_id = %parked.session_id,
                    "plan matches the parked session, resuming"
                );
            } else {
                return Err(EngineError::PendingSessionMismatch {
                    registered: parked.plan_digest.clone(),
                    current: plan.digest.clone(),
                }
                .into());
            }
        }
        Ok(plan)
    }

    /// Apply the current plan.
    ///
    /// # Errors
    ///
    /// Phase violations and pre-registration refusals. Failures after
    /// registration are folded into the returned summary instead; see
    /// [`ApplyEngine::apply`].
    pub async fn apply(&mut self) -> Result<ApplySummary> {
        let prior = self.enter("apply", &[EnginePhase::Planned], EnginePhase::Applying)?;
        let Some(plan) = self.plan.clone() else {
            self.phase = prior;
            return Err(EngineError::PlanMissing.into());
        };
        let apply = match self.apply_engine() {
            Ok(apply) => apply,
            Err(err) => {
                self.phase = prior;
                return Err(err);
            }
        };

        match apply.apply(&self.bundle, &plan).await {
            Ok(summary) => {
                self.phase = EnginePhase::Applied;
                self.parked = match self.registration.load().await {
                    Ok(parked) => parked.filter(|r| r.resumable),
                    Err(err) => {
                        tracing::warn!(%err, "could not re-read registration after apply");
                        self.parked.take()
                    }
                };
                Ok(summary)
            }
            Err(err) => {
                self.phase = prior;
                Err(err)
            }
        }
    }

    /// Drop a parked session so a different plan can proceed.
    ///
    /// # Errors
    ///
    /// Returns an error when the registration cannot be removed.
    pub async fn discard_parked(&mut self) -> Result<()> {
        if let Some(parked) = self.parked.take() {
            tracing::info!(session_id = %parked.session_id, "discarding parked session");
            self.registration.clear().await?;
        }
        Ok(())
    }

    #[must_use]
    pub const fn phase(&self) -> EnginePhase {
        self.phase
    }

    #[must_use]
    pub fn parked_session(&self) -> Option<&Registration> {
        self.parked.as_ref()
    }

    /// Journal of deletes that lost to a lock; consumers may schedule
    /// their own paths here.
    #[must_use]
    pub const fn journal(&self) -> &PendingDeleteJournal {
        &self.journal
    }

    #[must_use]
    pub const fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn enter(
        &mut self,
        operation: &str,
        allowed: &[EnginePhase],
        transient: EnginePhase,
    ) -> Result<EnginePhase> {
        if !self.started {
            return Err(EngineError::InvalidPhase {
                operation: operation.to_string(),
                phase: "not started".to_string(),
            }
            .into());
        }
        if !allowed.contains(&self.phase) {
            return Err(EngineError::InvalidPhase {
                operation: operation.to_string(),
                phase: self.phase.to_string(),
            }
            .into());
        }
        let prior = self.phase;
        self.phase = transient;
        Ok(prior)
    }

    fn apply_engine(&self) -> Result<ApplyEngine> {
        let acquirer = Acquirer::new(NetClient::new(self.config.net_config())?);
        let mut apply = ApplyEngine::new(
            self.dispatcher.clone(),
            self.store.clone(),
            acquirer,
            self.registration.clone(),
            self.executor.clone(),
        )
        .with_retry(self.config.retry_policy());
        if let Some(verifier) = &self.verifier {
            apply = apply.with_verifier(verifier.clone());
        }
        let services = self
            .services
            .as_ref()
            .filter(|_| self.config.restore_point.enabled);
        if let Some(services) = services {
            apply = apply.with_system_services(services.clone());
        }
        Ok(apply)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("bundle", &self.bundle.id)
            .field("phase", &self.phase)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

/// Lets detection report payloads already present in the store.
struct StoreProbe {
    store: CacheStore,
}

#[async_trait]
impl CacheProbe for StoreProbe {
    async fn contains(&self, package: &Package) -> bool {
        match &package.payload.digest {
            Some(digest) => self.store.contains(digest).await,
            None => false,
        }
    }
}
