#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Apply engine: executes a sealed plan against the machine.
//!
//! Apply is the only phase that mutates anything. It runs as nested
//! passes: register the session, cache payloads into the local store,
//! execute the plan entries (rolling back transactional groups on
//! failure), then unregister or park the registration for resume.
//!
//! Rollback restores the machine, not the run: a rolled-back group
//! re-applies the inverse of every entry that had already completed,
//! in reverse order, and ignores cancellation while doing so.

mod acquire;
mod engine;
mod executor;
mod registration;
mod store;
mod summary;

pub use acquire::Acquirer;
pub use bndl_fileops::RetryPolicy;
pub use engine::ApplyEngine;
pub use executor::{ExecutionProgress, NullVerifier, PackageExecutor, PayloadVerifier};
pub use registration::{NullSystemServices, Registration, RegistrationStore, SystemServices};
pub use store::CacheStore;
pub use summary::{ApplySummary, EntryOutcome, EntryStatus};
