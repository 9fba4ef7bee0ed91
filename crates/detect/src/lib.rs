#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Detect phase: inspect the machine and classify every package
//!
//! Detection never mutates anything. It walks the bundle manifest in
//! order, asks a [`MachineInspector`] what is installed, and folds the
//! answers into a [`DetectionSnapshot`] the planner consumes. A package
//! whose inspection fails is recorded as [`PackageState::Unknown`] with
//! the failure attached; the phase itself only aborts when related
//! bundle enumeration fails or the extension cancels.
//!
//! [`PackageState::Unknown`]: bndl_types::PackageState::Unknown

mod engine;
mod inspector;
mod snapshot;

pub use engine::DetectEngine;
pub use inspector::{CacheProbe, MachineInspector, PathProbeInspector, RelatedBundle};
pub use snapshot::{classify, DetectedPackage, DetectionSnapshot};
