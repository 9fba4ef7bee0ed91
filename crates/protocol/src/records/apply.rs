//! Apply lifecycle records: the outer begin and complete plus the
//! Register and Unregister stages

use bndl_types::ApplyStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::FailureInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplyBeginArgs {
    /// Entries in the execute sequence
    pub execute_count: usize,
    /// Payloads the cache stage will acquire
    pub cache_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBeginArgs {
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestorePointBeginArgs {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorePointCompleteArgs {
    /// Set when the snapshot failed or was declined; never fatal
    pub failure: Option<FailureInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterCompleteArgs {
    pub failure: Option<FailureInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnregisterBeginArgs {
    /// True when the session stays registered for a later resume
    pub keep_registration: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnregisterCompleteArgs {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyCompleteArgs {
    pub status: ApplyStatus,
    pub failure: Option<FailureInfo>,
}
