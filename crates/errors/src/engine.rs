//! Engine lifecycle error types

use thiserror::Error;

use crate::UserFacingError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EngineError {
    #[error("{operation} is not allowed while the engine is {phase}")]
    InvalidPhase { operation: String, phase: String },

    #[error("no detection snapshot available; run detect first")]
    SnapshotMissing,

    #[error("no plan available; run plan first")]
    PlanMissing,

    #[error("a previous session is registered with a different plan (registered {registered}, current {current})")]
    PendingSessionMismatch { registered: String, current: String },
}

impl UserFacingError for EngineError {
    fn user_message(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::PendingSessionMismatch { .. } => {
                Some("Finish or discard the pending session before planning a different action.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidPhase { .. } => Some("engine.invalid_phase"),
            Self::SnapshotMissing => Some("engine.snapshot_missing"),
            Self::PlanMissing => Some("engine.plan_missing"),
            Self::PendingSessionMismatch { .. } => Some("engine.pending_session_mismatch"),
        }
    }
}
