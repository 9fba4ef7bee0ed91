//! Apply phase error types

use thiserror::Error;

use crate::UserFacingError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ApplyError {
    #[error("executing {operation} for package {package} failed: {message}")]
    ExecuteFailed {
        package: String,
        operation: String,
        message: String,
    },

    #[error("rollback of package {package} failed: {message}")]
    RollbackFailed { package: String, message: String },

    #[error("transaction {boundary} could not be rolled back; machine state may be inconsistent")]
    Unrecoverable { boundary: String },

    #[error("apply cancelled by extension")]
    Cancelled,

    #[error("plan is not executable: {message}")]
    PlanInvalid { message: String },
}

impl UserFacingError for ApplyError {
    fn user_message(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Unrecoverable { .. } => {
                Some("Repair the installation before attempting further changes.")
            }
            Self::Cancelled => Some("Run apply again to resume the session."),
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Self::ExecuteFailed { .. } => Some("apply.execute_failed"),
            Self::RollbackFailed { .. } => Some("apply.rollback_failed"),
            Self::Unrecoverable { .. } => Some("apply.unrecoverable"),
            Self::Cancelled => Some("apply.cancelled"),
            Self::PlanInvalid { .. } => Some("apply.plan_invalid"),
        }
    }
}
