//! Planning phase error types

use thiserror::Error;

use crate::UserFacingError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlanError {
    #[error("dependency cycle involving package {package}")]
    DependencyCycle { package: String },

    #[error("package {package} depends on unknown package {dependency}")]
    UnknownDependency { package: String, dependency: String },

    #[error("package {package} references unknown rollback boundary {boundary}")]
    UnknownBoundary { package: String, boundary: String },

    #[error("rollback boundary {boundary} is split by packages from another boundary")]
    BoundaryInterleaved { boundary: String },

    #[error("operation {operation} is not valid for package {package} in state {state}")]
    OperationNotAllowed {
        package: String,
        operation: String,
        state: String,
    },
}

impl UserFacingError for PlanError {
    fn user_message(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::DependencyCycle { .. } => {
                Some("Remove circular dependencies from the bundle manifest.")
            }
            Self::BoundaryInterleaved { .. } => {
                Some("Packages of one rollback boundary must be contiguous in dependency order.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Self::DependencyCycle { .. } => Some("plan.dependency_cycle"),
            Self::UnknownDependency { .. } => Some("plan.unknown_dependency"),
            Self::UnknownBoundary { .. } => Some("plan.unknown_boundary"),
            Self::BoundaryInterleaved { .. } => Some("plan.boundary_interleaved"),
            Self::OperationNotAllowed { .. } => Some("plan.operation_not_allowed"),
        }
    }
}
