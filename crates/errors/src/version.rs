//! Version parsing error types

use thiserror::Error;

use crate::UserFacingError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VersionError {
    #[error("invalid version {input:?}: expected four dot-separated components, found {count}")]
    WrongArity { input: String, count: usize },

    #[error("invalid version {input:?}: component {component:?} is not a number")]
    InvalidComponent { input: String, component: String },

    #[error("invalid version {input:?}: component {component:?} exceeds 65535")]
    ComponentOverflow { input: String, component: String },
}

impl UserFacingError for VersionError {
    fn user_message(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        Some("Versions use the form major.minor.build.revision, each 0-65535.")
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Self::WrongArity { .. } => Some("version.wrong_arity"),
            Self::InvalidComponent { .. } => Some("version.invalid_component"),
            Self::ComponentOverflow { .. } => Some("version.component_overflow"),
        }
    }
}
