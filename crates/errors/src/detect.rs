//! Detection phase error types

use thiserror::Error;

use crate::UserFacingError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DetectError {
    #[error("related bundle enumeration failed: {message}")]
    EnumerationFailed { message: String },

    #[error("inspection of package {package} failed: {message}")]
    InspectionFailed { package: String, message: String },
}

impl UserFacingError for DetectError {
    fn user_message(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.to_string())
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Self::EnumerationFailed { .. } => Some("detect.enumeration_failed"),
            Self::InspectionFailed { .. } => Some("detect.inspection_failed"),
        }
    }
}
