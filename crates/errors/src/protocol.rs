//! Extension protocol error types

use thiserror::Error;

use crate::UserFacingError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolError {
    #[error("extension requires protocol {extension}, engine speaks {engine}")]
    MajorVersionMismatch { engine: String, extension: String },

    #[error("message id {id} is reserved for the core protocol")]
    ReservedMessageId { id: u32 },

    #[error("unknown core message id {id}")]
    UnknownMessage { id: u32 },

    #[error("results record does not match message {message}")]
    RecordMismatch { message: String },
}

impl UserFacingError for ProtocolError {
    fn user_message(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::MajorVersionMismatch { .. } => {
                Some("The extension was built against an incompatible engine release.")
            }
            Self::ReservedMessageId { .. } => {
                Some("Custom messages must use ids at or above the extension base.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Self::MajorVersionMismatch { .. } => Some("protocol.major_version_mismatch"),
            Self::ReservedMessageId { .. } => Some("protocol.reserved_message_id"),
            Self::UnknownMessage { .. } => Some("protocol.unknown_message"),
            Self::RecordMismatch { .. } => Some("protocol.record_mismatch"),
        }
    }
}
