//! The frozen core message enumeration
//!
//! Ids are part of the wire contract. New core messages append at the
//! tail; existing ids are never renumbered or reused. Ids at or above
//! [`Message::EXTENSION_BASE`] are reserved for extension-private
//! messages and never collide with the core set.

use bndl_errors::ProtocolError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum Message {
    // Lifecycle
    Startup = 0,
    Shutdown = 1,

    // Detect
    DetectBegin = 2,
    DetectRelatedBundle = 3,
    DetectPackageBegin = 4,
    DetectPackageComplete = 5,
    DetectComplete = 6,

    // Plan
    PlanBegin = 7,
    PlanPackageBegin = 8,
    PlanPackageComplete = 9,
    PlanRollbackBoundary = 10,
    PlanComplete = 11,

    // Apply bracket and registration
    ApplyBegin = 12,
    RegisterBegin = 13,
    RestorePointBegin = 14,
    RestorePointComplete = 15,
    RegisterComplete = 16,

    // Cache
    CacheBegin = 17,
    CachePackageBegin = 18,
    CacheAcquireResolving = 19,
    CacheAcquireBegin = 20,
    CacheAcquireProgress = 21,
    CacheAcquireComplete = 22,
    CacheVerifyBegin = 23,
    CacheVerifyProgress = 24,
    CacheVerifyComplete = 25,
    CachePackageComplete = 26,
    CacheComplete = 27,

    // Execute
    ExecuteBegin = 28,
    TransactionOpenBegin = 29,
    TransactionOpenComplete = 30,
    ExecutePackageBegin = 31,
    ExecuteProgress = 32,
    ExecutePackageComplete = 33,
    TransactionCommitBegin = 34,
    TransactionCommitComplete = 35,
    TransactionRollbackBegin = 36,
    TransactionRollbackComplete = 37,
    ExecuteComplete = 38,

    // Unregister and apply completion
    UnregisterBegin = 39,
    UnregisterComplete = 40,
    ApplyComplete = 41,

    // Out of band
    Error = 42,
    Progress = 43,
}

impl Message {
    /// First id available for extension-private messages.
    pub const EXTENSION_BASE: u32 = 1024;

    /// Every core message, in id order.
    pub const ALL: [Self; 44] = [
        Self::Startup,
        Self::Shutdown,
        Self::DetectBegin,
        Self::DetectRelatedBundle,
        Self::DetectPackageBegin,
        Self::DetectPackageComplete,
        Self::DetectComplete,
        Self::PlanBegin,
        Self::PlanPackageBegin,
        Self::PlanPackageComplete,
        Self::PlanRollbackBoundary,
        Self::PlanComplete,
        Self::ApplyBegin,
        Self::RegisterBegin,
        Self::RestorePointBegin,
        Self::RestorePointComplete,
        Self::RegisterComplete,
        Self::CacheBegin,
        Self::CachePackageBegin,
        Self::CacheAcquireResolving,
        Self::CacheAcquireBegin,
        Self::CacheAcquireProgress,
        Self::CacheAcquireComplete,
        Self::CacheVerifyBegin,
        Self::CacheVerifyProgress,
        Self::CacheVerifyComplete,
        Self::CachePackageComplete,
        Self::CacheComplete,
        Self::ExecuteBegin,
        Self::TransactionOpenBegin,
        Self::TransactionOpenComplete,
        Self::ExecutePackageBegin,
        Self::ExecuteProgress,
        Self::ExecutePackageComplete,
        Self::TransactionCommitBegin,
        Self::TransactionCommitComplete,
        Self::TransactionRollbackBegin,
        Self::TransactionRollbackComplete,
        Self::ExecuteComplete,
        Self::UnregisterBegin,
        Self::UnregisterComplete,
        Self::ApplyComplete,
        Self::Error,
        Self::Progress,
    ];

    /// Wire id of this message.
    #[must_use]
    pub const fn id(self) -> u32 {
        self as u32
    }

    /// Core message for a wire id, when one exists.
    #[must_use]
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.id() == id)
    }

    /// Whether an extension can influence the engine through this
    /// message's results. Informational messages only report.
    ///
    /// This property is as frozen as the id: changing it would silently
    /// change which dispatch failures become vetoes.
    #[must_use]
    pub const fn cancelable(self) -> bool {
        matches!(
            self,
            Self::DetectBegin
                | Self::DetectRelatedBundle
                | Self::DetectPackageBegin
                | Self::PlanBegin
                | Self::PlanPackageBegin
                | Self::PlanRollbackBoundary
                | Self::ApplyBegin
                | Self::RegisterBegin
                | Self::CacheBegin
                | Self::CachePackageBegin
                | Self::CacheAcquireResolving
                | Self::CacheAcquireBegin
                | Self::CacheAcquireProgress
                | Self::CacheVerifyBegin
                | Self::CacheVerifyProgress
                | Self::ExecuteBegin
                | Self::TransactionOpenBegin
                | Self::ExecutePackageBegin
                | Self::ExecuteProgress
                | Self::TransactionCommitBegin
                | Self::Error
                | Self::Progress
        )
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Id of an extension-private message, proven to be outside the core
/// range at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionMessageId(u32);

impl ExtensionMessageId {
    /// # Errors
    ///
    /// Returns [`ProtocolError::ReservedMessageId`] when `id` falls in
    /// the core range.
    pub fn new(id: u32) -> Result<Self, ProtocolError> {
        if id < Message::EXTENSION_BASE {
            return Err(ProtocolError::ReservedMessageId { id });
        }
        Ok(Self(id))
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_core_ids_fit_below_extension_base() {
        for message in Message::ALL {
            assert!(message.id() < Message::EXTENSION_BASE);
        }
    }

    #[test]
    fn ids_are_dense_and_in_declaration_order() {
        for (expected, message) in Message::ALL.iter().enumerate() {
            assert_eq!(message.id() as usize, expected);
        }
    }

    #[test]
    fn from_id_inverts_id() {
        for message in Message::ALL {
            assert_eq!(Message::from_id(message.id()), Some(message));
        }
        assert_eq!(Message::from_id(44), None);
        assert_eq!(Message::from_id(Message::EXTENSION_BASE), None);
    }

    #[test]
    fn extension_ids_must_clear_the_base() {
        assert!(ExtensionMessageId::new(1023).is_err());
        assert!(ExtensionMessageId::new(1024).is_ok());
        assert_eq!(ExtensionMessageId::new(4096).unwrap().get(), 4096);
    }

    #[test]
    fn completes_are_informational() {
        assert!(!Message::DetectComplete.cancelable());
        assert!(!Message::CachePackageComplete.cancelable());
        assert!(!Message::ExecuteComplete.cancelable());
        assert!(!Message::ApplyComplete.cancelable());
        assert!(!Message::TransactionRollbackBegin.cancelable());
    }
}
