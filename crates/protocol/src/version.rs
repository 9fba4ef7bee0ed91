//! Protocol version negotiation
//!
//! An extension states the newest protocol version it understands when it
//! attaches; the engine answers with the version the session will speak.
//! Within a major version the answer is simply the smaller minor, so old
//! extensions keep working against new engines and new extensions degrade
//! gracefully against old engines. Across majors there is no common
//! language and attachment fails.

use bndl_errors::ProtocolError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApiVersion {
    pub major: u16,
    pub minor: u16,
}

impl ApiVersion {
    pub const V1_0: Self = Self { major: 1, minor: 0 };
    pub const V1_1: Self = Self { major: 1, minor: 1 };

    /// Newest version this engine speaks.
    pub const CURRENT: Self = Self::V1_1;

    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Version the session will speak, given what each side supports.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MajorVersionMismatch`] when the major
    /// versions differ.
    pub fn negotiate(engine: Self, extension: Self) -> Result<Self, ProtocolError> {
        if engine.major != extension.major {
            return Err(ProtocolError::MajorVersionMismatch {
                engine: engine.to_string(),
                extension: extension.to_string(),
            });
        }
        Ok(engine.min(extension))
    }

    /// Whether a field introduced in `since` is visible at this version.
    #[must_use]
    pub fn supports(self, since: Self) -> bool {
        self >= since
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_picks_lower_minor() {
        assert_eq!(
            ApiVersion::negotiate(ApiVersion::V1_1, ApiVersion::V1_0).unwrap(),
            ApiVersion::V1_0
        );
        assert_eq!(
            ApiVersion::negotiate(ApiVersion::V1_0, ApiVersion::V1_1).unwrap(),
            ApiVersion::V1_0
        );
        assert_eq!(
            ApiVersion::negotiate(ApiVersion::V1_1, ApiVersion::new(1, 7)).unwrap(),
            ApiVersion::V1_1
        );
    }

    #[test]
    fn major_mismatch_refuses_attachment() {
        let err = ApiVersion::negotiate(ApiVersion::V1_1, ApiVersion::new(2, 0)).unwrap_err();
        assert!(matches!(err, ProtocolError::MajorVersionMismatch { .. }));
    }

    #[test]
    fn field_visibility_follows_negotiated_version() {
        assert!(ApiVersion::V1_1.supports(ApiVersion::V1_1));
        assert!(!ApiVersion::V1_0.supports(ApiVersion::V1_1));
    }
}
