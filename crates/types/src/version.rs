//! Four-part file version packed into a single u64
//!
//! Each component is 16 bits, packed high-to-low as
//! `major.minor.build.revision`. Ordering on the packed integer is
//! identical to lexicographic ordering on the quadruple, which makes
//! version comparison a single integer compare.

use std::fmt;
use std::str::FromStr;

use bndl_errors::VersionError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A `major.minor.build.revision` version, each part 0-65535.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileVersion(u64);

impl FileVersion {
    /// Smallest representable version, `0.0.0.0`.
    pub const ZERO: Self = Self(0);

    /// Largest representable version, `65535.65535.65535.65535`.
    pub const MAX: Self = Self(u64::MAX);

    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self(
            ((major as u64) << 48)
                | ((minor as u64) << 32)
                | ((build as u64) << 16)
                | (revision as u64),
        )
    }

    /// Reconstruct from a previously packed value.
    #[must_use]
    pub const fn from_packed(packed: u64) -> Self {
        Self(packed)
    }

    /// The packed 64-bit form.
    #[must_use]
    pub const fn packed(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn major(self) -> u16 {
        (self.0 >> 48) as u16
    }

    #[must_use]
    pub const fn minor(self) -> u16 {
        ((self.0 >> 32) & 0xFFFF) as u16
    }

    #[must_use]
    pub const fn build(self) -> u16 {
        ((self.0 >> 16) & 0xFFFF) as u16
    }

    #[must_use]
    pub const fn revision(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major(),
            self.minor(),
            self.build(),
            self.revision()
        )
    }
}

impl FromStr for FileVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 4 {
            return Err(VersionError::WrongArity {
                input: s.to_string(),
                count: parts.len(),
            });
        }
        let mut components = [0u16; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionError::InvalidComponent {
                    input: s.to_string(),
                    component: (*part).to_string(),
                });
            }
            *slot = part
                .parse::<u16>()
                .map_err(|_| VersionError::ComponentOverflow {
                    input: s.to_string(),
                    component: (*part).to_string(),
                })?;
        }
        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl Serialize for FileVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FileVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn packing_layout_matches_component_widths() {
        let v = FileVersion::new(1, 2, 3, 4);
        assert_eq!(v.packed(), (1u64 << 48) | (2u64 << 32) | (3u64 << 16) | 4);
        assert_eq!(v.major(), 1);
        assert_eq!(v.minor(), 2);
        assert_eq!(v.build(), 3);
        assert_eq!(v.revision(), 4);
    }

    #[test]
    fn display_and_parse_round_trip() {
        let v = FileVersion::new(10, 0, 19041, 1234);
        assert_eq!(v.to_string(), "10.0.19041.1234");
        assert_eq!("10.0.19041.1234".parse::<FileVersion>().unwrap(), v);
    }

    #[test]
    fn parse_rejects_wrong_arity() {
        assert!(matches!(
            "1.2.3".parse::<FileVersion>(),
            Err(VersionError::WrongArity { count: 3, .. })
        ));
        assert!(matches!(
            "1.2.3.4.5".parse::<FileVersion>(),
            Err(VersionError::WrongArity { count: 5, .. })
        ));
    }

    #[test]
    fn parse_rejects_overflow_distinctly() {
        assert!(matches!(
            "1.2.3.70000".parse::<FileVersion>(),
            Err(VersionError::ComponentOverflow { .. })
        ));
    }

    #[test]
    fn parse_rejects_non_numeric_components() {
        assert!(matches!(
            "1.2.x.4".parse::<FileVersion>(),
            Err(VersionError::InvalidComponent { .. })
        ));
        assert!(matches!(
            "1..3.4".parse::<FileVersion>(),
            Err(VersionError::InvalidComponent { .. })
        ));
        assert!(matches!(
            "1.2.-3.4".parse::<FileVersion>(),
            Err(VersionError::InvalidComponent { .. })
        ));
    }

    #[test]
    fn serde_uses_dotted_string_form() {
        let v = FileVersion::new(2, 1, 0, 7);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"2.1.0.7\"");
        let back: FileVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    proptest! {
        #[test]
        fn components_survive_packing(a: u16, b: u16, c: u16, d: u16) {
            let v = FileVersion::new(a, b, c, d);
            prop_assert_eq!(v.major(), a);
            prop_assert_eq!(v.minor(), b);
            prop_assert_eq!(v.build(), c);
            prop_assert_eq!(v.revision(), d);
        }

        #[test]
        fn packed_order_matches_tuple_order(
            a1: u16, b1: u16, c1: u16, d1: u16,
            a2: u16, b2: u16, c2: u16, d2: u16,
        ) {
            let v1 = FileVersion::new(a1, b1, c1, d1);
            let v2 = FileVersion::new(a2, b2, c2, d2);
            prop_assert_eq!(v1.cmp(&v2), (a1, b1, c1, d1).cmp(&(a2, b2, c2, d2)));
        }

        #[test]
        fn display_parse_round_trip(a: u16, b: u16, c: u16, d: u16) {
            let v = FileVersion::new(a, b, c, d);
            prop_assert_eq!(v.to_string().parse::<FileVersion>().unwrap(), v);
        }
    }
}
