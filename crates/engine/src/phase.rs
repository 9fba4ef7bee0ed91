//! Engine phase tracking

use serde::{Deserialize, Serialize};

/// Where the engine is in the Detect, Plan, Apply cycle
///
/// The transient states (`Detecting`, `Planning`, `Applying`) are only
/// observable from another task while a phase runs; a phase that fails
/// puts the engine back in the state it started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    Idle,
    Detecting,
    Detected,
    Planning,
    Planned,
    Applying,
    Applied,
}

impl EnginePhase {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Detecting => "detecting",
            Self::Detected => "detected",
            Self::Planning => "planning",
            Self::Planned => "planned",
            Self::Applying => "applying",
            Self::Applied => "applied",
        }
    }
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names_are_stable() {
        assert_eq!(EnginePhase::Idle.to_string(), "idle");
        assert_eq!(EnginePhase::Applying.to_string(), "applying");
        let json = serde_json::to_string(&EnginePhase::Detected).unwrap();
        assert_eq!(json, "\"detected\"");
    }
}
