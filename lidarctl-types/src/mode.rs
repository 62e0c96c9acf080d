//! Device work modes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating state of a device
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Nothing confirmed yet
    #[default]
    Unknown,

    /// Powered, not scanning
    Standby,

    /// Scanning
    Active,

    /// Spinning down
    TransitioningToStandby,

    /// Spinning up
    TransitioningToActive,
}

impl Mode {
    /// Check if this mode can be requested from a device
    ///
    /// Transitional modes are only ever observed, never requested.
    pub fn is_requestable(self) -> bool {
        matches!(self, Self::Standby | Self::Active)
    }

    /// Get mode name
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Standby => "standby",
            Self::Active => "active",
            Self::TransitioningToStandby => "transitioning-to-standby",
            Self::TransitioningToActive => "transitioning-to-active",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
