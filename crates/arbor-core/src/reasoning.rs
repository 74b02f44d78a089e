//! Reasoning level settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discrete reasoning effort levels carried in session state.
///
/// Seeded to [`ReasoningLevel::Medium`] by `session.start`; replaced by each
/// `config.reasoning_level` event during projection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningLevel {
    /// Minimal reasoning.
    Low,
    /// Balanced (the default).
    #[default]
    Medium,
    /// Extended reasoning.
    High,
}

impl ReasoningLevel {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for ReasoningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown reasoning level: {other}")),
        }
    }
}
