//! The stage registry: the fixed, ordered definition of the seven pipeline
//! stages and their declared input dependencies.
//!
//! The order is data-dependent, not cosmetic: each stage's prompt embeds
//! the full structured output of the stages it consumes, so stages cannot
//! be reordered or parallelized without changing their semantic input.

pub mod output;
pub mod prompts;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The seven pipeline stages, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Parse the free-form vehicle description into structured facts.
    Normalize,
    /// Pick an overall build direction and priorities.
    Strategy,
    /// Identify modification combinations that reinforce each other.
    Synergy,
    /// Lay out the staged execution plan (array of phases).
    Execution,
    /// Estimate performance outcomes of the planned work.
    Performance,
    /// Suggest parts vendors, localized to the caller's city.
    Sourcing,
    /// Write the owner-facing summary of the plan.
    Tone,
}

impl StageName {
    /// Execution order of the pipeline. Fixed; see the module docs.
    pub const ORDER: [StageName; 7] = [
        Self::Normalize,
        Self::Strategy,
        Self::Synergy,
        Self::Execution,
        Self::Performance,
        Self::Sourcing,
        Self::Tone,
    ];

    /// Number of stages in a run.
    pub const COUNT: usize = Self::ORDER.len();

    /// Zero-based position in the execution order.
    pub fn ordinal(self) -> usize {
        match self {
            Self::Normalize => 0,
            Self::Strategy => 1,
            Self::Synergy => 2,
            Self::Execution => 3,
            Self::Performance => 4,
            Self::Sourcing => 5,
            Self::Tone => 6,
        }
    }

    /// Prior-stage outputs this stage's prompt embeds.
    pub fn dependencies(self) -> &'static [StageName] {
        match self {
            Self::Normalize => &[],
            Self::Strategy => &[Self::Normalize],
            Self::Synergy => &[Self::Normalize, Self::Strategy],
            // The sourcing prompt additionally embeds the caller's city.
            Self::Execution | Self::Performance | Self::Sourcing => {
                &[Self::Normalize, Self::Synergy]
            }
            Self::Tone => &[Self::Synergy, Self::Performance],
        }
    }

    /// Whether the stage's declared output is a top-level JSON array.
    pub fn wants_array(self) -> bool {
        matches!(self, Self::Execution)
    }

    /// Wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::Strategy => "strategy",
            Self::Synergy => "synergy",
            Self::Execution => "execution",
            Self::Performance => "performance",
            Self::Sourcing => "sourcing",
            Self::Tone => "tone",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = StageNameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normalize" => Ok(Self::Normalize),
            "strategy" => Ok(Self::Strategy),
            "synergy" => Ok(Self::Synergy),
            "execution" => Ok(Self::Execution),
            "performance" => Ok(Self::Performance),
            "sourcing" => Ok(Self::Sourcing),
            "tone" => Ok(Self::Tone),
            other => Err(StageNameParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`StageName`] string.
#[derive(Debug, Clone)]
pub struct StageNameParseError(pub String);

impl fmt::Display for StageNameParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid stage name: {:?}", self.0)
    }
}

impl std::error::Error for StageNameParseError {}

/// Static definition of one stage: name, position, and declared inputs.
#[derive(Debug, Clone, Copy)]
pub struct StageDefinition {
    pub name: StageName,
    pub ordinal: usize,
    pub dependencies: &'static [StageName],
    /// Array hint forwarded to the generator.
    pub array_output: bool,
}

/// The fixed stage registry, in execution order.
pub fn stage_registry() -> [StageDefinition; StageName::COUNT] {
    StageName::ORDER.map(|name| StageDefinition {
        name,
        ordinal: name.ordinal(),
        dependencies: name.dependencies(),
        array_output: name.wants_array(),
    })
}
