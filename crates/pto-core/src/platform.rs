//! Platform, verbosity and build target selectors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target platform a runtime is compiled for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Platform {
    /// Real Ascend hardware.
    #[default]
    #[serde(rename = "a2a3")]
    Hardware,

    /// Thread-based simulator, no device required.
    #[serde(rename = "a2a3sim")]
    Simulator,
}

impl Platform {
    /// Platform name as understood by the toolchain.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Hardware => "a2a3",
            Platform::Simulator => "a2a3sim",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a2a3" | "hardware" => Ok(Platform::Hardware),
            "a2a3sim" | "simulator" | "sim" => Ok(Platform::Simulator),
            other => Err(format!(
                "unknown platform '{}' (expected a2a3 or a2a3sim)",
                other
            )),
        }
    }
}

/// Narration level for builds and example runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Verbosity {
    /// Errors only.
    Silent = 0,
    /// Success/failure summary and phase progress.
    #[default]
    Normal = 1,
    /// Every command line and its output.
    Verbose = 2,
}

impl Verbosity {
    pub fn level(&self) -> u8 {
        *self as u8
    }

    /// Matching default for the tracing filter.
    pub fn tracing_level(&self) -> tracing::Level {
        match self {
            Verbosity::Silent => tracing::Level::WARN,
            Verbosity::Normal => tracing::Level::INFO,
            Verbosity::Verbose => tracing::Level::DEBUG,
        }
    }
}

impl TryFrom<u8> for Verbosity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Verbosity::Silent),
            1 => Ok(Verbosity::Normal),
            2 => Ok(Verbosity::Verbose),
            other => Err(format!("verbosity must be 0, 1 or 2 (got {})", other)),
        }
    }
}

/// One of the three cooperating binaries of a runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Aicore,
    Aicpu,
    Host,
}

impl TargetType {
    /// Compile order used by every build.
    pub const BUILD_ORDER: [TargetType; 3] =
        [TargetType::Aicore, TargetType::Aicpu, TargetType::Host];

    pub fn name(&self) -> &'static str {
        match self {
            TargetType::Aicore => "aicore",
            TargetType::Aicpu => "aicpu",
            TargetType::Host => "host",
        }
    }

    /// Label used in progress lines.
    pub fn display_label(&self) -> &'static str {
        match self {
            TargetType::Aicore => "AICore kernel",
            TargetType::Aicpu => "AICPU kernel",
            TargetType::Host => "Host runtime",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// AICore tile flavour a kernel runs on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CoreType {
    /// Cube (matrix) core.
    Aic,
    /// Vector core.
    Aiv,
}

impl CoreType {
    pub fn name(&self) -> &'static str {
        match self {
            CoreType::Aic => "aic",
            CoreType::Aiv => "aiv",
        }
    }
}

impl fmt::Display for CoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
