//! Per-runtime build configuration (`build_config.toml`).
//!
//! ```toml
//! [aicore]
//! include_dirs = ["runtime"]
//! source_dirs = ["aicore", "runtime"]
//!
//! [aicpu]
//! include_dirs = ["runtime"]
//! source_dirs = ["aicpu", "runtime"]
//!
//! [host]
//! include_dirs = ["runtime"]
//! source_dirs = ["host", "runtime"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::paths;
use crate::platform::TargetType;

/// File name that marks a directory as a runtime implementation.
pub const BUILD_CONFIG_FILE: &str = "build_config.toml";

/// Include and source directories for one target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,

    #[serde(default)]
    pub source_dirs: Vec<PathBuf>,
}

impl TargetSpec {
    /// Resolve both lists against `base` into absolute, de-duplicated paths.
    pub fn resolve(&self, base: &Path) -> TargetSpec {
        TargetSpec {
            include_dirs: paths::resolve_all(base, &self.include_dirs),
            source_dirs: paths::resolve_all(base, &self.source_dirs),
        }
    }
}

/// Build configuration of a runtime implementation.
///
/// All three targets are required; a missing table fails to parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildConfig {
    pub aicore: TargetSpec,
    pub aicpu: TargetSpec,
    pub host: TargetSpec,
}

impl BuildConfig {
    /// Load from disk, resolving every path against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw: BuildConfig = super::load_toml(path)?;
        let base = super::config_dir(path);
        Ok(BuildConfig {
            aicore: raw.aicore.resolve(base),
            aicpu: raw.aicpu.resolve(base),
            host: raw.host.resolve(base),
        })
    }

    pub fn target(&self, target: TargetType) -> &TargetSpec {
        match target {
            TargetType::Aicore => &self.aicore,
            TargetType::Aicpu => &self.aicpu,
            TargetType::Host => &self.host,
        }
    }
}
