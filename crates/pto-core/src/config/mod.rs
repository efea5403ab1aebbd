//! Typed on-disk configuration: build, kernel and golden files.

pub mod build;
pub mod golden;
pub mod kernel;

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{PtoError, Result};

pub use build::{BuildConfig, TargetSpec, BUILD_CONFIG_FILE};
pub use golden::{GoldenConfig, ParamSet, GOLDEN_FILE};
pub use kernel::{KernelConfig, KernelSpec, OrchestrationSpec, RuntimeConfig, KERNEL_CONFIG_FILE};

/// Read and parse a TOML file into `T`.
pub(crate) fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PtoError::missing_path("config file", path)
        } else {
            PtoError::Io(e)
        }
    })?;
    toml::from_str(&raw).map_err(|e| PtoError::config(path, e.to_string()))
}

/// Directory containing `path`, used as the base for relative entries.
pub(crate) fn config_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}
