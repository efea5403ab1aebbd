//! Per-example kernel configuration (`kernels/kernel_config.toml`).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PtoError, Result};
use crate::paths;
use crate::platform::CoreType;

/// Location of the kernel configuration inside an example's kernels directory.
pub const KERNEL_CONFIG_FILE: &str = "kernel_config.toml";

/// Orchestration source and its exported entry point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OrchestrationSpec {
    pub source: PathBuf,
    pub entry_function: String,
}

/// One dispatchable kernel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KernelSpec {
    /// Dispatch index used by the orchestration binary.
    pub func_id: u32,
    pub name: String,
    pub source: PathBuf,
    pub core_type: CoreType,
}

/// Runtime settings with a validated set of recognized options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Runtime implementation this example was written against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    /// Number of AICPU scheduler threads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aicpu_thread_num: Option<u32>,

    /// Number of AICore blocks to launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_dim: Option<u32>,

    /// Open-ended per-runtime settings.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

/// Kernel configuration of one example.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KernelConfig {
    pub orchestration: OrchestrationSpec,

    #[serde(default)]
    pub kernels: Vec<KernelSpec>,

    #[serde(default)]
    pub runtime_config: RuntimeConfig,
}

impl KernelConfig {
    /// Load `<kernels_dir>/kernel_config.toml`, validate it and resolve
    /// source paths against the kernels directory.
    pub fn load_from_dir(kernels_dir: &Path) -> Result<Self> {
        if !kernels_dir.is_dir() {
            return Err(PtoError::missing_path("kernels directory", kernels_dir));
        }
        Self::load(&kernels_dir.join(KERNEL_CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg: KernelConfig = super::load_toml(path)?;
        cfg.validate().map_err(|reason| PtoError::config(path, reason))?;

        let base = super::config_dir(path);
        cfg.orchestration.source = paths::resolve(base, &cfg.orchestration.source);
        for kernel in &mut cfg.kernels {
            kernel.source = paths::resolve(base, &kernel.source);
        }
        Ok(cfg)
    }

    /// Check dispatch-table and runtime-setting invariants.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.orchestration.entry_function.trim().is_empty() {
            return Err("orchestration.entry_function must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for kernel in &self.kernels {
            if !seen.insert(kernel.func_id) {
                return Err(format!(
                    "duplicate func_id {} (kernel '{}')",
                    kernel.func_id, kernel.name
                ));
            }
        }

        if self.runtime_config.aicpu_thread_num == Some(0) {
            return Err("runtime_config.aicpu_thread_num must be at least 1".to_string());
        }
        if self.runtime_config.block_dim == Some(0) {
            return Err("runtime_config.block_dim must be at least 1".to_string());
        }
        Ok(())
    }

    /// Kernels ordered by dispatch index.
    pub fn dispatch_table(&self) -> Vec<&KernelSpec> {
        let mut table: Vec<_> = self.kernels.iter().collect();
        table.sort_by_key(|k| k.func_id);
        table
    }
}
