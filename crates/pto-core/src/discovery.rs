//! Example discovery under `root/<runtime>/<example>/`.
//!
//! An example directory is valid when it holds both `golden.toml` and
//! `kernels/kernel_config.toml`. Discovery never aborts on a missing runtime
//! directory or an incomplete example; both are reported in the
//! [`DiscoveryReport`] and logged.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{GoldenConfig, KernelConfig, GOLDEN_FILE, KERNEL_CONFIG_FILE};
use crate::error::{PtoError, Result};

/// Directory under the examples root that never holds a runtime.
pub const SCRIPTS_DIR: &str = "scripts";

/// Kernels directory name inside an example.
pub const KERNELS_DIR: &str = "kernels";

/// One runnable example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleRecord {
    pub runtime_name: String,
    pub example_name: String,
    pub kernels_dir: PathBuf,
    pub golden_path: PathBuf,
}

impl ExampleRecord {
    /// `runtime/example`, used in rosters.
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.runtime_name, self.example_name)
    }
}

/// A required example file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingFile {
    Golden,
    KernelConfig,
}

impl fmt::Display for MissingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingFile::Golden => f.write_str(GOLDEN_FILE),
            MissingFile::KernelConfig => write!(f, "{}/{}", KERNELS_DIR, KERNEL_CONFIG_FILE),
        }
    }
}

/// An example directory rejected at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedExample {
    pub runtime_name: String,
    pub example_name: String,
    pub missing: Vec<MissingFile>,
}

impl fmt::Display for SkippedExample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let missing: Vec<String> = self.missing.iter().map(|m| m.to_string()).collect();
        write!(
            f,
            "Skipping {}/{}: missing {}",
            self.runtime_name,
            self.example_name,
            missing.join(", ")
        )
    }
}

/// Non-fatal discovery problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryWarning {
    MissingRuntimeDir { runtime_name: String, path: PathBuf },
}

impl fmt::Display for DiscoveryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryWarning::MissingRuntimeDir { runtime_name, .. } => {
                write!(f, "Runtime directory not found: {}", runtime_name)
            }
        }
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub records: Vec<ExampleRecord>,
    pub skipped: Vec<SkippedExample>,
    pub warnings: Vec<DiscoveryWarning>,
}

/// An example whose configs loaded and validated.
#[derive(Debug, Clone)]
pub struct ValidatedExample {
    pub record: ExampleRecord,
    pub kernel_config: KernelConfig,
    pub golden_config: GoldenConfig,
}

/// Registry of examples under an examples root.
pub struct ExampleRegistry;

impl ExampleRegistry {
    /// Scan `root` for examples, optionally restricted to one runtime.
    ///
    /// Runtimes and examples are visited in sorted order.
    pub fn scan(root: &Path, runtime_filter: Option<&str>) -> Result<DiscoveryReport> {
        if !root.is_dir() {
            return Err(PtoError::missing_path("examples directory", root));
        }

        let runtime_dirs: Vec<PathBuf> = match runtime_filter {
            Some(name) => vec![root.join(name)],
            None => sorted_subdirs(root)?
                .into_iter()
                .filter(|p| p.file_name().map_or(true, |n| n != SCRIPTS_DIR))
                .collect(),
        };

        let mut report = DiscoveryReport::default();
        for runtime_dir in runtime_dirs {
            let runtime_name = dir_name(&runtime_dir);
            if !runtime_dir.is_dir() {
                let warning = DiscoveryWarning::MissingRuntimeDir {
                    runtime_name,
                    path: runtime_dir,
                };
                warn!("{}", warning);
                report.warnings.push(warning);
                continue;
            }

            info!(runtime = %runtime_name, "Scanning runtime");
            for example_dir in sorted_subdirs(&runtime_dir)? {
                match Self::register(&runtime_name, &example_dir) {
                    Ok(record) => {
                        info!(example = %record.example_name, "Found example");
                        report.records.push(record);
                    }
                    Err(skipped) => {
                        warn!("{}", skipped);
                        report.skipped.push(skipped);
                    }
                }
            }
        }
        Ok(report)
    }

    /// Classify one example directory.
    ///
    /// Returns the record when both required files exist, otherwise a
    /// [`SkippedExample`] naming exactly the missing files.
    pub fn register(
        runtime_name: &str,
        example_dir: &Path,
    ) -> std::result::Result<ExampleRecord, SkippedExample> {
        let golden_path = example_dir.join(GOLDEN_FILE);
        let kernels_dir = example_dir.join(KERNELS_DIR);

        let mut missing = Vec::new();
        if !golden_path.is_file() {
            missing.push(MissingFile::Golden);
        }
        if !kernels_dir.join(KERNEL_CONFIG_FILE).is_file() {
            missing.push(MissingFile::KernelConfig);
        }

        let example_name = dir_name(example_dir);
        if missing.is_empty() {
            Ok(ExampleRecord {
                runtime_name: runtime_name.to_string(),
                example_name,
                kernels_dir,
                golden_path,
            })
        } else {
            Err(SkippedExample {
                runtime_name: runtime_name.to_string(),
                example_name,
                missing,
            })
        }
    }

    /// Load and validate both configs of a registered example.
    pub fn validate(record: &ExampleRecord) -> Result<ValidatedExample> {
        let kernel_config = KernelConfig::load_from_dir(&record.kernels_dir)?;
        let golden_config = GoldenConfig::load(&record.golden_path)?;
        Ok(ValidatedExample {
            record: record.clone(),
            kernel_config,
            golden_config,
        })
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}
