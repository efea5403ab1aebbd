//! Platform-parameterized compiler interface and its toolchain-backed
//! implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PtoError, Result};
use crate::platform::{CoreType, Platform, TargetType, Verbosity};
use crate::process::run_tool;

/// Default compiler driver when `PTO_COMPILER` is unset.
pub const DEFAULT_COMPILER: &str = "pto-cc";

/// Default pipeline launcher when `PTO_LAUNCHER` is unset.
pub const DEFAULT_LAUNCHER: &str = "pto-launch";

/// What a single-source compile produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Orchestration shared object dispatching kernels.
    Orchestration,
    /// One AICore kernel for the given tile type.
    Kernel(CoreType),
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Orchestration => "orchestration",
            SourceKind::Kernel(core) => core.name(),
        }
    }
}

/// Compiler turning source directories into a target binary.
///
/// Each call is independent and blocking from the caller's perspective;
/// any error is final for that build attempt.
#[async_trait]
pub trait TargetCompiler: Send + Sync {
    /// Platform this compiler was configured for.
    fn platform(&self) -> Platform;

    /// Compile one runtime target from absolute include/source directories.
    async fn compile(
        &self,
        target: TargetType,
        include_dirs: &[PathBuf],
        source_dirs: &[PathBuf],
    ) -> Result<Vec<u8>>;

    /// Compile a single orchestration or kernel source file.
    async fn compile_source(
        &self,
        kind: SourceKind,
        source: &Path,
        include_dirs: &[PathBuf],
    ) -> Result<Vec<u8>>;
}

/// External tool settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConfig {
    /// Compiler driver command and leading arguments.
    pub compiler: Vec<String>,

    /// Pipeline launcher command and leading arguments.
    pub launcher: Vec<String>,

    /// Per-invocation compile deadline in seconds (0 = none).
    pub compile_timeout_secs: u64,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: vec![DEFAULT_COMPILER.to_string()],
            launcher: vec![DEFAULT_LAUNCHER.to_string()],
            compile_timeout_secs: 0,
        }
    }
}

impl ToolchainConfig {
    /// Read `PTO_COMPILER`, `PTO_LAUNCHER` and `PTO_COMPILE_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let compiler = std::env::var("PTO_COMPILER")
            .ok()
            .map(|v| split_command(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.compiler);
        let launcher = std::env::var("PTO_LAUNCHER")
            .ok()
            .map(|v| split_command(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.launcher);
        let compile_timeout_secs = std::env::var("PTO_COMPILE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.compile_timeout_secs);

        Self {
            compiler,
            launcher,
            compile_timeout_secs,
        }
    }
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Compiler that shells out to the native toolchain driver.
///
/// Invocation: `<driver> --platform P --target T [-I dir]... [-S dir]... -o OUT`
/// for runtime targets, and `<driver> --platform P --kind K --source FILE
/// [-I dir]... -o OUT` for single sources.
pub struct ToolchainCompiler {
    platform: Platform,
    verbosity: Verbosity,
    config: ToolchainConfig,
}

impl ToolchainCompiler {
    pub fn new(platform: Platform, verbosity: Verbosity, config: ToolchainConfig) -> Self {
        Self {
            platform,
            verbosity,
            config,
        }
    }

    fn base_argv(&self) -> Vec<String> {
        let mut argv = self.config.compiler.clone();
        argv.push("--platform".to_string());
        argv.push(self.platform.name().to_string());
        if self.verbosity >= Verbosity::Verbose {
            argv.push("--verbose".to_string());
        }
        argv
    }

    async fn invoke(&self, unit: &str, mut argv: Vec<String>) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir()?;
        let out_path = scratch.path().join(format!("{}.bin", unit));
        argv.push("-o".to_string());
        argv.push(out_path.display().to_string());

        let output = run_tool(
            &format!("compile {}", unit),
            &argv,
            self.config.compile_timeout_secs,
            self.verbosity >= Verbosity::Verbose,
        )
        .await?;

        if !output.success {
            return Err(PtoError::CompileFailure {
                unit: unit.to_string(),
                message: format!(
                    "exit code {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
            });
        }

        debug!(unit, duration_ms = output.duration_ms, "Compile finished");

        std::fs::read(&out_path).map_err(|e| PtoError::CompileFailure {
            unit: unit.to_string(),
            message: format!("toolchain produced no output at {}: {}", out_path.display(), e),
        })
    }
}

fn push_dirs(argv: &mut Vec<String>, flag: &str, dirs: &[PathBuf]) {
    for dir in dirs {
        argv.push(flag.to_string());
        argv.push(dir.display().to_string());
    }
}

#[async_trait]
impl TargetCompiler for ToolchainCompiler {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn compile(
        &self,
        target: TargetType,
        include_dirs: &[PathBuf],
        source_dirs: &[PathBuf],
    ) -> Result<Vec<u8>> {
        let mut argv = self.base_argv();
        argv.push("--target".to_string());
        argv.push(target.name().to_string());
        push_dirs(&mut argv, "-I", include_dirs);
        push_dirs(&mut argv, "-S", source_dirs);
        self.invoke(target.name(), argv).await
    }

    async fn compile_source(
        &self,
        kind: SourceKind,
        source: &Path,
        include_dirs: &[PathBuf],
    ) -> Result<Vec<u8>> {
        if !source.is_file() {
            return Err(PtoError::missing_path("source file", source));
        }
        let mut argv = self.base_argv();
        argv.push("--kind".to_string());
        argv.push(kind.name().to_string());
        argv.push("--source".to_string());
        argv.push(source.display().to_string());
        push_dirs(&mut argv, "-I", include_dirs);

        let unit = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| kind.name().to_string());
        self.invoke(&unit, argv).await
    }
}
