//! Three-target runtime builds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::artifact::{CompiledArtifact, RuntimeArtifacts};
use crate::compiler::TargetCompiler;
use crate::config::BuildConfig;
use crate::error::Result;
use crate::platform::{Platform, TargetType, Verbosity};
use crate::registry::{default_project_root, runtime_dir_for, RuntimeRegistry};

/// Builds named runtime implementations for one platform.
///
/// Runtime and platform are orthogonal: the same runtime can be compiled
/// for hardware or the simulator. The platform is fixed at construction
/// through the supplied compiler.
pub struct RuntimeBuilder {
    platform: Platform,
    verbosity: Verbosity,
    root: PathBuf,
    registry: RuntimeRegistry,
    compiler: Arc<dyn TargetCompiler>,
}

impl RuntimeBuilder {
    /// Bind a platform and scan `<root>/src/runtime/` for runtimes.
    ///
    /// `root` defaults to [`default_project_root`].
    pub fn new(
        platform: Platform,
        root: Option<PathBuf>,
        verbosity: Verbosity,
        compiler: Arc<dyn TargetCompiler>,
    ) -> Result<Self> {
        let root = root.unwrap_or_else(default_project_root);
        let registry = RuntimeRegistry::scan(&runtime_dir_for(&root))?;
        Ok(Self {
            platform,
            verbosity,
            root,
            registry,
            compiler,
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compiler shared with kernel and orchestration builds.
    pub fn compiler(&self) -> Arc<dyn TargetCompiler> {
        self.compiler.clone()
    }

    /// Names of discovered runtimes, sorted.
    pub fn list_runtimes(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Compile `name` into its host, aicpu and aicore binaries.
    ///
    /// Targets are compiled aicore → aicpu → host. The first failure aborts
    /// the build; nothing compiled earlier in the call is kept.
    pub async fn build(&self, name: &str) -> Result<RuntimeArtifacts> {
        let runtime = self.registry.get(name)?;
        let config = BuildConfig::load(&runtime.config_path)?;

        if self.verbosity >= Verbosity::Normal {
            info!(runtime = %name, platform = %self.platform, "Building runtime");
        }

        let aicore = self.compile_phase(TargetType::Aicore, &config).await?;
        let aicpu = self.compile_phase(TargetType::Aicpu, &config).await?;
        let host = self.compile_phase(TargetType::Host, &config).await?;

        if self.verbosity >= Verbosity::Normal {
            info!("Build complete!");
        }

        Ok(RuntimeArtifacts {
            host,
            aicpu,
            aicore,
        })
    }

    async fn compile_phase(
        &self,
        target: TargetType,
        config: &BuildConfig,
    ) -> Result<CompiledArtifact> {
        if self.verbosity >= Verbosity::Normal {
            let phase = TargetType::BUILD_ORDER
                .iter()
                .position(|t| *t == target)
                .unwrap_or(0)
                + 1;
            info!(
                "[{}/{}] Compiling {}...",
                phase,
                TargetType::BUILD_ORDER.len(),
                target.display_label()
            );
        }

        let spec = config.target(target);
        let bytes = self
            .compiler
            .compile(target, &spec.include_dirs, &spec.source_dirs)
            .await?;
        let artifact = CompiledArtifact::new(target, bytes);

        if self.verbosity >= Verbosity::Verbose {
            info!(
                target = %target,
                digest = %artifact.digest(),
                size = artifact.len(),
                "Compiled"
            );
        }
        Ok(artifact)
    }
}
