//! Pipeline execution: hand compiled binaries and input tensors to a device
//! (or simulator) and read the produced outputs back.
//!
//! The shipped [`LauncherExecutor`] stages everything in a scratch directory
//! and runs the launcher command (`PTO_LAUNCHER`, default `pto-launch`):
//!
//! ```text
//! <launcher> --manifest <dir>/launch.json
//! ```
//!
//! The manifest names the binaries, kernel table, runtime settings, tensor
//! argument order and the `tensors.json` input file. The launcher writes
//! every tensor after execution to the `outputs.json` path it was given.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use pto_core::process::run_tool;
use pto_core::{CoreType, ParamSet, Platform, RuntimeArtifacts, RuntimeConfig, Verbosity};
use pto_golden::TensorMap;

use crate::error::{HarnessError, HarnessResult};

pub const MANIFEST_FILE: &str = "launch.json";
pub const TENSORS_FILE: &str = "tensors.json";
pub const OUTPUTS_FILE: &str = "outputs.json";

/// A compiled kernel and its dispatch slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelBinary {
    pub func_id: u32,
    pub name: String,
    pub core_type: CoreType,
    pub bytes: Vec<u8>,
}

/// Everything compiled for one example, reused across its cases.
#[derive(Debug, Clone)]
pub struct PreparedPipeline {
    pub platform: Platform,
    pub runtime_name: String,
    pub runtime: RuntimeArtifacts,
    pub orchestration: Vec<u8>,
    pub entry_function: String,
    /// Sorted by `func_id`.
    pub kernels: Vec<KernelBinary>,
    pub runtime_config: RuntimeConfig,
    /// Tensor argument order of the entry function; empty means name order.
    pub tensor_order: Vec<String>,
}

/// One case handed to an executor.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub case_label: &'a str,
    pub params: &'a ParamSet,
    pub device_id: u32,
    pub inputs: &'a TensorMap,
}

/// Runs a prepared pipeline for one case and returns the tensors after
/// execution.
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    async fn execute(
        &self,
        pipeline: &PreparedPipeline,
        request: ExecutionRequest<'_>,
    ) -> HarnessResult<TensorMap>;
}

#[derive(Serialize)]
struct KernelEntry<'a> {
    func_id: u32,
    name: &'a str,
    core_type: CoreType,
    binary: PathBuf,
}

#[derive(Serialize)]
struct LaunchManifest<'a> {
    platform: &'static str,
    device_id: u32,
    runtime: &'a str,
    case: &'a str,
    params: &'a ParamSet,
    host_binary: PathBuf,
    aicpu_binary: PathBuf,
    aicore_binary: PathBuf,
    orchestration_binary: PathBuf,
    entry_function: &'a str,
    kernels: Vec<KernelEntry<'a>>,
    runtime_config: &'a RuntimeConfig,
    tensor_order: Vec<String>,
    tensors: PathBuf,
    outputs: PathBuf,
}

/// Executor backed by an out-of-process launcher.
pub struct LauncherExecutor {
    launcher: Vec<String>,
    timeout_secs: u64,
    verbosity: Verbosity,
}

impl LauncherExecutor {
    /// `timeout_secs` of 0 waits indefinitely.
    pub fn new(launcher: Vec<String>, timeout_secs: u64, verbosity: Verbosity) -> Self {
        Self {
            launcher,
            timeout_secs,
            verbosity,
        }
    }

    fn write_binary(dir: &Path, name: &str, bytes: &[u8]) -> HarnessResult<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Stage binaries, tensors and the manifest; returns the manifest path.
    fn stage(
        &self,
        dir: &Path,
        pipeline: &PreparedPipeline,
        request: &ExecutionRequest<'_>,
    ) -> HarnessResult<PathBuf> {
        let mut kernels = Vec::with_capacity(pipeline.kernels.len());
        for k in &pipeline.kernels {
            kernels.push(KernelEntry {
                func_id: k.func_id,
                name: &k.name,
                core_type: k.core_type,
                binary: Self::write_binary(dir, &format!("kernel_{}.bin", k.func_id), &k.bytes)?,
            });
        }

        let tensor_order = if pipeline.tensor_order.is_empty() {
            request.inputs.names()
        } else {
            pipeline.tensor_order.clone()
        };

        let tensors = dir.join(TENSORS_FILE);
        std::fs::write(&tensors, serde_json::to_vec(request.inputs)?)?;

        let manifest = LaunchManifest {
            platform: pipeline.platform.name(),
            device_id: request.device_id,
            runtime: &pipeline.runtime_name,
            case: request.case_label,
            params: request.params,
            host_binary: Self::write_binary(dir, "host.bin", &pipeline.runtime.host.bytes)?,
            aicpu_binary: Self::write_binary(dir, "aicpu.bin", &pipeline.runtime.aicpu.bytes)?,
            aicore_binary: Self::write_binary(dir, "aicore.bin", &pipeline.runtime.aicore.bytes)?,
            orchestration_binary: Self::write_binary(dir, "orchestration.so", &pipeline.orchestration)?,
            entry_function: &pipeline.entry_function,
            kernels,
            runtime_config: &pipeline.runtime_config,
            tensor_order,
            tensors,
            outputs: dir.join(OUTPUTS_FILE),
        };

        let path = dir.join(MANIFEST_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(&manifest)?)?;
        Ok(path)
    }
}

#[async_trait]
impl PipelineExecutor for LauncherExecutor {
    async fn execute(
        &self,
        pipeline: &PreparedPipeline,
        request: ExecutionRequest<'_>,
    ) -> HarnessResult<TensorMap> {
        let workdir = tempfile::Builder::new().prefix("pto-launch-").tempdir()?;
        let manifest = self.stage(workdir.path(), pipeline, &request)?;

        let mut argv = self.launcher.clone();
        argv.push("--manifest".to_string());
        argv.push(manifest.display().to_string());

        info!(
            case = %request.case_label,
            device_id = request.device_id,
            platform = %pipeline.platform,
            "Launching pipeline"
        );
        let output = run_tool(
            "launch",
            &argv,
            self.timeout_secs,
            self.verbosity >= Verbosity::Verbose,
        )
        .await
        .map_err(HarnessError::from_core)?;
        debug!(duration_ms = output.duration_ms, exit_code = output.exit_code, "Launcher finished");

        if !output.success {
            return Err(HarnessError::execution(
                "launch",
                format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
            ));
        }

        let outputs_path = workdir.path().join(OUTPUTS_FILE);
        let raw = std::fs::read(&outputs_path).map_err(|e| {
            HarnessError::execution("launch", format!("no outputs written ({})", e))
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pto_core::{CompiledArtifact, TargetType};
    use pto_golden::Tensor;

    fn pipeline() -> PreparedPipeline {
        PreparedPipeline {
            platform: Platform::Simulator,
            runtime_name: "host_build_graph".to_string(),
            runtime: RuntimeArtifacts {
                host: CompiledArtifact::new(TargetType::Host, b"host".to_vec()),
                aicpu: CompiledArtifact::new(TargetType::Aicpu, b"aicpu".to_vec()),
                aicore: CompiledArtifact::new(TargetType::Aicore, b"aicore".to_vec()),
            },
            orchestration: b"orch".to_vec(),
            entry_function: "aicpu_orchestration_entry".to_string(),
            kernels: vec![KernelBinary {
                func_id: 0,
                name: "ADD".to_string(),
                core_type: CoreType::Aiv,
                bytes: b"k0".to_vec(),
            }],
            runtime_config: RuntimeConfig::default(),
            tensor_order: vec![],
        }
    }

    fn inputs() -> TensorMap {
        let mut map = TensorMap::new();
        map.insert("b", Tensor::f32(vec![2], vec![1.0, 2.0]).unwrap());
        map.insert("a", Tensor::zeros_f32(vec![2]));
        map
    }

    #[test]
    fn test_stage_writes_manifest_with_name_ordered_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let executor = LauncherExecutor::new(vec!["pto-launch".to_string()], 0, Verbosity::Silent);
        let params = ParamSet::default();
        let tensors = inputs();
        let request = ExecutionRequest {
            case_label: "case0",
            params: &params,
            device_id: 3,
            inputs: &tensors,
        };
        let manifest_path = executor.stage(dir.path(), &pipeline(), &request).unwrap();

        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(manifest_path).unwrap()).unwrap();
        assert_eq!(manifest["platform"], "a2a3sim");
        assert_eq!(manifest["device_id"], 3);
        assert_eq!(manifest["tensor_order"], serde_json::json!(["a", "b"]));
        assert_eq!(manifest["kernels"][0]["core_type"], "aiv");
        assert_eq!(std::fs::read(dir.path().join("aicore.bin")).unwrap(), b"aicore");

        let staged: TensorMap =
            serde_json::from_slice(&std::fs::read(dir.path().join(TENSORS_FILE)).unwrap()).unwrap();
        assert_eq!(staged, tensors);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launcher_failure_is_execution_error() {
        let executor = LauncherExecutor::new(vec!["false".to_string()], 10, Verbosity::Silent);
        let params = ParamSet::default();
        let tensors = inputs();
        let err = executor
            .execute(
                &pipeline(),
                ExecutionRequest {
                    case_label: "case0",
                    params: &params,
                    device_id: 0,
                    inputs: &tensors,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Execution { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launcher_that_writes_nothing_is_execution_error() {
        let executor = LauncherExecutor::new(vec!["true".to_string()], 10, Verbosity::Silent);
        let params = ParamSet::default();
        let tensors = inputs();
        let err = executor
            .execute(
                &pipeline(),
                ExecutionRequest {
                    case_label: "case0",
                    params: &params,
                    device_id: 0,
                    inputs: &tensors,
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no outputs written"));
    }
}
