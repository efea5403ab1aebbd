//! Single-example golden validation.
//!
//! Load both configs, build the runtime, compile orchestration and kernels
//! once, then run every case of the sweep: generate inputs, execute the
//! pipeline, compute the golden on a separate copy and compare each
//! declared output. A failing case does not stop the sweep.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use pto_core::{GoldenConfig, KernelConfig, RuntimeBuilder, RuntimeConfig, SourceKind};
use pto_golden::{CaseCheck, Comparison, GoldenCase, ReferenceRegistry, Tolerance};

use crate::error::{HarnessError, HarnessResult};
use crate::executor::{ExecutionRequest, KernelBinary, PipelineExecutor, PreparedPipeline};

/// Runtime used when neither the caller nor the kernel config names one.
pub const DEFAULT_RUNTIME: &str = "host_build_graph";

/// Pick the runtime: explicit choice, then `runtime_config.runtime`, then
/// [`DEFAULT_RUNTIME`].
pub fn resolve_runtime(explicit: Option<&str>, config: &RuntimeConfig) -> String {
    explicit
        .or(config.runtime.as_deref())
        .unwrap_or(DEFAULT_RUNTIME)
        .to_string()
}

/// Verdict of one case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Passed { comparisons: Vec<Comparison> },
    /// First output tensor that fell outside tolerance.
    Mismatch { comparison: Comparison },
    /// Input generation, execution or result retrieval failed.
    Error { message: String, timed_out: bool },
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, CaseOutcome::Passed { .. })
    }

    fn from_error(err: HarnessError) -> Self {
        CaseOutcome::Error {
            timed_out: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseResult {
    pub label: String,
    pub seed: u64,
    pub outcome: CaseOutcome,
    pub duration_ms: u64,
}

/// Result of validating one example across its sweep.
#[derive(Debug, Clone, Serialize)]
pub struct ExampleOutcome {
    pub run_id: String,
    pub runtime_name: String,
    pub reference: String,
    pub started_at: DateTime<Utc>,
    pub cases: Vec<CaseResult>,
    pub duration_ms: u64,
}

impl ExampleOutcome {
    /// True iff at least one case ran and every case passed.
    pub fn passed(&self) -> bool {
        !self.cases.is_empty() && self.cases.iter().all(|c| c.outcome.passed())
    }

    pub fn failed_cases(&self) -> impl Iterator<Item = &CaseResult> {
        self.cases.iter().filter(|c| !c.outcome.passed())
    }

    /// Reason for the first failing case, if any.
    pub fn failure_reason(&self) -> Option<String> {
        let case = self.failed_cases().next()?;
        let detail = match &case.outcome {
            CaseOutcome::Mismatch { comparison } => comparison.summary(),
            CaseOutcome::Error { message, .. } => message.clone(),
            CaseOutcome::Passed { .. } => return None,
        };
        Some(format!("{}: {}", case.label, detail))
    }
}

/// Validates examples against their golden references.
pub struct GoldenHarness {
    builder: RuntimeBuilder,
    executor: Arc<dyn PipelineExecutor>,
    references: ReferenceRegistry,
    device_id: u32,
    runtime: Option<String>,
    case_filter: Option<String>,
}

impl GoldenHarness {
    pub fn new(builder: RuntimeBuilder, executor: Arc<dyn PipelineExecutor>) -> Self {
        Self {
            builder,
            executor,
            references: ReferenceRegistry::with_builtins(),
            device_id: 0,
            runtime: None,
            case_filter: None,
        }
    }

    pub fn with_references(mut self, references: ReferenceRegistry) -> Self {
        self.references = references;
        self
    }

    pub fn with_device_id(mut self, device_id: u32) -> Self {
        self.device_id = device_id;
        self
    }

    /// Force a runtime instead of the kernel config's choice.
    pub fn with_runtime(mut self, runtime: Option<String>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Run only the case with this label.
    pub fn with_case(mut self, case: Option<String>) -> Self {
        self.case_filter = case;
        self
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Validate the example described by `kernels_dir` and `golden_path`.
    ///
    /// Load, build and compile failures abort with an error. Per-case
    /// failures are collected in the returned outcome.
    pub async fn run(&self, kernels_dir: &Path, golden_path: &Path) -> HarnessResult<ExampleOutcome> {
        let started_at = Utc::now();
        let start = Instant::now();

        let kernel_config = KernelConfig::load_from_dir(kernels_dir)?;
        let mut golden = GoldenConfig::load(golden_path)?;
        if let Some(case) = &self.case_filter {
            golden.select_case(case)?;
        }
        let reference = self.references.get(&golden.reference)?;

        let runtime_name = resolve_runtime(self.runtime.as_deref(), &kernel_config.runtime_config);
        let pipeline = self
            .prepare(kernels_dir, &kernel_config, &golden, &runtime_name)
            .await?;

        let base_seed = golden.seed.unwrap_or_else(rand::random::<u64>);
        let tolerance = Tolerance::new(golden.rtol, golden.atol);

        let mut cases = Vec::new();
        for (index, params) in golden.sweep().into_iter().enumerate() {
            let label = params.label(index);
            let seed = base_seed.wrapping_add(index as u64);
            let case_start = Instant::now();

            let outcome = match GoldenCase::prepare(
                reference.as_ref(),
                label.clone(),
                params,
                &golden.outputs,
                tolerance,
                seed,
            ) {
                Ok(case) => self.run_case(&pipeline, &case).await,
                Err(e) => CaseOutcome::from_error(e.into()),
            };

            match &outcome {
                CaseOutcome::Passed { .. } => info!(case = %label, "Case passed"),
                CaseOutcome::Mismatch { comparison } => {
                    warn!(case = %label, "Case failed: {}", comparison.summary())
                }
                CaseOutcome::Error { message, .. } => error!(case = %label, "Case error: {}", message),
            }

            cases.push(CaseResult {
                label,
                seed,
                outcome,
                duration_ms: case_start.elapsed().as_millis() as u64,
            });
        }

        Ok(ExampleOutcome {
            run_id: Uuid::new_v4().to_string(),
            runtime_name,
            reference: golden.reference,
            started_at,
            cases,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Build the runtime and compile orchestration plus every kernel.
    pub async fn prepare(
        &self,
        kernels_dir: &Path,
        kernel_config: &KernelConfig,
        golden: &GoldenConfig,
        runtime_name: &str,
    ) -> HarnessResult<PreparedPipeline> {
        let runtime = self.builder.build(runtime_name).await?;
        let compiler = self.builder.compiler();
        let include_dirs: Vec<PathBuf> = vec![kernels_dir.to_path_buf()];

        info!(source = %kernel_config.orchestration.source.display(), "Compiling orchestration");
        let orchestration = compiler
            .compile_source(
                SourceKind::Orchestration,
                &kernel_config.orchestration.source,
                &include_dirs,
            )
            .await?;

        let mut kernels = Vec::with_capacity(kernel_config.kernels.len());
        for spec in kernel_config.dispatch_table() {
            info!(func_id = spec.func_id, kernel = %spec.name, core_type = spec.core_type.name(), "Compiling kernel");
            let bytes = compiler
                .compile_source(SourceKind::Kernel(spec.core_type), &spec.source, &include_dirs)
                .await?;
            kernels.push(KernelBinary {
                func_id: spec.func_id,
                name: spec.name.clone(),
                core_type: spec.core_type,
                bytes,
            });
        }

        Ok(PreparedPipeline {
            platform: self.builder.platform(),
            runtime_name: runtime_name.to_string(),
            runtime,
            orchestration,
            entry_function: kernel_config.orchestration.entry_function.clone(),
            kernels,
            runtime_config: kernel_config.runtime_config.clone(),
            tensor_order: golden.tensor_order.clone(),
        })
    }

    async fn run_case(&self, pipeline: &PreparedPipeline, case: &GoldenCase) -> CaseOutcome {
        if let Some(unknown) = pipeline
            .tensor_order
            .iter()
            .find(|name| !case.inputs.contains(name.as_str()))
        {
            return CaseOutcome::Error {
                message: format!("tensor_order names unknown tensor '{}'", unknown),
                timed_out: false,
            };
        }

        let request = ExecutionRequest {
            case_label: &case.label,
            params: &case.params,
            device_id: self.device_id,
            inputs: &case.inputs,
        };
        let actual = match self.executor.execute(pipeline, request).await {
            Ok(actual) => actual,
            Err(e) => return CaseOutcome::from_error(e),
        };

        match case.check(&actual) {
            Ok(CaseCheck::Passed(comparisons)) => CaseOutcome::Passed { comparisons },
            Ok(CaseCheck::Failed(comparison)) => CaseOutcome::Mismatch { comparison },
            Err(e) => CaseOutcome::from_error(e.into()),
        }
    }
}
