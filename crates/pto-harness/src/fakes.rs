//! In-memory executor fake (testing only)
//!
//! `ReplayExecutor` stands in for a device: it answers each case by running
//! the golden reference on the inputs, optionally perturbed or failed per
//! case label, and records what it was asked to run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use pto_golden::{GoldenReference, TensorData, TensorMap};

use crate::error::{HarnessError, HarnessResult};
use crate::executor::{ExecutionRequest, PipelineExecutor, PreparedPipeline};

/// How the fake answers one case.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayMode {
    /// Return the golden outputs.
    Faithful,
    /// Add `delta` to every element of `tensor`.
    Perturb { tensor: String, delta: f32 },
    /// Fail execution with this message.
    Fail(String),
    /// Report a launcher timeout.
    Timeout,
}

/// One recorded execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCase {
    pub case_label: String,
    pub device_id: u32,
    pub runtime_name: String,
    pub kernel_ids: Vec<u32>,
}

pub struct ReplayExecutor {
    reference: Arc<dyn GoldenReference>,
    modes: HashMap<String, ReplayMode>,
    calls: Mutex<Vec<ExecutedCase>>,
}

impl ReplayExecutor {
    pub fn new(reference: Arc<dyn GoldenReference>) -> Self {
        Self {
            reference,
            modes: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_case_mode(mut self, case_label: &str, mode: ReplayMode) -> Self {
        self.modes.insert(case_label.to_string(), mode);
        self
    }

    pub fn calls(&self) -> Vec<ExecutedCase> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineExecutor for ReplayExecutor {
    async fn execute(
        &self,
        pipeline: &PreparedPipeline,
        request: ExecutionRequest<'_>,
    ) -> HarnessResult<TensorMap> {
        self.calls.lock().unwrap().push(ExecutedCase {
            case_label: request.case_label.to_string(),
            device_id: request.device_id,
            runtime_name: pipeline.runtime_name.clone(),
            kernel_ids: pipeline.kernels.iter().map(|k| k.func_id).collect(),
        });

        let mode = self
            .modes
            .get(request.case_label)
            .cloned()
            .unwrap_or(ReplayMode::Faithful);

        let mut tensors = request.inputs.clone();
        match mode {
            ReplayMode::Fail(message) => return Err(HarnessError::execution("launch", message)),
            ReplayMode::Timeout => {
                return Err(HarnessError::Timeout {
                    operation: "launch".to_string(),
                    limit_secs: 1,
                })
            }
            ReplayMode::Faithful => {
                self.reference.compute_golden(&mut tensors, request.params)?;
            }
            ReplayMode::Perturb { tensor, delta } => {
                self.reference.compute_golden(&mut tensors, request.params)?;
                let shifted: Vec<f32> = match &tensors.require(&tensor)?.data {
                    TensorData::F32(values) => values.iter().map(|v| v + delta).collect(),
                    _ => return Err(HarnessError::execution("launch", "can only perturb f32 tensors")),
                };
                tensors.write_f32(&tensor, &shifted)?;
            }
        }
        Ok(tensors)
    }
}
