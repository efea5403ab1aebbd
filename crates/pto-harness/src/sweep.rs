//! Batch validation of every discovered example.
//!
//! Examples run strictly one after another, each isolated in its own child
//! process (`pto run ...`) with a deadline. A failing or hung example never
//! stops the sweep.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use pto_core::process::run_isolated;
use pto_core::{ExampleRecord, Platform, Verbosity};

use crate::error::{HarnessError, HarnessResult};
use crate::report::{ExampleResult, ExampleStatus, SweepReport};

/// Per-example deadline when none is configured.
pub const DEFAULT_EXAMPLE_TIMEOUT_SECS: u64 = 600;

/// Runs one example to completion.
#[async_trait]
pub trait ExampleLauncher: Send + Sync {
    /// `Ok` when the example passed.
    async fn launch(&self, example: &ExampleRecord) -> HarnessResult<()>;
}

/// Settings forwarded to every child invocation.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub platform: Platform,
    pub device_id: Option<u32>,
    pub verbosity: Verbosity,
    /// Per-example deadline in seconds (0 = none).
    pub timeout_secs: u64,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            device_id: None,
            verbosity: Verbosity::default(),
            timeout_secs: DEFAULT_EXAMPLE_TIMEOUT_SECS,
        }
    }
}

/// Launches each example as
/// `<program> run -k .. -g .. -p .. -v .. --timeout-secs .. [-d ..]`.
///
/// The child leads its own process group; everything it started is killed
/// when it exits or its deadline passes, before the next example starts.
pub struct SubprocessLauncher {
    program: Vec<String>,
    settings: LaunchSettings,
}

impl SubprocessLauncher {
    /// `program` is the command prefix, usually the current executable.
    pub fn new(program: Vec<String>, settings: LaunchSettings) -> Self {
        Self { program, settings }
    }

    /// Launcher re-invoking the running binary.
    pub fn current_exe(settings: LaunchSettings) -> HarnessResult<Self> {
        let exe: PathBuf = std::env::current_exe()?;
        Ok(Self::new(vec![exe.display().to_string()], settings))
    }

    pub fn command_for(&self, example: &ExampleRecord) -> Vec<String> {
        let mut argv = self.program.clone();
        argv.extend([
            "run".to_string(),
            "-k".to_string(),
            example.kernels_dir.display().to_string(),
            "-g".to_string(),
            example.golden_path.display().to_string(),
            "-p".to_string(),
            self.settings.platform.name().to_string(),
            "-v".to_string(),
            self.settings.verbosity.level().to_string(),
            "--timeout-secs".to_string(),
            self.settings.timeout_secs.to_string(),
        ]);
        if let Some(device_id) = self.settings.device_id {
            argv.push("-d".to_string());
            argv.push(device_id.to_string());
        }
        argv
    }
}

#[async_trait]
impl ExampleLauncher for SubprocessLauncher {
    async fn launch(&self, example: &ExampleRecord) -> HarnessResult<()> {
        let argv = self.command_for(example);
        let output = run_isolated(&example.display_name(), &argv, self.settings.timeout_secs, true)
            .await
            .map_err(HarnessError::from_core)?;
        if output.success {
            Ok(())
        } else {
            Err(HarnessError::execution(
                example.display_name(),
                format!("exit code {}", output.exit_code),
            ))
        }
    }
}

type StartHook = Box<dyn Fn(&ExampleRecord) + Send + Sync>;

/// Sequential driver over discovered examples.
pub struct ExampleSweep {
    launcher: Arc<dyn ExampleLauncher>,
    on_start: Option<StartHook>,
}

impl ExampleSweep {
    pub fn new(launcher: Arc<dyn ExampleLauncher>) -> Self {
        Self {
            launcher,
            on_start: None,
        }
    }

    /// Called before each example is launched.
    pub fn on_start(mut self, hook: impl Fn(&ExampleRecord) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }

    /// Run every record in order and collect the verdicts.
    pub async fn run(&self, records: &[ExampleRecord]) -> SweepReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, examples = records.len(), "Starting example sweep");

        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let name = record.display_name();
            info!(example = %name, "Running example");
            if let Some(hook) = &self.on_start {
                hook(record);
            }
            let example_start = Instant::now();

            let status = match self.launcher.launch(record).await {
                Ok(()) => ExampleStatus::Passed,
                Err(HarnessError::Timeout { limit_secs, .. }) => {
                    error!(example = %name, limit_secs, "Example timed out");
                    ExampleStatus::TimedOut { limit_secs }
                }
                Err(e) => {
                    error!(example = %name, "FAILED: {}", e);
                    ExampleStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            results.push(ExampleResult {
                name,
                status,
                duration_ms: example_start.elapsed().as_millis() as u64,
            });
        }

        let report = SweepReport {
            run_id,
            started_at,
            results,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            passed = report.passed_count(),
            failed = report.failed_count(),
            "Example sweep finished"
        );
        report
    }
}
