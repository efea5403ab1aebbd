//! PTO Harness
//!
//! Runs compiled kernel pipelines against golden references:
//! - Pipeline executor interface and launcher-backed implementation
//! - Single-example validation across a parameter sweep
//! - Sequential batch sweeps with per-example deadlines and a summary report

pub mod error;
pub mod executor;
pub mod fakes;
pub mod harness;
pub mod report;
pub mod sweep;

pub use error::{HarnessError, HarnessResult};
pub use executor::{
    ExecutionRequest, KernelBinary, LauncherExecutor, PipelineExecutor, PreparedPipeline,
};
pub use harness::{
    resolve_runtime, CaseOutcome, CaseResult, ExampleOutcome, GoldenHarness, DEFAULT_RUNTIME,
};
pub use report::{ExampleResult, ExampleStatus, SweepReport};
pub use sweep::{
    ExampleLauncher, ExampleSweep, LaunchSettings, SubprocessLauncher,
    DEFAULT_EXAMPLE_TIMEOUT_SECS,
};
