//! PTO Core - runtime build orchestration
//!
//! Provides:
//! - Discovery of runtime implementations and their three-target builds
//!   (aicore, aicpu, host) for hardware or simulator platforms
//! - Typed build, kernel and golden configuration files
//! - Discovery of runnable validation examples

pub mod artifact;
pub mod builder;
pub mod compiler;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fakes;
pub mod paths;
pub mod platform;
pub mod process;
pub mod registry;
pub mod telemetry;

pub use artifact::{CompiledArtifact, RuntimeArtifacts};
pub use builder::RuntimeBuilder;
pub use compiler::{SourceKind, TargetCompiler, ToolchainCompiler, ToolchainConfig};
pub use config::{
    BuildConfig, GoldenConfig, KernelConfig, KernelSpec, ParamSet, RuntimeConfig, TargetSpec,
};
pub use discovery::{
    DiscoveryReport, DiscoveryWarning, ExampleRecord, ExampleRegistry, MissingFile,
    SkippedExample, ValidatedExample,
};
pub use error::{PtoError, Result};
pub use platform::{CoreType, Platform, TargetType, Verbosity};
pub use registry::{default_project_root, RuntimeImplementation, RuntimeRegistry};
pub use telemetry::init_tracing;
