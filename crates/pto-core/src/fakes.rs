//! In-memory compiler fake (testing only)
//!
//! `RecordingCompiler` satisfies the [`TargetCompiler`] contract without a
//! toolchain: it records every call and returns a payload that encodes the
//! unit name and a global call counter, so reused output is detectable.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::compiler::{SourceKind, TargetCompiler};
use crate::error::{PtoError, Result};
use crate::platform::{Platform, TargetType};

/// One recorded compile invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileCall {
    Target {
        target: TargetType,
        include_dirs: Vec<PathBuf>,
        source_dirs: Vec<PathBuf>,
    },
    Source {
        kind: SourceKind,
        source: PathBuf,
    },
}

#[derive(Debug, Default)]
pub struct RecordingCompiler {
    platform: Platform,
    fail_on: Option<TargetType>,
    calls: Mutex<Vec<CompileCall>>,
}

impl RecordingCompiler {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            ..Self::default()
        }
    }

    /// Fail every compile of `target` with a CompileFailure.
    pub fn failing_on(mut self, target: TargetType) -> Self {
        self.fail_on = Some(target);
        self
    }

    pub fn calls(&self) -> Vec<CompileCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Targets compiled so far, in call order.
    pub fn targets(&self) -> Vec<TargetType> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                CompileCall::Target { target, .. } => Some(target),
                CompileCall::Source { .. } => None,
            })
            .collect()
    }

    fn record(&self, call: CompileCall) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        calls.len()
    }
}

#[async_trait]
impl TargetCompiler for RecordingCompiler {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn compile(
        &self,
        target: TargetType,
        include_dirs: &[PathBuf],
        source_dirs: &[PathBuf],
    ) -> Result<Vec<u8>> {
        let n = self.record(CompileCall::Target {
            target,
            include_dirs: include_dirs.to_vec(),
            source_dirs: source_dirs.to_vec(),
        });
        if self.fail_on == Some(target) {
            return Err(PtoError::CompileFailure {
                unit: target.name().to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(format!("{}:{}#{}", self.platform, target, n).into_bytes())
    }

    async fn compile_source(
        &self,
        kind: SourceKind,
        source: &Path,
        _include_dirs: &[PathBuf],
    ) -> Result<Vec<u8>> {
        let n = self.record(CompileCall::Source {
            kind,
            source: source.to_path_buf(),
        });
        Ok(format!("{}:{}#{}", self.platform, kind.name(), n).into_bytes())
    }
}
