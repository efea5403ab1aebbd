//! Discovery of runtime implementations under `<root>/src/runtime/`.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::BUILD_CONFIG_FILE;
use crate::error::{PtoError, Result};

/// A discovered runtime implementation. Identity is its directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeImplementation {
    pub name: String,
    pub config_path: PathBuf,
}

/// Sorted set of runtimes found by one scan.
#[derive(Debug, Clone, Default)]
pub struct RuntimeRegistry {
    runtime_dir: PathBuf,
    runtimes: Vec<RuntimeImplementation>,
}

impl RuntimeRegistry {
    /// Scan immediate subdirectories of `runtime_dir` that contain a build
    /// configuration file. A missing `runtime_dir` yields an empty registry.
    pub fn scan(runtime_dir: &Path) -> Result<Self> {
        let mut runtimes = Vec::new();
        if runtime_dir.is_dir() {
            for entry in std::fs::read_dir(runtime_dir)? {
                let entry = entry?;
                let path = entry.path();
                let config_path = path.join(BUILD_CONFIG_FILE);
                if path.is_dir() && config_path.is_file() {
                    runtimes.push(RuntimeImplementation {
                        name: entry.file_name().to_string_lossy().to_string(),
                        config_path,
                    });
                }
            }
        } else {
            debug!(dir = %runtime_dir.display(), "Runtime directory does not exist");
        }
        runtimes.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            runtime_dir: runtime_dir.to_path_buf(),
            runtimes,
        })
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn names(&self) -> Vec<String> {
        self.runtimes.iter().map(|r| r.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuntimeImplementation> {
        self.runtimes.iter()
    }

    /// Look up a runtime; NotFound lists every known name.
    pub fn get(&self, name: &str) -> Result<&RuntimeImplementation> {
        self.runtimes
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| PtoError::NotFound {
                what: "runtime",
                name: name.to_string(),
                available: self.names(),
            })
    }
}

/// Project root: `PTO_PROJECT_ROOT`, else the current directory.
pub fn default_project_root() -> PathBuf {
    std::env::var_os("PTO_PROJECT_ROOT")
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Runtime directory inside a project root.
pub fn runtime_dir_for(root: &Path) -> PathBuf {
    root.join("src").join("runtime")
}
