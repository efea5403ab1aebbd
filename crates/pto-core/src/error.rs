//! Error taxonomy for build orchestration and example discovery.

use std::path::PathBuf;

/// Errors produced by the build and discovery layers.
#[derive(Debug, thiserror::Error)]
pub enum PtoError {
    /// Missing or malformed build, kernel or golden configuration.
    #[error("configuration error in {}: {}", .path.display(), .reason)]
    Configuration { path: PathBuf, reason: String },

    /// A named runtime, file or directory does not exist.
    #[error("{} '{}' not found. Available: {}", .what, .name, format_available(.available))]
    NotFound {
        what: &'static str,
        name: String,
        available: Vec<String>,
    },

    /// A required file or directory is absent.
    #[error("{} not found: {}", .what, .path.display())]
    PathNotFound { what: &'static str, path: PathBuf },

    /// The external toolchain rejected a compile.
    #[error("compilation failed for {unit}: {message}")]
    CompileFailure { unit: String, message: String },

    /// An external process exceeded its deadline.
    #[error("{operation} timed out after {limit_secs}s")]
    Timeout {
        operation: String,
        limit_secs: u64,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PtoError {
    /// Shorthand for a configuration error on `path`.
    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PtoError::Configuration {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_path(what: &'static str, path: impl Into<PathBuf>) -> Self {
        PtoError::PathNotFound {
            what,
            path: path.into(),
        }
    }
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        "(none)".to_string()
    } else {
        available.join(", ")
    }
}

/// Result type for build and discovery operations.
pub type Result<T> = std::result::Result<T, PtoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_alternatives() {
        let err = PtoError::NotFound {
            what: "runtime",
            name: "missing_rt".to_string(),
            available: vec!["host_build_graph".to_string(), "tensormap".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("missing_rt"));
        assert!(msg.contains("host_build_graph, tensormap"));
    }

    #[test]
    fn test_not_found_without_alternatives() {
        let err = PtoError::NotFound {
            what: "runtime",
            name: "x".to_string(),
            available: vec![],
        };
        assert!(err.to_string().contains("(none)"));
    }

    #[test]
    fn test_compile_failure_names_target() {
        let err = PtoError::CompileFailure {
            unit: "aicpu".to_string(),
            message: "undefined symbol".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aicpu"));
        assert!(msg.contains("undefined symbol"));
    }

    #[test]
    fn test_configuration_error_names_path() {
        let err = PtoError::config("/tmp/build_config.toml", "missing [host] table");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/build_config.toml"));
        assert!(msg.contains("missing [host] table"));
    }
}
