//! Harness error taxonomy.

use pto_core::PtoError;
use pto_golden::GoldenError;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Core(#[from] PtoError),

    #[error(transparent)]
    Golden(#[from] GoldenError),

    /// The pipeline or an example process ran but did not succeed.
    #[error("{operation} failed: {message}")]
    Execution { operation: String, message: String },

    #[error("{operation} timed out after {limit_secs}s")]
    Timeout { operation: String, limit_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn execution(operation: impl Into<String>, message: impl Into<String>) -> Self {
        HarnessError::Execution {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Lift a core error, keeping timeouts distinct.
    pub fn from_core(err: PtoError) -> Self {
        match err {
            PtoError::Timeout {
                operation,
                limit_secs,
            } => HarnessError::Timeout {
                operation,
                limit_secs,
            },
            other => HarnessError::Core(other),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HarnessError::Timeout { .. })
    }
}

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
