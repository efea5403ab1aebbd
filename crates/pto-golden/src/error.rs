//! Error types for golden references.

/// Errors produced while generating inputs or computing golden outputs.
#[derive(Debug, thiserror::Error)]
pub enum GoldenError {
    #[error("no golden reference named '{name}'. Available: {}", .available.join(", "))]
    UnknownReference { name: String, available: Vec<String> },

    #[error("invalid parameters for {reference}: {reason}")]
    InvalidParams { reference: String, reason: String },

    #[error("tensor '{0}' is missing")]
    MissingTensor(String),

    #[error("tensor '{tensor}' has {actual} elements, expected {expected}")]
    LengthMismatch {
        tensor: String,
        expected: usize,
        actual: usize,
    },

    #[error("tensor '{tensor}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        tensor: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("tensor '{tensor}' has dtype {actual}, expected {expected}")]
    DtypeMismatch {
        tensor: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Input data violates a precondition of the algorithm.
    #[error("precondition violated: {0}")]
    Precondition(String),
}

/// Result type for golden operations.
pub type GoldenResult<T> = std::result::Result<T, GoldenError>;
