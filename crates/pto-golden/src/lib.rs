//! PTO Golden
//!
//! Reference side of kernel validation:
//! - Tensor model shared with the pipeline executor
//! - Tolerance comparison with mismatch diagnostics
//! - `GoldenReference` contract and name-keyed registry
//! - Built-in references (paged attention, batched GEMM)

pub mod compare;
pub mod error;
pub mod kernels;
pub mod reference;
pub mod tensor;

pub use compare::{compare, Comparison, ElementMismatch, Tolerance};
pub use error::{GoldenError, GoldenResult};
pub use reference::{CaseCheck, GoldenCase, GoldenReference, ReferenceRegistry};
pub use tensor::{Tensor, TensorData, TensorMap};
