//! Elementwise tolerance comparison of actual vs. expected tensors.
//!
//! An element passes when `|actual - expected| <= atol + rtol * |expected|`.
//! Exactly equal elements (including matching NaNs and infinities) always
//! pass, so comparing a tensor against itself with zero tolerances passes.
//! Integer tensors are compared exactly, without widening to f64.

use serde::{Deserialize, Serialize};

use crate::error::{GoldenError, GoldenResult};
use crate::tensor::{Tensor, TensorData};

/// Number of offending indices kept in a report.
pub const MAX_REPORTED_MISMATCHES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Tolerance {
    pub fn new(rtol: f64, atol: f64) -> Self {
        Self { rtol, atol }
    }

    pub fn exact() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn accepts(&self, actual: f64, expected: f64) -> bool {
        if actual == expected || (actual.is_nan() && expected.is_nan()) {
            return true;
        }
        (actual - expected).abs() <= self.atol + self.rtol * expected.abs()
    }
}

/// One out-of-tolerance element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementMismatch {
    pub index: usize,
    pub actual: f64,
    pub expected: f64,
}

/// Result of comparing one tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub tensor: String,
    pub total: usize,
    pub mismatch_count: usize,
    /// First offending elements, at most [`MAX_REPORTED_MISMATCHES`].
    pub first_mismatches: Vec<ElementMismatch>,
    pub max_abs_diff: f64,
}

impl Comparison {
    pub fn passed(&self) -> bool {
        self.mismatch_count == 0
    }

    /// One-line diagnostic for reports and logs.
    pub fn summary(&self) -> String {
        if self.passed() {
            return format!(
                "{}: {} elements within tolerance (max diff {:.3e})",
                self.tensor, self.total, self.max_abs_diff
            );
        }
        let indices: Vec<String> = self
            .first_mismatches
            .iter()
            .map(|m| format!("[{}] actual={} expected={}", m.index, m.actual, m.expected))
            .collect();
        format!(
            "{}: {}/{} elements out of tolerance, max diff {:.3e}; first: {}",
            self.tensor,
            self.mismatch_count,
            self.total,
            self.max_abs_diff,
            indices.join(", ")
        )
    }
}

/// Compare flat value slices of equal length.
pub fn compare_values(
    tensor: &str,
    actual: &[f64],
    expected: &[f64],
    tolerance: Tolerance,
) -> GoldenResult<Comparison> {
    if actual.len() != expected.len() {
        return Err(GoldenError::LengthMismatch {
            tensor: tensor.to_string(),
            expected: expected.len(),
            actual: actual.len(),
        });
    }

    let mut mismatch_count = 0;
    let mut first_mismatches = Vec::new();
    let mut max_abs_diff = 0.0f64;

    for (index, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        let diff = (a - e).abs();
        if diff.is_finite() {
            max_abs_diff = max_abs_diff.max(diff);
        }
        if tolerance.accepts(a, e) {
            continue;
        }
        mismatch_count += 1;
        if first_mismatches.len() < MAX_REPORTED_MISMATCHES {
            first_mismatches.push(ElementMismatch {
                index,
                actual: a,
                expected: e,
            });
        }
    }

    Ok(Comparison {
        tensor: tensor.to_string(),
        total: expected.len(),
        mismatch_count,
        first_mismatches,
        max_abs_diff,
    })
}

/// Compare integer slices exactly; tolerances do not apply.
pub fn compare_integers(tensor: &str, actual: &[i64], expected: &[i64]) -> GoldenResult<Comparison> {
    if actual.len() != expected.len() {
        return Err(GoldenError::LengthMismatch {
            tensor: tensor.to_string(),
            expected: expected.len(),
            actual: actual.len(),
        });
    }

    let mut mismatch_count = 0;
    let mut first_mismatches = Vec::new();
    let mut max_abs_diff = 0u64;

    for (index, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        if a == e {
            continue;
        }
        max_abs_diff = max_abs_diff.max(a.abs_diff(e));
        mismatch_count += 1;
        if first_mismatches.len() < MAX_REPORTED_MISMATCHES {
            first_mismatches.push(ElementMismatch {
                index,
                actual: a as f64,
                expected: e as f64,
            });
        }
    }

    Ok(Comparison {
        tensor: tensor.to_string(),
        total: expected.len(),
        mismatch_count,
        first_mismatches,
        max_abs_diff: max_abs_diff as f64,
    })
}

fn widen(values: &[i32]) -> Vec<i64> {
    values.iter().map(|&v| i64::from(v)).collect()
}

/// Compare two tensors. Shapes must match exactly.
pub fn compare(
    tensor: &str,
    actual: &Tensor,
    expected: &Tensor,
    tolerance: Tolerance,
) -> GoldenResult<Comparison> {
    if actual.shape != expected.shape {
        return Err(GoldenError::ShapeMismatch {
            tensor: tensor.to_string(),
            expected: expected.shape.clone(),
            actual: actual.shape.clone(),
        });
    }
    match (&actual.data, &expected.data) {
        (TensorData::I64(a), TensorData::I64(e)) => compare_integers(tensor, a, e),
        (TensorData::I32(a), TensorData::I32(e)) => compare_integers(tensor, &widen(a), &widen(e)),
        (TensorData::I64(a), TensorData::I32(e)) => compare_integers(tensor, a, &widen(e)),
        (TensorData::I32(a), TensorData::I64(e)) => compare_integers(tensor, &widen(a), e),
        _ => compare_values(tensor, &actual.to_f64_vec(), &expected.to_f64_vec(), tolerance),
    }
}
