//! Host-side tensors exchanged between goldens and the pipeline executor.

use std::collections::BTreeMap;

use half::f16;
use serde::{Deserialize, Serialize};

use crate::error::{GoldenError, GoldenResult};

/// Flat element storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum TensorData {
    F32(Vec<f32>),
    F16(#[serde(with = "f16_values")] Vec<f16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl TensorData {
    pub fn dtype(&self) -> &'static str {
        match self {
            TensorData::F32(_) => "f32",
            TensorData::F16(_) => "f16",
            TensorData::I32(_) => "i32",
            TensorData::I64(_) => "i64",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F16(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A shaped, row-major tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    #[serde(flatten)]
    pub data: TensorData,
}

fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

impl Tensor {
    fn checked(shape: Vec<usize>, data: TensorData) -> GoldenResult<Self> {
        let expected = numel(&shape);
        if data.len() != expected {
            return Err(GoldenError::LengthMismatch {
                tensor: format!("<{:?}>", shape),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn f32(shape: Vec<usize>, values: Vec<f32>) -> GoldenResult<Self> {
        Self::checked(shape, TensorData::F32(values))
    }

    pub fn f16(shape: Vec<usize>, values: Vec<f16>) -> GoldenResult<Self> {
        Self::checked(shape, TensorData::F16(values))
    }

    pub fn i32(shape: Vec<usize>, values: Vec<i32>) -> GoldenResult<Self> {
        Self::checked(shape, TensorData::I32(values))
    }

    pub fn i64(shape: Vec<usize>, values: Vec<i64>) -> GoldenResult<Self> {
        Self::checked(shape, TensorData::I64(values))
    }

    /// Zero-initialized f32 tensor, the usual output placeholder.
    pub fn zeros_f32(shape: Vec<usize>) -> Self {
        let n = numel(&shape);
        Self {
            shape,
            data: TensorData::F32(vec![0.0; n]),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dtype(&self) -> &'static str {
        self.data.dtype()
    }

    /// Elements widened to f64. Lossy for i64 magnitudes above 2^53.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.data {
            TensorData::F32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::F16(v) => v.iter().map(|x| x.to_f64()).collect(),
            TensorData::I32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::I64(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }
}

/// Named tensors of one test case, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TensorMap(BTreeMap<String, Tensor>);

impl TensorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.0.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn require(&self, name: &str) -> GoldenResult<&Tensor> {
        self.0
            .get(name)
            .ok_or_else(|| GoldenError::MissingTensor(name.to_string()))
    }

    pub fn f32_slice(&self, name: &str) -> GoldenResult<&[f32]> {
        match &self.require(name)?.data {
            TensorData::F32(v) => Ok(v),
            other => Err(dtype_mismatch(name, "f32", other)),
        }
    }

    pub fn f16_slice(&self, name: &str) -> GoldenResult<&[f16]> {
        match &self.require(name)?.data {
            TensorData::F16(v) => Ok(v),
            other => Err(dtype_mismatch(name, "f16", other)),
        }
    }

    /// Half-precision tensor widened to f32.
    pub fn f16_to_f32(&self, name: &str) -> GoldenResult<Vec<f32>> {
        Ok(self.f16_slice(name)?.iter().map(|x| x.to_f32()).collect())
    }

    pub fn i32_slice(&self, name: &str) -> GoldenResult<&[i32]> {
        match &self.require(name)?.data {
            TensorData::I32(v) => Ok(v),
            other => Err(dtype_mismatch(name, "i32", other)),
        }
    }

    pub fn f32_slice_mut(&mut self, name: &str) -> GoldenResult<&mut [f32]> {
        let tensor = self
            .0
            .get_mut(name)
            .ok_or_else(|| GoldenError::MissingTensor(name.to_string()))?;
        match &mut tensor.data {
            TensorData::F32(v) => Ok(v),
            other => Err(dtype_mismatch(name, "f32", other)),
        }
    }

    /// Overwrite `name` in place; length must match.
    pub fn write_f32(&mut self, name: &str, values: &[f32]) -> GoldenResult<()> {
        let slot = self.f32_slice_mut(name)?;
        if slot.len() != values.len() {
            return Err(GoldenError::LengthMismatch {
                tensor: name.to_string(),
                expected: slot.len(),
                actual: values.len(),
            });
        }
        slot.copy_from_slice(values);
        Ok(())
    }
}

fn dtype_mismatch(name: &str, expected: &'static str, actual: &TensorData) -> GoldenError {
    GoldenError::DtypeMismatch {
        tensor: name.to_string(),
        expected,
        actual: actual.dtype(),
    }
}

/// Half-precision values travel as their exact f32 widening.
mod f16_values {
    use half::f16;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f16], serializer: S) -> Result<S::Ok, S::Error> {
        let wide: Vec<f32> = values.iter().map(|x| x.to_f32()).collect();
        wide.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f16>, D::Error> {
        let wide = Vec::<f32>::deserialize(deserializer)?;
        Ok(wide.into_iter().map(f16::from_f32).collect())
    }
}

impl FromIterator<(String, Tensor)> for TensorMap {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
