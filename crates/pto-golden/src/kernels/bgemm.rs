//! Batched tiled GEMM golden.
//!
//! `C[b] = A[b] @ B[b]`, accumulated one K tile at a time the way the
//! device pipeline splits it: a cube kernel computes the tile product `P`
//! and a vector kernel adds it into `C`.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use pto_core::ParamSet;

use crate::error::{GoldenError, GoldenResult};
use crate::reference::{decode_params, GoldenReference};
use crate::tensor::{Tensor, TensorMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BgemmParams {
    pub batch: usize,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub tile: usize,
}

impl Default for BgemmParams {
    fn default() -> Self {
        Self {
            batch: 1,
            m: 64,
            n: 64,
            k: 128,
            tile: 64,
        }
    }
}

impl BgemmParams {
    pub fn validate(&self) -> GoldenResult<()> {
        if self.tile == 0 {
            return Err(invalid("tile must be positive".to_string()));
        }
        for (field, value) in [("batch", self.batch), ("m", self.m), ("n", self.n), ("k", self.k)] {
            if value == 0 {
                return Err(invalid(format!("{} must be positive", field)));
            }
            if field != "batch" && value % self.tile != 0 {
                return Err(invalid(format!(
                    "{} = {} is not a multiple of tile {}",
                    field, value, self.tile
                )));
            }
        }
        Ok(())
    }
}

fn invalid(reason: String) -> GoldenError {
    GoldenError::InvalidParams {
        reference: Bgemm::NAME.to_string(),
        reason,
    }
}

/// Tiled batched matmul over row-major `A (batch, m, k)` and `B (batch, k, n)`.
pub fn bgemm(a: &[f32], b: &[f32], p: &BgemmParams) -> Vec<f32> {
    let (m, n, k) = (p.m, p.n, p.k);
    let mut c = vec![0.0f32; p.batch * m * n];
    let mut partial = vec![0.0f32; m * n];

    for batch in 0..p.batch {
        let a = &a[batch * m * k..][..m * k];
        let b = &b[batch * k * n..][..k * n];
        let c = &mut c[batch * m * n..][..m * n];

        for k0 in (0..k).step_by(p.tile) {
            partial.iter_mut().for_each(|x| *x = 0.0);
            for i in 0..m {
                for kk in k0..k0 + p.tile {
                    let a_ik = a[i * k + kk];
                    for (acc, &b_kj) in partial[i * n..(i + 1) * n].iter_mut().zip(&b[kk * n..(kk + 1) * n]) {
                        *acc += a_ik * b_kj;
                    }
                }
            }
            for (acc, &x) in c.iter_mut().zip(&partial) {
                *acc += x;
            }
        }
    }
    c
}

/// The `bgemm` golden reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bgemm;

impl Bgemm {
    pub const NAME: &'static str = "bgemm";

    fn params(params: &ParamSet) -> GoldenResult<BgemmParams> {
        let p: BgemmParams = decode_params(Self::NAME, params)?;
        p.validate()?;
        Ok(p)
    }
}

impl GoldenReference for Bgemm {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn generate_inputs(&self, params: &ParamSet, rng: &mut dyn RngCore) -> GoldenResult<TensorMap> {
        let p = Self::params(params)?;
        let a: Vec<f32> = (0..p.batch * p.m * p.k).map(|_| rng.gen::<f32>() - 0.5).collect();
        let b: Vec<f32> = (0..p.batch * p.k * p.n).map(|_| rng.gen::<f32>() - 0.5).collect();

        let mut tensors = TensorMap::new();
        tensors.insert("A", Tensor::f32(vec![p.batch, p.m, p.k], a)?);
        tensors.insert("B", Tensor::f32(vec![p.batch, p.k, p.n], b)?);
        tensors.insert("C", Tensor::zeros_f32(vec![p.batch, p.m, p.n]));
        Ok(tensors)
    }

    fn compute_golden(&self, tensors: &mut TensorMap, params: &ParamSet) -> GoldenResult<()> {
        let p = Self::params(params)?;
        let c = bgemm(tensors.f32_slice("A")?, tensors.f32_slice("B")?, &p);
        tensors.write_f32("C", &c)
    }
}
