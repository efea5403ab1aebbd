//! Paged attention golden: block-wise online softmax over a paged KV cache.
//!
//! Keys and values live in fixed-size physical blocks; each batch entry owns
//! a row of the block table naming the blocks that hold its context, in
//! order. For every head tile the valid blocks are visited one at a time and
//! folded into a running max `m`, sum `l` and unnormalized output `o`:
//!
//! ```text
//! m' = max(m, m_b)   α = exp(m - m')   β = exp(m_b - m')
//! l' = α·l + β·l_b   o' = α·o + β·o_b
//! ```
//!
//! After the last block, `o / l` is the attention output.
//!
//! Query, key and value tensors are fp16. Arithmetic runs in f32, except that
//! the block weights `exp(s - m_b)` are rounded to fp16 before they enter `l_b`
//! and `o_b`, the precision the device kernel multiplies with.

use half::f16;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use pto_core::ParamSet;

use crate::error::{GoldenError, GoldenResult};
use crate::reference::{decode_params, GoldenReference};
use crate::tensor::{Tensor, TensorMap};

/// Maximum number of query heads processed together.
pub const HEAD_TILE: usize = 128;

pub const RTOL: f64 = 1e-2;
pub const ATOL: f64 = 1e-2;

/// Argument order of the orchestration entry point.
pub const TENSOR_ORDER: [&str; 7] = [
    "query",
    "key_cache",
    "value_cache",
    "block_table",
    "context_lens",
    "out",
    "config",
];

/// Shape parameters of one paged attention case.
///
/// Missing fields fall back to the single-block 16x16 configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PagedAttentionParams {
    pub batch: usize,
    pub num_heads: usize,
    pub kv_head_num: usize,
    pub head_dim: usize,
    pub block_size: usize,
    pub context_len: usize,
    pub max_model_len: usize,
    pub scale: f32,
}

impl Default for PagedAttentionParams {
    fn default() -> Self {
        Self {
            batch: 1,
            num_heads: 16,
            kv_head_num: 1,
            head_dim: 16,
            block_size: 16,
            context_len: 16,
            max_model_len: 256,
            scale: 1.0,
        }
    }
}

impl PagedAttentionParams {
    pub fn max_blocks_per_req(&self) -> usize {
        self.max_model_len / self.block_size
    }

    /// Blocks needed to hold `context_len` tokens.
    pub fn valid_blocks(&self) -> usize {
        self.context_len.div_ceil(self.block_size)
    }

    pub fn total_blocks(&self) -> usize {
        self.batch * self.valid_blocks()
    }

    pub fn validate(&self) -> GoldenResult<()> {
        let invalid = invalid_params;
        for (field, value) in [
            ("batch", self.batch),
            ("num_heads", self.num_heads),
            ("head_dim", self.head_dim),
            ("block_size", self.block_size),
            ("context_len", self.context_len),
        ] {
            if value == 0 {
                return Err(invalid(format!("{} must be positive", field)));
            }
        }
        if self.kv_head_num != 1 {
            return Err(invalid(format!(
                "only kv_head_num = 1 is supported, got {}",
                self.kv_head_num
            )));
        }
        if self.valid_blocks() > self.max_blocks_per_req() {
            return Err(invalid(format!(
                "context_len {} needs {} blocks but max_model_len {} allows {}",
                self.context_len,
                self.valid_blocks(),
                self.max_model_len,
                self.max_blocks_per_req()
            )));
        }
        if !self.scale.is_finite() {
            return Err(invalid(format!("scale must be finite, got {}", self.scale)));
        }
        if i32::try_from(self.context_len).is_err() {
            return Err(invalid(format!(
                "context_len {} does not fit an i32 context length",
                self.context_len
            )));
        }
        let total_blocks = self
            .batch
            .checked_mul(self.valid_blocks())
            .ok_or_else(|| invalid("batch * valid blocks overflows".to_string()))?;
        if i32::try_from(total_blocks).is_err() {
            return Err(invalid(format!(
                "{} physical blocks cannot be indexed by an i32 block table",
                total_blocks
            )));
        }
        self.sizes().map(|_| ())
    }

    /// Element counts of the query, block table and each KV cache, checked
    /// for overflow.
    pub fn sizes(&self) -> GoldenResult<TensorSizes> {
        let product = |what: &str, dims: &[usize]| {
            dims.iter()
                .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
                .ok_or_else(|| invalid_params(format!("{} element count overflows", what)))
        };
        let total_blocks = product("block", &[self.batch, self.valid_blocks()])?;
        Ok(TensorSizes {
            query: product("query", &[self.batch, self.num_heads, self.head_dim])?,
            block_table: product("block_table", &[self.batch, self.max_blocks_per_req()])?,
            cache: product(
                "kv cache",
                &[total_blocks, self.block_size, self.kv_head_num, self.head_dim],
            )?,
        })
    }

    /// Runtime config vector read by the orchestration.
    pub fn config_vector(&self) -> Vec<i64> {
        vec![
            self.batch as i64,
            self.num_heads as i64,
            self.kv_head_num as i64,
            self.head_dim as i64,
            self.block_size as i64,
            self.max_blocks_per_req() as i64,
            self.scale.to_bits() as i64,
        ]
    }
}

/// Flattened lengths derived from [`PagedAttentionParams`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorSizes {
    pub query: usize,
    pub block_table: usize,
    pub cache: usize,
}

fn invalid_params(reason: String) -> GoldenError {
    GoldenError::InvalidParams {
        reference: PagedAttention::NAME.to_string(),
        reason,
    }
}

/// Borrowed, flattened inputs of [`paged_attention`].
#[derive(Debug, Clone, Copy)]
pub struct PagedAttentionInputs<'a> {
    /// `(batch, num_heads, head_dim)`
    pub query: &'a [f32],
    /// `(total_blocks, block_size, head_dim)`
    pub key_cache: &'a [f32],
    pub value_cache: &'a [f32],
    /// `(batch, max_blocks_per_req)`
    pub block_table: &'a [i32],
    /// `(batch,)`
    pub context_lens: &'a [i32],
    pub batch: usize,
    pub num_heads: usize,
    pub head_dim: usize,
    pub block_size: usize,
    pub max_blocks_per_req: usize,
    pub scale: f32,
}

/// Softmax statistics of one KV block for a tile of query rows.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPartial {
    /// Row max of the scores.
    pub m: Vec<f32>,
    /// Row sum of the fp16-rounded weights `exp(s - m)`.
    pub l: Vec<f32>,
    /// Weights `@ V`, `rows x head_dim`.
    pub o: Vec<f32>,
}

impl BlockPartial {
    /// Scores the `rows x d` query tile against `valid_len` keys.
    pub fn compute(q: &[f32], k: &[f32], v: &[f32], rows: usize, d: usize, valid_len: usize, scale: f32) -> Self {
        let mut m = vec![f32::NEG_INFINITY; rows];
        let mut l = vec![0.0f32; rows];
        let mut o = vec![0.0f32; rows * d];
        let mut scores = vec![0.0f32; valid_len];

        for r in 0..rows {
            let q_row = &q[r * d..(r + 1) * d];
            for (j, s) in scores.iter_mut().enumerate() {
                *s = dot(q_row, &k[j * d..(j + 1) * d]) * scale;
            }
            let row_max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let acc = &mut o[r * d..(r + 1) * d];
            let mut sum = 0.0f32;
            for (j, &s) in scores.iter().enumerate() {
                let p = f16::from_f32((s - row_max).exp()).to_f32();
                sum += p;
                for (a, &vj) in acc.iter_mut().zip(&v[j * d..(j + 1) * d]) {
                    *a += p * vj;
                }
            }
            m[r] = row_max;
            l[r] = sum;
        }
        Self { m, l, o }
    }
}

/// Running online-softmax state for a tile of query rows.
#[derive(Debug, Clone)]
pub struct OnlineSoftmax {
    head_dim: usize,
    state: Option<BlockPartial>,
}

impl OnlineSoftmax {
    pub fn new(head_dim: usize) -> Self {
        Self {
            head_dim,
            state: None,
        }
    }

    /// Fold one block into the running state.
    pub fn merge(&mut self, block: BlockPartial) {
        let Some(acc) = self.state.as_mut() else {
            self.state = Some(block);
            return;
        };
        let d = self.head_dim;
        for r in 0..acc.m.len() {
            let m_new = acc.m[r].max(block.m[r]);
            let alpha = (acc.m[r] - m_new).exp();
            let beta = (block.m[r] - m_new).exp();
            acc.l[r] = alpha * acc.l[r] + beta * block.l[r];
            for (o, &ob) in acc.o[r * d..(r + 1) * d].iter_mut().zip(&block.o[r * d..(r + 1) * d]) {
                *o = alpha * *o + beta * ob;
            }
            acc.m[r] = m_new;
        }
    }

    /// Normalized output rows; `None` when no block was merged.
    pub fn finish(self) -> Option<Vec<f32>> {
        let d = self.head_dim;
        self.state.map(|mut acc| {
            for (r, &l) in acc.l.iter().enumerate() {
                for o in &mut acc.o[r * d..(r + 1) * d] {
                    *o /= l;
                }
            }
            acc.o
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn check_len(tensor: &str, actual: usize, expected: usize) -> GoldenResult<()> {
    if actual != expected {
        return Err(GoldenError::LengthMismatch {
            tensor: tensor.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Paged attention with online softmax. Returns `(batch * num_heads, head_dim)`
/// flattened.
pub fn paged_attention(inputs: &PagedAttentionInputs<'_>) -> GoldenResult<Vec<f32>> {
    let d = inputs.head_dim;
    let block_elems = inputs.block_size * d;
    if block_elems == 0 {
        return Err(GoldenError::Precondition(
            "block_size and head_dim must be positive".to_string(),
        ));
    }

    check_len("query", inputs.query.len(), inputs.batch * inputs.num_heads * d)?;
    check_len("value_cache", inputs.value_cache.len(), inputs.key_cache.len())?;
    check_len(
        "block_table",
        inputs.block_table.len(),
        inputs.batch * inputs.max_blocks_per_req,
    )?;
    check_len("context_lens", inputs.context_lens.len(), inputs.batch)?;
    if inputs.key_cache.len() % block_elems != 0 {
        return Err(GoldenError::Precondition(format!(
            "key_cache length {} is not a multiple of block_size * head_dim = {}",
            inputs.key_cache.len(),
            block_elems
        )));
    }
    let total_blocks = inputs.key_cache.len() / block_elems;

    let mut out = vec![0.0f32; inputs.batch * inputs.num_heads * d];
    let q_tile = inputs.num_heads.min(HEAD_TILE);

    for b in 0..inputs.batch {
        let cur_seq = inputs.context_lens[b];
        if cur_seq <= 0 {
            return Err(GoldenError::Precondition(format!(
                "batch {} has context length {}",
                b, cur_seq
            )));
        }
        let cur_seq = cur_seq as usize;
        let blocks = cur_seq.div_ceil(inputs.block_size);
        if blocks > inputs.max_blocks_per_req {
            return Err(GoldenError::Precondition(format!(
                "batch {} needs {} blocks but the block table holds {}",
                b, blocks, inputs.max_blocks_per_req
            )));
        }
        let table_row = &inputs.block_table[b * inputs.max_blocks_per_req..][..blocks];

        for offset in (0..inputs.num_heads).step_by(q_tile) {
            let rows = q_tile.min(inputs.num_heads - offset);
            let base = b * inputs.num_heads + offset;
            let qi = &inputs.query[base * d..(base + rows) * d];

            let mut softmax = OnlineSoftmax::new(d);
            for (bn, &block_idx) in table_row.iter().enumerate() {
                if block_idx < 0 || block_idx as usize >= total_blocks {
                    return Err(GoldenError::Precondition(format!(
                        "batch {} block {} maps to physical block {} outside [0, {})",
                        b, bn, block_idx, total_blocks
                    )));
                }
                let start = block_idx as usize * block_elems;
                let valid_len = inputs.block_size.min(cur_seq - bn * inputs.block_size);
                let kj = &inputs.key_cache[start..start + valid_len * d];
                let vj = &inputs.value_cache[start..start + valid_len * d];
                softmax.merge(BlockPartial::compute(qi, kj, vj, rows, d, valid_len, inputs.scale));
            }

            let tile_out = softmax.finish().ok_or_else(|| {
                GoldenError::Precondition(format!("batch {} has no valid blocks", b))
            })?;
            out[base * d..(base + rows) * d].copy_from_slice(&tile_out);
        }
    }
    Ok(out)
}

/// The `paged_attention` golden reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct PagedAttention;

impl PagedAttention {
    pub const NAME: &'static str = "paged_attention";

    fn params(params: &ParamSet) -> GoldenResult<PagedAttentionParams> {
        let p: PagedAttentionParams = decode_params(Self::NAME, params)?;
        p.validate()?;
        Ok(p)
    }
}

impl GoldenReference for PagedAttention {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn generate_inputs(&self, params: &ParamSet, rng: &mut dyn RngCore) -> GoldenResult<TensorMap> {
        let p = Self::params(params)?;
        let sizes = p.sizes()?;
        let max_blocks = p.max_blocks_per_req();
        let total_blocks = p.total_blocks();
        let block_bound = i32::try_from(total_blocks.max(1))
            .map_err(|_| invalid_params(format!("{} physical blocks exceed i32", total_blocks)))?;
        let context_len = i32::try_from(p.context_len)
            .map_err(|_| invalid_params(format!("context_len {} exceeds i32", p.context_len)))?;

        let block_table: Vec<i32> = (0..sizes.block_table)
            .map(|_| rng.gen_range(0..block_bound))
            .collect();
        let mut half_values = |count: usize, draw: fn(f32) -> f32| -> Vec<f16> {
            (0..count).map(|_| f16::from_f32(draw(rng.gen::<f32>()))).collect()
        };
        let query = half_values(sizes.query, |u| u - 0.5);
        let key_cache = half_values(sizes.cache, |u| u - 0.5);
        let value_cache = half_values(sizes.cache, |u| u * 2.0 - 1.0);

        let cache_shape = vec![total_blocks, p.block_size, p.kv_head_num, p.head_dim];
        let mut tensors = TensorMap::new();
        tensors.insert("query", Tensor::f16(vec![p.batch, p.num_heads, p.head_dim], query)?);
        tensors.insert("key_cache", Tensor::f16(cache_shape.clone(), key_cache)?);
        tensors.insert("value_cache", Tensor::f16(cache_shape, value_cache)?);
        tensors.insert("block_table", Tensor::i32(vec![p.batch, max_blocks], block_table)?);
        tensors.insert(
            "context_lens",
            Tensor::i32(vec![p.batch], vec![context_len; p.batch])?,
        );
        tensors.insert("out", Tensor::zeros_f32(vec![sizes.query]));
        tensors.insert("config", Tensor::i64(vec![7], p.config_vector())?);
        Ok(tensors)
    }

    fn compute_golden(&self, tensors: &mut TensorMap, params: &ParamSet) -> GoldenResult<()> {
        let p = Self::params(params)?;
        let query = tensors.f16_to_f32("query")?;
        let key_cache = tensors.f16_to_f32("key_cache")?;
        let value_cache = tensors.f16_to_f32("value_cache")?;
        let out = paged_attention(&PagedAttentionInputs {
            query: &query,
            key_cache: &key_cache,
            value_cache: &value_cache,
            block_table: tensors.i32_slice("block_table")?,
            context_lens: tensors.i32_slice("context_lens")?,
            batch: p.batch,
            num_heads: p.num_heads,
            head_dim: p.head_dim,
            block_size: p.block_size,
            max_blocks_per_req: p.max_blocks_per_req(),
            scale: p.scale,
        })?;
        tensors.write_f32("out", &out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Plain softmax attention over the gathered context (for verification only).
    fn direct_attention(inputs: &PagedAttentionInputs<'_>) -> Vec<f32> {
        let d = inputs.head_dim;
        let mut out = Vec::new();
        for b in 0..inputs.batch {
            let cur_seq = inputs.context_lens[b] as usize;
            let mut keys = Vec::new();
            let mut values = Vec::new();
            for t in 0..cur_seq {
                let block = inputs.block_table[b * inputs.max_blocks_per_req + t / inputs.block_size] as usize;
                let start = (block * inputs.block_size + t % inputs.block_size) * d;
                keys.push(&inputs.key_cache[start..start + d]);
                values.push(&inputs.value_cache[start..start + d]);
            }
            for h in 0..inputs.num_heads {
                let q = &inputs.query[(b * inputs.num_heads + h) * d..][..d];
                let scores: Vec<f64> = keys
                    .iter()
                    .map(|k| q.iter().zip(*k).map(|(x, y)| *x as f64 * *y as f64).sum::<f64>() * inputs.scale as f64)
                    .collect();
                let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let weights: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
                let total: f64 = weights.iter().sum();
                for i in 0..d {
                    let acc: f64 = weights.iter().zip(&values).map(|(w, v)| w * v[i] as f64).sum();
                    out.push((acc / total) as f32);
                }
            }
        }
        out
    }

    fn case(context_len: usize) -> ParamSet {
        let mut params = toml::Table::new();
        params.insert("context_len".to_string(), toml::Value::Integer(context_len as i64));
        ParamSet::named(format!("ctx{}", context_len), params)
    }

    fn run_case(params: &ParamSet, seed: u64) -> (TensorMap, Vec<f32>) {
        let golden = PagedAttention;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tensors = golden.generate_inputs(params, &mut rng).unwrap();
        golden.compute_golden(&mut tensors, params).unwrap();

        let p: PagedAttentionParams = params.decode().unwrap();
        let query = tensors.f16_to_f32("query").unwrap();
        let key_cache = tensors.f16_to_f32("key_cache").unwrap();
        let value_cache = tensors.f16_to_f32("value_cache").unwrap();
        let expected = direct_attention(&PagedAttentionInputs {
            query: &query,
            key_cache: &key_cache,
            value_cache: &value_cache,
            block_table: tensors.i32_slice("block_table").unwrap(),
            context_lens: tensors.i32_slice("context_lens").unwrap(),
            batch: p.batch,
            num_heads: p.num_heads,
            head_dim: p.head_dim,
            block_size: p.block_size,
            max_blocks_per_req: p.max_blocks_per_req(),
            scale: p.scale,
        });
        (tensors, expected)
    }

    fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!(
                (a - e).abs() <= tol + tol * e.abs(),
                "index {}: {} vs {}",
                i,
                a,
                e
            );
        }
    }

    #[test]
    fn test_single_block_matches_direct_softmax() {
        let (tensors, expected) = run_case(&case(16), 1);
        assert_close(tensors.f32_slice("out").unwrap(), &expected, 1e-2);
    }

    #[test]
    fn test_four_blocks_match_concatenated_softmax() {
        let (tensors, expected) = run_case(&case(64), 2);
        assert_eq!(tensors.i32_slice("block_table").unwrap().len(), 16);
        assert_close(tensors.f32_slice("out").unwrap(), &expected, 1e-2);
    }

    #[test]
    fn test_partial_last_block() {
        let (tensors, expected) = run_case(&case(20), 3);
        assert_close(tensors.f32_slice("out").unwrap(), &expected, 1e-2);
    }

    #[test]
    fn test_partial_head_tile() {
        let mut params = toml::Table::new();
        params.insert("num_heads".to_string(), toml::Value::Integer(130));
        params.insert("head_dim".to_string(), toml::Value::Integer(4));
        params.insert("context_len".to_string(), toml::Value::Integer(40));
        params.insert("batch".to_string(), toml::Value::Integer(2));
        let (tensors, expected) = run_case(&ParamSet::named("wide", params), 4);
        assert_close(tensors.f32_slice("out").unwrap(), &expected, 1e-2);
    }

    #[test]
    fn test_generated_layout() {
        let golden = PagedAttention;
        let mut rng = StdRng::seed_from_u64(9);
        let tensors = golden.generate_inputs(&case(64), &mut rng).unwrap();

        assert_eq!(tensors.require("key_cache").unwrap().shape, vec![4, 16, 1, 16]);
        assert_eq!(tensors.require("block_table").unwrap().shape, vec![1, 16]);
        assert!(tensors
            .i32_slice("block_table")
            .unwrap()
            .iter()
            .all(|&b| (0..4).contains(&b)));
        assert!(tensors.f32_slice("out").unwrap().iter().all(|&v| v == 0.0));
        assert!(tensors
            .f16_to_f32("value_cache")
            .unwrap()
            .iter()
            .all(|&v| (-1.0..=1.0).contains(&v)));
        for name in ["query", "key_cache", "value_cache"] {
            assert_eq!(tensors.require(name).unwrap().dtype(), "f16", "{name}");
        }

        let config = tensors.require("config").unwrap();
        assert_eq!(
            config.data,
            crate::tensor::TensorData::I64(vec![1, 16, 1, 16, 16, 16, 1065353216])
        );
        for name in TENSOR_ORDER {
            assert!(tensors.contains(name), "{name} missing");
        }
    }

    #[test]
    fn test_empty_params_use_single_block_defaults() {
        let p: PagedAttentionParams = ParamSet::default().decode().unwrap();
        assert_eq!(p, PagedAttentionParams::default());
        assert_eq!(p.valid_blocks(), 1);
    }

    #[test]
    fn test_rejects_zero_context_length() {
        let golden = PagedAttention;
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            golden.generate_inputs(&case(0), &mut rng),
            Err(GoldenError::InvalidParams { .. })
        ));

        let mut tensors = golden.generate_inputs(&case(16), &mut rng).unwrap();
        tensors.insert("context_lens", Tensor::i32(vec![1], vec![0]).unwrap());
        assert!(matches!(
            golden.compute_golden(&mut tensors, &case(16)),
            Err(GoldenError::Precondition(_))
        ));
    }

    #[test]
    fn test_rejects_grouped_kv_heads_and_oversized_context() {
        let mut params = toml::Table::new();
        params.insert("kv_head_num".to_string(), toml::Value::Integer(2));
        assert!(PagedAttention::params(&ParamSet::named("gqa", params)).is_err());
        assert!(PagedAttention::params(&case(257)).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_block_index() {
        let golden = PagedAttention;
        let mut rng = StdRng::seed_from_u64(5);
        let mut tensors = golden.generate_inputs(&case(16), &mut rng).unwrap();
        let mut table = vec![0i32; 16];
        table[0] = 1;
        tensors.insert("block_table", Tensor::i32(vec![1, 16], table).unwrap());
        assert!(matches!(
            golden.compute_golden(&mut tensors, &case(16)),
            Err(GoldenError::Precondition(msg)) if msg.contains("outside")
        ));
    }

    #[test]
    fn test_merge_is_order_independent_of_block_split() {
        // one block of 8 keys vs. two blocks of 4; fp16 weights differ per split
        let d = 2;
        let q = [0.3f32, -0.7, 1.1, 0.2];
        let k: Vec<f32> = (0..16).map(|i| (i as f32 * 0.37).sin()).collect();
        let v: Vec<f32> = (0..16).map(|i| (i as f32 * 0.11).cos()).collect();

        let mut whole = OnlineSoftmax::new(d);
        whole.merge(BlockPartial::compute(&q, &k, &v, 2, d, 8, 1.0));

        let mut split = OnlineSoftmax::new(d);
        split.merge(BlockPartial::compute(&q, &k[..8], &v[..8], 2, d, 4, 1.0));
        split.merge(BlockPartial::compute(&q, &k[8..], &v[8..], 2, d, 4, 1.0));

        assert_close(&split.finish().unwrap(), &whole.finish().unwrap(), 2e-3);
    }

    /// Single-block attention in f32 with the weights rounded through fp16.
    fn half_weight_attention(q: &[f32], k: &[f32], v: &[f32], heads: usize, d: usize, keys: usize, round: bool) -> Vec<f32> {
        let mut out = Vec::with_capacity(heads * d);
        for h in 0..heads {
            let q_row = &q[h * d..(h + 1) * d];
            let scores: Vec<f32> = (0..keys).map(|j| dot(q_row, &k[j * d..(j + 1) * d])).collect();
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0f32;
            let mut acc = vec![0.0f32; d];
            for (j, s) in scores.iter().enumerate() {
                let mut w = (s - max).exp();
                if round {
                    w = f16::from_f32(w).to_f32();
                }
                sum += w;
                for (a, &vj) in acc.iter_mut().zip(&v[j * d..(j + 1) * d]) {
                    *a += w * vj;
                }
            }
            out.extend(acc.iter().map(|a| a / sum));
        }
        out
    }

    #[test]
    fn test_golden_uses_half_precision_weights() {
        let golden = PagedAttention;
        let params = case(16);
        let mut rng = StdRng::seed_from_u64(11);
        let mut tensors = golden.generate_inputs(&params, &mut rng).unwrap();
        golden.compute_golden(&mut tensors, &params).unwrap();

        let block = tensors.i32_slice("block_table").unwrap()[0] as usize;
        assert_eq!(block, 0);
        let q = tensors.f16_to_f32("query").unwrap();
        let k = tensors.f16_to_f32("key_cache").unwrap();
        let v = tensors.f16_to_f32("value_cache").unwrap();
        let out = tensors.f32_slice("out").unwrap();

        let rounded = half_weight_attention(&q, &k, &v, 16, 16, 16, true);
        assert_eq!(out, rounded.as_slice());
        let full = half_weight_attention(&q, &k, &v, 16, 16, 16, false);
        assert_ne!(out, full.as_slice());
    }

    #[test]
    fn test_block_weights_are_rounded_to_half() {
        // exp(-0.1) is not an fp16 value
        let q = [1.0f32];
        let k = [0.0f32, -0.1];
        let v = [1.0f32, 1.0];
        let partial = BlockPartial::compute(&q, &k, &v, 1, 1, 2, 1.0);
        let w = f16::from_f32((-0.1f32).exp()).to_f32();
        assert_ne!(w, (-0.1f32).exp());
        assert_eq!(partial.l, vec![1.0 + w]);
        assert_eq!(partial.o, vec![1.0 + w]);
    }

    #[test]
    fn test_rejects_sizes_beyond_index_range() {
        let with = |pairs: &[(&str, i64)]| {
            let mut table = toml::Table::new();
            for (key, value) in pairs {
                table.insert(key.to_string(), toml::Value::Integer(*value));
            }
            PagedAttention::params(&ParamSet::named("big", table))
        };
        let too_long = 1i64 << 31;
        let err = with(&[("context_len", too_long), ("max_model_len", too_long), ("block_size", too_long)]).unwrap_err();
        assert!(matches!(&err, GoldenError::InvalidParams { reason, .. } if reason.contains("context_len")));

        let err = with(&[("batch", 1i64 << 31)]).unwrap_err();
        assert!(matches!(&err, GoldenError::InvalidParams { reason, .. } if reason.contains("physical blocks")));

        let err = with(&[("batch", 1i64 << 20), ("num_heads", 1i64 << 40), ("head_dim", 1i64 << 20)]).unwrap_err();
        assert!(matches!(&err, GoldenError::InvalidParams { reason, .. } if reason.contains("overflows")));
    }
}
