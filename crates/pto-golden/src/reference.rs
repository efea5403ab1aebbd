//! The golden reference contract and the registry of implementations.
//!
//! A golden produces deterministic inputs for a parameter set and computes
//! the expected outputs in place. Examples pick one by name in their
//! `golden.toml`; the harness never runs example-supplied code.

use std::collections::BTreeMap;
use std::sync::Arc;

use pto_core::ParamSet;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::compare::{compare, Comparison, Tolerance};
use crate::error::{GoldenError, GoldenResult};
use crate::kernels::{Bgemm, PagedAttention};
use crate::tensor::TensorMap;

/// An independently computed expected-output implementation.
pub trait GoldenReference: Send + Sync {
    /// Registry name, matched against `reference` in `golden.toml`.
    fn name(&self) -> &'static str;

    /// Generate inputs plus zero-initialized outputs.
    ///
    /// Must be deterministic for a given RNG state.
    fn generate_inputs(&self, params: &ParamSet, rng: &mut dyn RngCore) -> GoldenResult<TensorMap>;

    /// Write the expected outputs into `tensors` in place.
    fn compute_golden(&self, tensors: &mut TensorMap, params: &ParamSet) -> GoldenResult<()>;
}

/// Decode a parameter set into a golden's typed parameters.
pub fn decode_params<T: DeserializeOwned>(reference: &str, params: &ParamSet) -> GoldenResult<T> {
    params.decode().map_err(|e| GoldenError::InvalidParams {
        reference: reference.to_string(),
        reason: e.to_string(),
    })
}

/// Name-keyed set of golden references.
#[derive(Clone, Default)]
pub struct ReferenceRegistry {
    references: BTreeMap<String, Arc<dyn GoldenReference>>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every golden shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PagedAttention));
        registry.register(Arc::new(Bgemm));
        registry
    }

    /// Add or replace a reference under its own name.
    pub fn register(&mut self, reference: Arc<dyn GoldenReference>) {
        self.references
            .insert(reference.name().to_string(), reference);
    }

    pub fn names(&self) -> Vec<String> {
        self.references.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> GoldenResult<Arc<dyn GoldenReference>> {
        self.references
            .get(name)
            .cloned()
            .ok_or_else(|| GoldenError::UnknownReference {
                name: name.to_string(),
                available: self.names(),
            })
    }
}

impl std::fmt::Debug for ReferenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceRegistry")
            .field("references", &self.names())
            .finish()
    }
}

/// A prepared test case: inputs for the pipeline and the expected outputs.
#[derive(Debug, Clone)]
pub struct GoldenCase {
    pub label: String,
    pub params: ParamSet,
    pub seed: u64,
    /// Inputs with zeroed outputs, handed to the executor.
    pub inputs: TensorMap,
    /// Same tensors after `compute_golden`.
    pub expected: TensorMap,
    pub outputs: Vec<String>,
    pub tolerance: Tolerance,
}

/// Outcome of checking actual outputs against a case.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseCheck {
    /// Every declared output within tolerance.
    Passed(Vec<Comparison>),
    /// The first declared output that failed; later outputs are not checked.
    Failed(Comparison),
}

impl GoldenCase {
    /// Generate inputs from `seed` and compute the golden on a separate copy.
    pub fn prepare(
        reference: &dyn GoldenReference,
        label: impl Into<String>,
        params: ParamSet,
        outputs: &[String],
        tolerance: Tolerance,
        seed: u64,
    ) -> GoldenResult<Self> {
        let label = label.into();
        let mut rng = StdRng::seed_from_u64(seed);
        let inputs = reference.generate_inputs(&params, &mut rng)?;

        for name in outputs {
            inputs.require(name)?;
        }

        let mut expected = inputs.clone();
        reference.compute_golden(&mut expected, &params)?;
        debug!(
            reference = reference.name(),
            case = %label,
            seed,
            tensors = inputs.len(),
            "Prepared golden case"
        );

        Ok(Self {
            label,
            params,
            seed,
            inputs,
            expected,
            outputs: outputs.to_vec(),
            tolerance,
        })
    }

    /// Compare each declared output in order, stopping at the first failure.
    pub fn check(&self, actual: &TensorMap) -> GoldenResult<CaseCheck> {
        let mut passed = Vec::with_capacity(self.outputs.len());
        for name in &self.outputs {
            let comparison = compare(
                name,
                actual.require(name)?,
                self.expected.require(name)?,
                self.tolerance,
            )?;
            if !comparison.passed() {
                return Ok(CaseCheck::Failed(comparison));
            }
            passed.push(comparison);
        }
        Ok(CaseCheck::Passed(passed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    struct Doubler;

    impl GoldenReference for Doubler {
        fn name(&self) -> &'static str {
            "doubler"
        }

        fn generate_inputs(&self, _params: &ParamSet, rng: &mut dyn RngCore) -> GoldenResult<TensorMap> {
            let x: Vec<f32> = (0..4).map(|_| (rng.next_u32() % 100) as f32).collect();
            let mut map = TensorMap::new();
            map.insert("x", Tensor::f32(vec![4], x)?);
            map.insert("y", Tensor::zeros_f32(vec![4]));
            map.insert("z", Tensor::zeros_f32(vec![4]));
            Ok(map)
        }

        fn compute_golden(&self, tensors: &mut TensorMap, _params: &ParamSet) -> GoldenResult<()> {
            let doubled: Vec<f32> = tensors.f32_slice("x")?.iter().map(|v| v * 2.0).collect();
            tensors.write_f32("y", &doubled)?;
            tensors.write_f32("z", &doubled)
        }
    }

    fn outputs() -> Vec<String> {
        vec!["y".to_string(), "z".to_string()]
    }

    #[test]
    fn test_registry_builtins_and_unknown() {
        let registry = ReferenceRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["bgemm", "paged_attention"]);
        assert!(registry.get("paged_attention").is_ok());
        match registry.get("softmax") {
            Err(GoldenError::UnknownReference { available, .. }) => {
                assert_eq!(available.len(), 2)
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.name())),
        }
    }

    #[test]
    fn test_prepare_is_deterministic_and_keeps_inputs_zeroed() {
        let a = GoldenCase::prepare(&Doubler, "c", ParamSet::default(), &outputs(), Tolerance::exact(), 7)
            .unwrap();
        let b = GoldenCase::prepare(&Doubler, "c", ParamSet::default(), &outputs(), Tolerance::exact(), 7)
            .unwrap();
        assert_eq!(a.inputs, b.inputs);
        assert_eq!(a.inputs.f32_slice("y").unwrap(), &[0.0; 4]);
        assert_ne!(a.expected.f32_slice("y").unwrap(), &[0.0; 4]);
    }

    #[test]
    fn test_prepare_rejects_undeclared_output() {
        let err = GoldenCase::prepare(
            &Doubler,
            "c",
            ParamSet::default(),
            &["missing".to_string()],
            Tolerance::exact(),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, GoldenError::MissingTensor(name) if name == "missing"));
    }

    #[test]
    fn test_check_stops_at_first_failing_output() {
        let case = GoldenCase::prepare(&Doubler, "c", ParamSet::default(), &outputs(), Tolerance::exact(), 3)
            .unwrap();

        assert!(matches!(case.check(&case.expected).unwrap(), CaseCheck::Passed(c) if c.len() == 2));

        // "y" is wrong, "z" is never inspected
        let mut actual = case.expected.clone();
        actual.write_f32("y", &[-1.0; 4]).unwrap();
        actual.write_f32("z", &[-1.0; 4]).unwrap();
        match case.check(&actual).unwrap() {
            CaseCheck::Failed(cmp) => {
                assert_eq!(cmp.tensor, "y");
                assert!(cmp.mismatch_count > 0);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
