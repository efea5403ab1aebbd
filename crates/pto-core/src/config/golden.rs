//! Per-example golden declaration (`golden.toml`).
//!
//! Names the golden implementation to use, the output tensors to compare,
//! tolerances and the parameter sweep:
//!
//! ```toml
//! reference = "paged_attention"
//! outputs = ["out"]
//! rtol = 1e-2
//! atol = 1e-2
//!
//! [[cases]]
//! name = "Case1"
//! params = { batch = 1, num_heads = 16, head_dim = 16 }
//! ```

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PtoError, Result};

/// Conventional golden file name inside an example directory.
pub const GOLDEN_FILE: &str = "golden.toml";

pub const DEFAULT_RTOL: f64 = 1e-5;
pub const DEFAULT_ATOL: f64 = 1e-5;

/// One entry of a parameter sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParamSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub params: toml::Table,
}

impl ParamSet {
    pub fn named(name: impl Into<String>, params: toml::Table) -> Self {
        Self {
            name: Some(name.into()),
            params,
        }
    }

    /// Label for reports: explicit name, else `case<index>`.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("case{}", index))
    }

    /// Deserialize the parameters into a golden's typed parameter struct.
    pub fn decode<T: DeserializeOwned>(&self) -> std::result::Result<T, toml::de::Error> {
        toml::Value::Table(self.params.clone()).try_into()
    }
}

/// Golden declaration of one example.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GoldenConfig {
    /// Registered golden implementation name.
    pub reference: String,

    /// Output tensors to compare. Required and explicit.
    pub outputs: Vec<String>,

    #[serde(default = "default_rtol")]
    pub rtol: f64,

    #[serde(default = "default_atol")]
    pub atol: f64,

    /// Seed for randomized inputs; a fresh seed is drawn when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Argument order expected by the orchestration entry point.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tensor_order: Vec<String>,

    #[serde(default)]
    pub cases: Vec<ParamSet>,
}

fn default_rtol() -> f64 {
    DEFAULT_RTOL
}

fn default_atol() -> f64 {
    DEFAULT_ATOL
}

impl GoldenConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PtoError::missing_path("golden file", path));
        }
        let cfg: GoldenConfig = super::load_toml(path)?;
        cfg.validate().map_err(|reason| PtoError::config(path, reason))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.reference.trim().is_empty() {
            return Err("reference must name a golden implementation".to_string());
        }
        if self.outputs.is_empty() {
            return Err("outputs must list at least one tensor".to_string());
        }
        if !(self.rtol >= 0.0 && self.rtol.is_finite()) {
            return Err(format!("rtol must be a finite non-negative number, got {}", self.rtol));
        }
        if !(self.atol >= 0.0 && self.atol.is_finite()) {
            return Err(format!("atol must be a finite non-negative number, got {}", self.atol));
        }
        for (index, case) in self.cases.iter().enumerate() {
            for (key, value) in &case.params {
                if matches!(value, toml::Value::Array(_) | toml::Value::Table(_)) {
                    return Err(format!(
                        "case {}: parameter '{}' must be a scalar",
                        case.label(index),
                        key
                    ));
                }
            }
        }
        Ok(())
    }

    /// The parameter sweep; a single empty case when none is declared.
    pub fn sweep(&self) -> Vec<ParamSet> {
        if self.cases.is_empty() {
            vec![ParamSet::default()]
        } else {
            self.cases.clone()
        }
    }

    /// Keep only the case named `name`.
    pub fn select_case(&mut self, name: &str) -> Result<()> {
        let available: Vec<String> = self
            .cases
            .iter()
            .enumerate()
            .map(|(i, c)| c.label(i))
            .collect();
        let position = available.iter().position(|label| label == name);
        match position {
            Some(i) => {
                let case = self.cases.swap_remove(i);
                self.cases = vec![case];
                Ok(())
            }
            None => Err(PtoError::NotFound {
                what: "case",
                name: name.to_string(),
                available,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGED: &str = r#"
reference = "paged_attention"
outputs = ["out"]
rtol = 1e-2
atol = 1e-2
seed = 7

[[cases]]
name = "Case1"
params = { batch = 1, num_heads = 16, context_len = 16 }

[[cases]]
name = "Case2"
params = { batch = 1, num_heads = 16, context_len = 64 }
"#;

    fn parse(body: &str) -> GoldenConfig {
        toml::from_str(body).unwrap()
    }

    #[test]
    fn test_parse_sweep() {
        let cfg = parse(PAGED);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.sweep().len(), 2);
        assert_eq!(cfg.rtol, 1e-2);
        assert_eq!(cfg.seed, Some(7));
    }

    #[test]
    fn test_defaults_single_empty_case() {
        let cfg = parse("reference = \"x\"\noutputs = [\"out_f\"]\n");
        assert_eq!(cfg.rtol, DEFAULT_RTOL);
        assert_eq!(cfg.atol, DEFAULT_ATOL);
        let sweep = cfg.sweep();
        assert_eq!(sweep.len(), 1);
        assert!(sweep[0].params.is_empty());
        assert_eq!(sweep[0].label(0), "case0");
    }

    #[test]
    fn test_outputs_must_be_declared() {
        let cfg = parse("reference = \"x\"\noutputs = []\n");
        assert!(cfg.validate().unwrap_err().contains("outputs"));
    }

    #[test]
    fn test_non_scalar_param_rejected() {
        let cfg = parse(
            "reference = \"x\"\noutputs = [\"o\"]\n[[cases]]\nparams = { dims = [1, 2] }\n",
        );
        assert!(cfg.validate().unwrap_err().contains("dims"));
    }

    #[test]
    fn test_select_case() {
        let mut cfg = parse(PAGED);
        cfg.select_case("Case2").unwrap();
        assert_eq!(cfg.cases.len(), 1);
        assert_eq!(cfg.cases[0].name.as_deref(), Some("Case2"));

        let mut cfg = parse(PAGED);
        let err = cfg.select_case("Case9").unwrap_err();
        assert!(err.to_string().contains("Case1, Case2"));
    }

    #[test]
    fn test_decode_typed_params() {
        #[derive(Deserialize)]
        struct P {
            batch: u32,
            context_len: u32,
        }
        let cfg = parse(PAGED);
        let p: P = cfg.cases[1].decode().unwrap();
        assert_eq!(p.batch, 1);
        assert_eq!(p.context_len, 64);
    }
}
