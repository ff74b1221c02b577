
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How strictly a rewrite must preserve numeric results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
  /// Rewrites must agree bit for bit with the original on every input,
  /// NaN, infinities and signed zeros included.
  #[default]
  Exact,
  /// Rewrites may substitute bounded-error approximations, but must
  /// still agree on special-case inputs and raise the same exceptions.
  FastApprox,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
  /// The mode of declarations that carry no mode attribute.
  pub mode: EvaluationMode,
  /// Full rewrite passes allowed before the driver gives up on reaching
  /// a fixpoint.
  pub max_passes: usize,
  /// Expressions nested deeper than this are left as written.
  pub max_depth: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Invalid optimizer configuration: {0}")]
  Json(#[from] serde_json::Error),
  #[error("max_passes must be at least 1")]
  NoPasses,
  #[error("max_depth must be at least 1")]
  NoDepth,
}

impl EvaluationMode {
  pub fn is_fast(self) -> bool {
    self == EvaluationMode::FastApprox
  }

  /// The mode selected by a declaration attribute, such as
  /// `[FastApprox]`.
  pub fn from_attribute(name: &str) -> Option<EvaluationMode> {
    match name.strip_suffix("Attribute").unwrap_or(name) {
      "FastApprox" | "FastMath" => Some(EvaluationMode::FastApprox),
      "Exact" | "ExactMath" => Some(EvaluationMode::Exact),
      _ => None,
    }
  }
}

impl OptimizerConfig {
  pub const DEFAULT_MAX_PASSES: usize = 16;
  pub const DEFAULT_MAX_DEPTH: usize = 256;

  pub fn new(mode: EvaluationMode) -> Self {
    Self { mode, ..Self::default() }
  }

  pub fn from_json(text: &str) -> Result<Self, ConfigError> {
    let config: OptimizerConfig = serde_json::from_str(text)?;
    if config.max_passes == 0 {
      return Err(ConfigError::NoPasses);
    }
    if config.max_depth == 0 {
      return Err(ConfigError::NoDepth);
    }
    Ok(config)
  }
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      mode: EvaluationMode::Exact,
      max_passes: Self::DEFAULT_MAX_PASSES,
      max_depth: Self::DEFAULT_MAX_DEPTH,
    }
  }
}
