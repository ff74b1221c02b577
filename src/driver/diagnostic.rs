
use thiserror::Error;

/// A recoverable problem met while optimizing a compilation unit. None
/// of these stop optimization; the affected expression is left as it
/// was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
  #[error("No fixpoint after {passes} passes; keeping the last rewrite")]
  PassBudgetExhausted { passes: usize },
  #[error("Expression nested deeper than {depth} levels was not optimized")]
  DepthBudgetExhausted { depth: usize },
  #[error("Could not resolve the signature of {name}")]
  UnresolvedCall { name: String },
  #[error("Helper {name} could not be instantiated: {message}")]
  HelperTemplate { name: String, message: String },
  #[error("Helper {name} conflicts with an existing definition")]
  HelperConflict { name: String },
}
