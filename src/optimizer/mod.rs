
//! Call-site strategies.
//!
//! The driver hands each resolved call to [`try_optimize_call`], which
//! consults the numeric registry and then the sequence registry. The
//! two registries partition the calls they accept by declaring type,
//! name, and arity, so at most one strategy applies to any call.

pub mod context;
pub mod flags;
pub mod helpers;
pub mod mode;
pub mod numeric;
pub mod sequence;

pub use context::{OptimizerContext, Session};
pub use flags::StrategyFlags;
pub use helpers::{HelperEntry, HelperTable};
pub use mode::{ConfigError, EvaluationMode, OptimizerConfig};

use crate::ast::Expr;

/// The replacement for the context's call, if any strategy applies.
pub fn try_optimize_call(ctx: &OptimizerContext) -> Option<Expr> {
  numeric::try_optimize(ctx).or_else(|| sequence::try_optimize(ctx))
}
