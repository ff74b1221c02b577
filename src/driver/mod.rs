
//! Runs the optimizer over whole expressions and compilation units.
//!
//! Every expression goes through the same pipeline: operator folding
//! followed by call-site strategies, repeated until nothing changes.
//! Helpers registered along the way are pruned once the final tree is
//! known, so only helpers the output actually calls are emitted.

pub mod calls;
pub mod diagnostic;
pub mod folder;
pub mod simplifier;
pub mod unit;

pub use calls::CallOptimizer;
pub use diagnostic::Diagnostic;
pub use folder::ConstantFolder;
pub use simplifier::{ChainedSimplifier, FixpointSimplifier, IdentitySimplifier, Simplifier};
pub use unit::{CompilationUnit, OptimizedUnit};

use crate::ast::{Expr, HelperDefinition};
use crate::ast::walker::free_call_names;
use crate::errorlist::ErrorList;
use crate::eval::{PartialEvaluator, Scope};
use crate::host::{Loader, SymbolResolver};
use crate::optimizer::{OptimizerConfig, Session};

use std::rc::Rc;

/// An optimized expression and the helpers it calls.
#[derive(Debug, Clone)]
pub struct OptimizedExpression {
  pub expr: Expr,
  pub helpers: Vec<HelperDefinition>,
  pub diagnostics: ErrorList<Diagnostic>,
}

pub fn default_simplifier<'a>(session: &'a Session, config: &OptimizerConfig) -> Box<dyn Simplifier + 'a> {
  let pass = ChainedSimplifier::several([
    Box::new(ConstantFolder::new(session)) as Box<dyn Simplifier + 'a>,
    Box::new(CallOptimizer::new(session, config.max_depth)),
  ]);
  Box::new(FixpointSimplifier::new(pass, config.max_passes))
}

/// Optimizes a single expression whose free variables are typed by
/// `resolver` and have no known values.
pub fn optimize_expression(
  expr: Expr,
  resolver: Rc<dyn SymbolResolver>,
  loader: Rc<dyn Loader>,
  config: &OptimizerConfig,
) -> OptimizedExpression {
  let evaluator = PartialEvaluator::new(Scope::new(resolver), loader);
  let session = Session::new(evaluator, config.mode);
  let mut diagnostics = ErrorList::new();
  let expr = default_simplifier(&session, config).simplify_expr(expr, &mut diagnostics);
  session.prune_helpers(&free_call_names(&expr));
  diagnostics.append(&mut session.take_diagnostics());
  let helpers = session.into_helpers().into_definitions();
  OptimizedExpression { expr, helpers, diagnostics }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{NumericType, TypeRef};
  use crate::eval::Environment;
  use crate::host::{InterpretingLoader, ScopeResolver};
  use crate::optimizer::EvaluationMode;
  use crate::parsing::parse_expr;
  use crate::value::{Number, Sequence, Value};

  use test_log::test;

  fn resolver() -> ScopeResolver {
    let int = TypeRef::Numeric(NumericType::Int32);
    let double = TypeRef::Numeric(NumericType::Double);
    ScopeResolver::new()
      .with_local("i", int.clone())
      .with_local("x", double.clone())
      .with_local("y", double)
      .with_local("xs", TypeRef::array(int))
  }

  fn optimize(mode: EvaluationMode, source: &str) -> OptimizedExpression {
    let config = OptimizerConfig::new(mode);
    optimize_expression(parse_expr(source).unwrap(), Rc::new(resolver()), Rc::new(InterpretingLoader::new()), &config)
  }

  fn eval(expr: &Expr, name: &str, value: Value) -> Option<Value> {
    let mut env = Environment::new();
    env.bind_value(name, value);
    let evaluator = PartialEvaluator::new(Scope::new(Rc::new(resolver())), Rc::new(InterpretingLoader::new()))
      .with_env(env);
    evaluator.fold(expr, None).unwrap()
  }

  #[test]
  fn test_clamp_end_to_end() {
    let source = "Math.Max(Math.Min(i, 10), 0)";
    let optimized = optimize(EvaluationMode::Exact, source);
    assert_eq!(optimized.expr.to_string(), "int.Clamp(i, 0, 10)");
    assert!(optimized.helpers.is_empty());
    assert!(optimized.diagnostics.is_empty());
    let original = parse_expr(source).unwrap();
    for input in [-5, 0, 5, 15] {
      let i = Value::Number(Number::Int32(input));
      assert_eq!(eval(&optimized.expr, "i", i.clone()), eval(&original, "i", i));
    }
  }

  #[test]
  fn test_filter_chain_count() {
    let source = "xs.Where(x => x % 2 == 0).Where(x => x > 2).Count()";
    let optimized = optimize(EvaluationMode::Exact, source);
    assert_eq!(optimized.expr.to_string(), "xs.Count(x => x % 2 == 0 && x > 2)");
    let items = [1, 2, 3, 4, 5, 6].map(|n| Value::Number(Number::Int32(n))).to_vec();
    let xs = Value::Sequence(Sequence::array(TypeRef::Numeric(NumericType::Int32), items));
    assert_eq!(eval(&optimized.expr, "xs", xs), Some(Value::Number(Number::Int32(2))));
  }

  #[test]
  fn test_constant_filters() {
    assert_eq!(optimize(EvaluationMode::Exact, "xs.Where(x => true)").expr.to_string(), "xs.AsEnumerable()");
    assert_eq!(optimize(EvaluationMode::Exact, "xs.Where(x => 1 > 2)").expr.to_string(), "Enumerable.Empty<int>()");
  }

  #[test]
  fn test_fast_helpers_are_shared() {
    let optimized = optimize(EvaluationMode::FastApprox, "Math.Sin(x) + Math.Sin(y)");
    assert_eq!(optimized.expr.to_string(), "FastSin(x) + FastSin(y)");
    assert_eq!(optimized.helpers.len(), 1);
    assert_eq!(optimized.helpers[0].name, "FastSin");
  }

  #[test]
  fn test_cross_call_pattern_in_fast_mode() {
    let optimized = optimize(EvaluationMode::FastApprox, "Math.Exp(Math.Log(x)) + 1.0");
    assert_eq!(optimized.expr.to_string(), "x + 1.0");
    assert!(optimized.helpers.is_empty());
  }

  #[test]
  fn test_unused_helpers_are_pruned() {
    let optimized = optimize(EvaluationMode::FastApprox, "Math.Abs(-1) > 0 ? x : Math.Sin(y)");
    assert_eq!(optimized.expr.to_string(), "x");
    assert!(optimized.helpers.is_empty());
  }

  #[test]
  fn test_literals_fold_through_calls() {
    let optimized = optimize(EvaluationMode::Exact, "Math.Max(2, 3) * (i + 0)");
    assert_eq!(optimized.expr.to_string(), "3 * (i + 0)");
  }
}
