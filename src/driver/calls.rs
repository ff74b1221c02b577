
//! The pass that hands call sites to the strategy registries.
//!
//! Each call is offered to the registries twice: once as written, so
//! that patterns spanning several calls (`Math.Exp(Math.Log(x))`, a
//! `Min` nested in a `Max`) are seen before their parts are rewritten
//! on their own, and once more after its receiver, arguments, and
//! lambda bodies have been optimized. A rewrite found on the way down
//! is walked again, so its own sub-expressions are optimized too.

use super::diagnostic::Diagnostic;
use super::simplifier::Simplifier;
use crate::ast::{Call, CallTarget, Expr, Lambda};
use crate::ast::walker::map_children;
use crate::errorlist::ErrorList;
use crate::eval::PartialEvaluator;
use crate::optimizer::{try_optimize_call, OptimizerContext, Session};

use log::{debug, warn};

use std::rc::Rc;

#[derive(Debug, Clone, Copy)]
pub struct CallOptimizer<'a> {
  session: &'a Session,
  max_depth: usize,
}

impl<'a> CallOptimizer<'a> {
  pub fn new(session: &'a Session, max_depth: usize) -> CallOptimizer<'a> {
    CallOptimizer { session, max_depth }
  }

  /// The replacement a strategy proposes for `call`, if any. Only the
  /// second offer of a call reports an unresolvable signature.
  fn rewrite(
    &self,
    call: &Call,
    original: &Call,
    evaluator: &PartialEvaluator,
    report: bool,
    errors: &mut ErrorList<Diagnostic>,
  ) -> Option<Expr> {
    let Some(signature) = evaluator.scope().resolve_call_signature(call) else {
      if report && call.target != CallTarget::Free {
        errors.push_once(Diagnostic::UnresolvedCall { name: call.name.clone() });
      }
      return None;
    };
    let ctx = OptimizerContext::new(call, original, signature, evaluator, self.session);
    let rewritten = try_optimize_call(&ctx)?;
    if rewritten.as_call() == Some(call) {
      return None;
    }
    debug!("{call} => {rewritten}");
    Some(rewritten)
  }

  fn walk(&self, expr: &Expr, evaluator: &PartialEvaluator, depth: usize, errors: &mut ErrorList<Diagnostic>) -> Expr {
    if depth > self.max_depth {
      warn!("Giving up below depth {}", self.max_depth);
      errors.push_once(Diagnostic::DepthBudgetExhausted { depth: self.max_depth });
      return expr.clone();
    }
    if let Expr::Call(call) = expr {
      if let Some(rewritten) = self.rewrite(call, call, evaluator, false, errors) {
        return self.walk(&rewritten, evaluator, depth + 1, errors);
      }
    }
    let rebuilt = match expr {
      Expr::Call(call) => Expr::Call(self.walk_call(call, evaluator, depth, errors)),
      Expr::Lambda(lambda) => Expr::Lambda(self.walk_lambda(lambda, evaluator, depth, errors)),
      other => map_children(other, |child| self.walk(child, evaluator, depth + 1, errors)),
    };
    match (rebuilt, expr) {
      (Expr::Call(call), Expr::Call(original)) => {
        self.rewrite(&call, original, evaluator, true, errors).unwrap_or(Expr::Call(call))
      }
      (rebuilt, _) => rebuilt,
    }
  }

  fn walk_call(&self, call: &Call, evaluator: &PartialEvaluator, depth: usize, errors: &mut ErrorList<Diagnostic>) -> Call {
    let target = match &call.target {
      CallTarget::Instance(receiver) => CallTarget::Instance(Rc::new(self.walk(receiver, evaluator, depth + 1, errors))),
      other => other.clone(),
    };
    let args = call.args.iter().enumerate().map(|(i, arg)| {
      if arg.as_lambda().is_some() {
        let inner = evaluator.enter_lambda(call, i);
        self.walk(arg, &inner, depth + 1, errors)
      } else {
        self.walk(arg, evaluator, depth + 1, errors)
      }
    }).collect();
    Call { target, name: call.name.clone(), type_args: call.type_args.clone(), args }
  }

  /// Lambda parameters shadow any outer binding of the same name.
  fn walk_lambda(&self, lambda: &Lambda, evaluator: &PartialEvaluator, depth: usize, errors: &mut ErrorList<Diagnostic>) -> Lambda {
    let mut inner = evaluator.clone();
    for param in &lambda.params {
      inner.env_mut().invalidate(param);
    }
    let body = self.walk(&lambda.body, &inner, depth + 1, errors);
    Lambda { params: lambda.params.clone(), body: Rc::new(body) }
  }
}

impl<'a> Simplifier for CallOptimizer<'a> {
  fn simplify_expr_part(&self, expr: Expr, errors: &mut ErrorList<Diagnostic>) -> Expr {
    match &expr {
      Expr::Call(call) => self.rewrite(call, call, self.session.evaluator(), true, errors).unwrap_or(expr),
      _ => expr,
    }
  }

  fn simplify_expr(&self, expr: Expr, errors: &mut ErrorList<Diagnostic>) -> Expr {
    self.walk(&expr, self.session.evaluator(), 0, errors)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{NumericType, TypeRef};
  use crate::eval::Scope;
  use crate::host::{InterpretingLoader, ScopeResolver};
  use crate::optimizer::EvaluationMode;
  use crate::parsing::parse_expr;

  use test_log::test;

  fn session(mode: EvaluationMode) -> Session {
    let resolver = ScopeResolver::new()
      .with_local("x", TypeRef::Numeric(NumericType::Double))
      .with_local("i", TypeRef::Numeric(NumericType::Int32))
      .with_local("xs", TypeRef::array(TypeRef::Numeric(NumericType::Int32)));
    let evaluator = PartialEvaluator::new(Scope::new(Rc::new(resolver)), Rc::new(InterpretingLoader::new()));
    Session::new(evaluator, mode)
  }

  fn optimize(session: &Session, max_depth: usize, source: &str) -> (String, ErrorList<Diagnostic>) {
    let mut errors = ErrorList::new();
    let expr = CallOptimizer::new(session, max_depth).simplify_expr(parse_expr(source).unwrap(), &mut errors);
    (expr.to_string(), errors)
  }

  #[test]
  fn test_nested_pattern_seen_before_parts() {
    let session = session(EvaluationMode::Exact);
    let (expr, errors) = optimize(&session, 64, "Math.Min(10, Math.Max(0, i))");
    assert_eq!(expr, "int.Clamp(i, 0, 10)");
    assert!(errors.is_empty());
  }

  #[test]
  fn test_lambda_bodies_are_optimized() {
    let session = session(EvaluationMode::Exact);
    let (expr, errors) = optimize(&session, 64, "xs.Select(v => Math.Max(Math.Min(v, 9), 1))");
    assert_eq!(expr, "xs.Select(v => int.Clamp(v, 1, 9))");
    assert!(errors.is_empty());
  }

  #[test]
  fn test_unresolved_calls_are_reported_once() {
    let session = session(EvaluationMode::Exact);
    let (expr, errors) = optimize(&session, 64, "y.Frob(y.Frob())");
    assert_eq!(expr, "y.Frob(y.Frob())");
    assert_eq!(errors.into_vec(), vec![Diagnostic::UnresolvedCall { name: String::from("Frob") }]);
  }

  #[test]
  fn test_depth_budget() {
    let session = session(EvaluationMode::Exact);
    let (expr, errors) = optimize(&session, 2, "Math.Abs(Math.Abs(Math.Abs(Math.Abs(i))))");
    assert!(expr.contains("Abs(i)"));
    assert!(errors.iter().any(|e| matches!(e, Diagnostic::DepthBudgetExhausted { depth: 2 })));
  }
}
