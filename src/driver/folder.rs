
//! Operator-level constant folding.
//!
//! Calls are left to the call optimizer; this pass only collapses
//! operators, casts, and conditionals whose operands are already
//! literals, and drops parentheses that no longer group anything.

use super::diagnostic::Diagnostic;
use super::simplifier::Simplifier;
use crate::ast::{BinaryOp, Expr, Literal};
use crate::ast::printer::{precedence, PREC_PRIMARY};
use crate::errorlist::ErrorList;
use crate::host::HostException;
use crate::optimizer::Session;
use crate::value::{ops, Value};

use log::trace;

#[derive(Debug, Clone, Copy)]
pub struct ConstantFolder<'a> {
  session: &'a Session,
}

impl<'a> ConstantFolder<'a> {
  pub fn new(session: &'a Session) -> ConstantFolder<'a> {
    ConstantFolder { session }
  }

  /// A conditional with a literal condition becomes the branch it
  /// selects, provided that branch already has the conditional's type.
  fn select_branch(&self, whole: &Expr, cond: &Expr, then: &Expr, otherwise: &Expr) -> Option<Expr> {
    let Expr::Literal(Literal::Bool(cond)) = cond else {
      return None;
    };
    let chosen = if *cond { then } else { otherwise };
    let scope = self.session.evaluator().scope();
    let expected = scope.resolve_type(whole)?;
    (scope.resolve_type(chosen)? == expected).then(|| chosen.clone())
  }
}

fn literal_value(expr: &Expr) -> Option<Value> {
  expr.as_literal().map(Value::from_literal)
}

/// The literal for a folded operator, a throw node if it raised, or
/// `None` if it does not fold.
fn settle(expr: &Expr, result: Result<Option<Value>, HostException>) -> Option<Expr> {
  match result {
    Ok(value) => value?.to_expr(),
    Err(err) => {
      trace!("{expr} raises {err}");
      Some(err.to_expr())
    }
  }
}

/// Evaluating `expr` cannot do anything observable before it raises.
fn is_inert(expr: &Expr) -> bool {
  match expr {
    Expr::Literal(_) | Expr::Ident(_) | Expr::Lambda(_) => true,
    Expr::Paren(inner) => is_inert(inner),
    _ => false,
  }
}

/// The throw node an operator reaches before doing anything else, if
/// any. The operator is replaced by the throw itself, since C# only
/// accepts throw expressions in a few positions.
fn raised_first(expr: &Expr) -> Option<Expr> {
  let thrown = match expr {
    Expr::Paren(inner) | Expr::Unary(_, inner) | Expr::Cast(_, inner) => inner,
    Expr::Conditional(cond, _, _) => cond,
    Expr::Binary(_, lhs, _) if lhs.is_throw() => lhs,
    Expr::Binary(op, lhs, rhs) => {
      let short_circuits = matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce);
      if short_circuits || !is_inert(lhs) {
        return None;
      }
      rhs
    }
    _ => return None,
  };
  thrown.is_throw().then(|| Expr::clone(thrown))
}

impl<'a> Simplifier for ConstantFolder<'a> {
  fn simplify_expr_part(&self, expr: Expr, _errors: &mut ErrorList<Diagnostic>) -> Expr {
    if let Some(thrown) = raised_first(&expr) {
      trace!("{expr} always raises");
      return thrown;
    }
    let folded = match &expr {
      Expr::Paren(inner) if precedence(inner) == PREC_PRIMARY => Some(Expr::clone(inner)),
      Expr::Unary(op, operand) => {
        literal_value(operand).and_then(|v| settle(&expr, ops::unary(*op, &v)))
      }
      Expr::Binary(op, lhs, rhs) if *op != BinaryOp::Coalesce => {
        match (literal_value(lhs), literal_value(rhs)) {
          (Some(l), Some(r)) => settle(&expr, ops::binary(*op, &l, &r)),
          _ => None,
        }
      }
      Expr::Cast(ty, operand) => {
        literal_value(operand).and_then(|v| settle(&expr, ops::cast(&v, ty)))
      }
      Expr::Conditional(cond, then, otherwise) => self.select_branch(&expr, cond, then, otherwise),
      _ => None,
    };
    folded.unwrap_or(expr)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{NumericType, TypeRef};
  use crate::eval::{PartialEvaluator, Scope};
  use crate::host::{InterpretingLoader, ScopeResolver};
  use crate::optimizer::EvaluationMode;
  use crate::parsing::parse_expr;

  use std::rc::Rc;

  fn session() -> Session {
    let resolver = ScopeResolver::new()
      .with_local("a", TypeRef::Numeric(NumericType::Int32))
      .with_local("b", TypeRef::Numeric(NumericType::Int32))
      .with_local("d", TypeRef::Numeric(NumericType::Double));
    let evaluator = PartialEvaluator::new(Scope::new(Rc::new(resolver)), Rc::new(InterpretingLoader::new()));
    Session::new(evaluator, EvaluationMode::Exact)
  }

  fn fold(session: &Session, source: &str) -> String {
    let mut errors = ErrorList::new();
    let expr = ConstantFolder::new(session).simplify_expr(parse_expr(source).unwrap(), &mut errors);
    assert!(errors.is_empty());
    expr.to_string()
  }

  #[test]
  fn test_fold_arithmetic() {
    let session = session();
    assert_eq!(fold(&session, "1 + 2 * 3"), "7");
    assert_eq!(fold(&session, "a + 2 * 3"), "a + 6");
    assert_eq!(fold(&session, "!(1 < 2)"), "false");
    assert_eq!(fold(&session, "(double)1 / 4"), "0.25");
  }

  #[test]
  fn test_drop_redundant_parens() {
    let session = session();
    assert_eq!(fold(&session, "(a)"), "a");
    assert_eq!(fold(&session, "(a + b) * 2"), "(a + b) * 2");
  }

  #[test]
  fn test_fault_becomes_throw() {
    let session = session();
    let mut errors = ErrorList::new();
    let folded = ConstantFolder::new(&session).simplify_expr(parse_expr("1 / 0").unwrap(), &mut errors);
    assert!(folded.is_throw());
    assert_eq!(fold(&session, "a / 0"), "a / 0");
  }

  #[test]
  fn test_throw_absorbs_enclosing_operators() {
    let session = session();
    let thrown = "throw new System.DivideByZeroException(\"Attempted to divide by zero.\")";
    assert_eq!(fold(&session, "1 / 0 + a"), thrown);
    assert_eq!(fold(&session, "-(double)(1 % 0)"), thrown);
    assert_eq!(fold(&session, "a * (2 + 1 / 0)"), thrown);
    assert_eq!(fold(&session, "1 / 0 > 0 ? a : b"), thrown);
  }

  #[test]
  fn test_throw_kept_behind_other_work() {
    let session = session();
    assert_eq!(fold(&session, "a > 0 && 1 / 0 > 0"), format!("a > 0 && ({})", "throw new System.DivideByZeroException(\"Attempted to divide by zero.\")"));
    assert!(fold(&session, "Math.Abs(a) + 1 / 0").starts_with("Math.Abs(a) + (throw new"));
  }

  #[test]
  fn test_select_branch() {
    let session = session();
    assert_eq!(fold(&session, "true ? a : b"), "a");
    assert_eq!(fold(&session, "1 > 2 ? a : b"), "b");
    assert_eq!(fold(&session, "true ? a : d"), "true ? a : d");
  }
}
