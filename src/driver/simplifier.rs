
//! Whole-expression rewriting passes and the combinators that run
//! them in sequence or to a fixpoint.

use super::diagnostic::Diagnostic;
use crate::ast::Expr;
use crate::ast::walker::postorder_walk_ok;
use crate::errorlist::ErrorList;

use log::{debug, warn};

pub trait Simplifier {
  /// Rewrites a single node whose children have already been
  /// simplified.
  fn simplify_expr_part(&self, expr: Expr, errors: &mut ErrorList<Diagnostic>) -> Expr;

  fn simplify_expr(&self, expr: Expr, errors: &mut ErrorList<Diagnostic>) -> Expr {
    postorder_walk_ok(expr, |e| self.simplify_expr_part(e, errors))
  }
}

/// Leaves every expression alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySimplifier;

/// Runs `left` over the whole expression, then `right` over the
/// result.
pub struct ChainedSimplifier<'a> {
  left: Box<dyn Simplifier + 'a>,
  right: Box<dyn Simplifier + 'a>,
}

/// Runs its inner simplifier until the expression stops changing, or
/// until `max_passes` passes have run.
pub struct FixpointSimplifier<'a> {
  inner: Box<dyn Simplifier + 'a>,
  max_passes: usize,
}

impl Simplifier for IdentitySimplifier {
  fn simplify_expr_part(&self, expr: Expr, _: &mut ErrorList<Diagnostic>) -> Expr {
    expr
  }

  fn simplify_expr(&self, expr: Expr, _: &mut ErrorList<Diagnostic>) -> Expr {
    expr
  }
}

impl<'a> ChainedSimplifier<'a> {
  pub fn new(left: Box<dyn Simplifier + 'a>, right: Box<dyn Simplifier + 'a>) -> ChainedSimplifier<'a> {
    ChainedSimplifier { left, right }
  }

  pub fn several(args: impl IntoIterator<Item = Box<dyn Simplifier + 'a>>) -> Box<dyn Simplifier + 'a> {
    args.into_iter()
      .reduce(|a, b| Box::new(ChainedSimplifier::new(a, b)))
      .unwrap_or_else(|| Box::new(IdentitySimplifier))
  }
}

impl<'a> Simplifier for ChainedSimplifier<'a> {
  fn simplify_expr_part(&self, expr: Expr, errors: &mut ErrorList<Diagnostic>) -> Expr {
    let expr = self.left.simplify_expr_part(expr, errors);
    self.right.simplify_expr_part(expr, errors)
  }

  fn simplify_expr(&self, expr: Expr, errors: &mut ErrorList<Diagnostic>) -> Expr {
    let expr = self.left.simplify_expr(expr, errors);
    self.right.simplify_expr(expr, errors)
  }
}

impl<'a> FixpointSimplifier<'a> {
  pub fn new(inner: Box<dyn Simplifier + 'a>, max_passes: usize) -> FixpointSimplifier<'a> {
    FixpointSimplifier { inner, max_passes }
  }
}

impl<'a> Simplifier for FixpointSimplifier<'a> {
  fn simplify_expr_part(&self, expr: Expr, errors: &mut ErrorList<Diagnostic>) -> Expr {
    self.inner.simplify_expr_part(expr, errors)
  }

  /// Diagnostics from a pass are superseded by the next pass over the
  /// same tree, so only the last pass's are kept.
  fn simplify_expr(&self, mut expr: Expr, errors: &mut ErrorList<Diagnostic>) -> Expr {
    let mut last_errors = ErrorList::new();
    for pass in 1..=self.max_passes {
      let mut pass_errors = ErrorList::new();
      let next = self.inner.simplify_expr(expr.clone(), &mut pass_errors);
      last_errors = pass_errors;
      if next == expr {
        debug!("Fixpoint reached after {pass} passes");
        errors.append(&mut last_errors);
        return next;
      }
      expr = next;
    }
    warn!("No fixpoint after {} passes: {expr}", self.max_passes);
    errors.append(&mut last_errors);
    errors.push(Diagnostic::PassBudgetExhausted { passes: self.max_passes });
    expr
  }
}
