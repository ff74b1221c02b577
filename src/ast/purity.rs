
//! Purity analysis.
//!
//! A pure expression may be duplicated or dropped by a rewrite without
//! changing how often anything observable happens. Only literals,
//! identifiers, parentheses, and unary or binary operators over pure
//! operands qualify; any call, member access, or allocation does not.

use super::{Expr, Lambda};

pub fn is_pure(expr: &Expr) -> bool {
  match expr {
    Expr::Literal(_) | Expr::Ident(_) => true,
    Expr::Paren(inner) | Expr::Unary(_, inner) => is_pure(inner),
    Expr::Binary(_, lhs, rhs) => is_pure(lhs) && is_pure(rhs),
    _ => false,
  }
}

/// A lambda whose body is pure.
pub fn is_pure_lambda(lambda: &Lambda) -> bool {
  is_pure(&lambda.body)
}

/// `x => x`, ignoring parentheses around the body.
pub fn is_identity_lambda(lambda: &Lambda) -> bool {
  match lambda.single_param() {
    Some(param) => lambda.body.unparen().as_ident() == Some(param),
    None => false,
  }
}
