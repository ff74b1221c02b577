
//! Abs and CopySign.

use super::{negate, MathFunction, MathSite};
use crate::ast::Expr;
use crate::ast::purity::is_pure;

pub(super) fn rewrite(site: &MathSite) -> Option<Expr> {
  match site.function {
    MathFunction::Abs => abs(site),
    MathFunction::CopySign => copy_sign(site),
    _ => None,
  }
}

fn abs(site: &MathSite) -> Option<Expr> {
  if let Some(operand) = site.negated(0) {
    return Some(site.build("Abs", vec![operand.clone()]));
  }
  // An unsigned argument widened to a signed T is never negative.
  let ty = site.ctx.resolve_type(site.arg(0))?.as_numeric()?;
  (ty.is_unsigned() && ty != site.ty).then(|| site.operand(0))
}

/// With a constant sign the result is `Abs(x)` or its negation. For
/// integers the overflow on the minimum value raises a different
/// message from `Abs`, so only floats qualify.
fn copy_sign(site: &MathSite) -> Option<Expr> {
  if !site.is_floating() || !is_pure(site.arg(1)) {
    return None;
  }
  let sign = site.literal(1)?;
  if sign.is_nan() {
    return None;
  }
  let magnitude = site.build("Abs", vec![site.operand(0)]);
  Some(if sign.is_sign_negative() { negate(magnitude) } else { magnitude })
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use crate::ast::{NumericType, TypeRef};
  use crate::optimizer::{EvaluationMode, Session};

  fn locals() -> Session {
    session(EvaluationMode::Exact, &[
      ("x", TypeRef::Numeric(NumericType::Double)),
      ("i", TypeRef::Numeric(NumericType::Int32)),
      ("u", TypeRef::Numeric(NumericType::UInt32)),
    ])
  }

  #[test]
  fn test_abs_of_negation() {
    let session = locals();
    let rewritten = rewrite(&session, "Math.Abs(-x)").unwrap();
    assert_eq!(rewritten.to_string(), "double.Abs(x)");
    assert_agree(&session, "Math.Abs(-x)", &rewritten, "x", &edge_doubles());
    assert_eq!(rewrite_str(&session, "Math.Abs(-i)").unwrap(), "int.Abs(i)");
  }

  #[test]
  fn test_abs_of_unsigned() {
    let session = locals();
    assert_eq!(rewrite_str(&session, "Math.Abs(u)").unwrap(), "(long)u");
  }

  #[test]
  fn test_copy_sign_with_constant_sign() {
    let session = locals();
    let samples = edge_doubles();
    for (source, expected) in [
      ("Math.CopySign(x, 2.0)", "double.Abs(x)"),
      ("Math.CopySign(x, 0.0)", "double.Abs(x)"),
      ("Math.CopySign(x, -0.0)", "-double.Abs(x)"),
      ("Math.CopySign(x, -3.5)", "-double.Abs(x)"),
    ] {
      let rewritten = rewrite(&session, source).unwrap();
      assert_eq!(rewritten.to_string(), expected);
      assert_agree(&session, source, &rewritten, "x", &samples);
    }
  }

  #[test]
  fn test_copy_sign_guards() {
    let session = locals();
    assert_eq!(rewrite_str(&session, "Math.CopySign(x, double.NaN)").unwrap(), "double.CopySign(x, double.NaN)");
    assert_eq!(rewrite_str(&session, "Math.CopySign(i, 1)").unwrap(), "int.CopySign(i, 1)");
  }
}
