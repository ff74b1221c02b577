
//! Powers, roots, and the functions that reduce to arithmetic.

use super::{MathFunction, MathSite};
use crate::ast::{BinaryOp, Expr};
use crate::ast::purity::is_pure;
use crate::value::Number;

use std::rc::Rc;

const DEGREES_TO_RADIANS: f64 = 0.017453292519943295;
const RADIANS_TO_DEGREES: f64 = 57.29577951308232;

pub(super) fn rewrite(site: &MathSite) -> Option<Expr> {
  use MathFunction::*;
  match site.function {
    Pow => pow(site),
    RootN => root_n(site),
    Sqrt => sqrt(site),
    Exp => exp(site),
    Lerp => lerp(site),
    DegreesToRadians if site.is_fast() => Some(mul(site.operand(0), site.number(DEGREES_TO_RADIANS))),
    RadiansToDegrees if site.is_fast() => Some(mul(site.operand(0), site.number(RADIANS_TO_DEGREES))),
    BitIncrement if site.is_fast() => inverse_step(site, BitDecrement),
    BitDecrement if site.is_fast() => inverse_step(site, BitIncrement),
    _ => None,
  }
}

fn mul(lhs: Expr, rhs: Expr) -> Expr {
  Expr::binary(BinaryOp::Mul, lhs, rhs)
}

/// `x * x * ... * x` with `n >= 1` factors.
fn product(x: &Expr, n: u32) -> Expr {
  (1..n).fold(x.clone(), |acc, _| mul(acc, x.clone()))
}

fn reciprocal(site: &MathSite, denominator: Expr) -> Expr {
  Expr::binary(BinaryOp::Div, site.number(1.0), denominator)
}

/// The exponent `1/3` as it reads after conversion to `T`.
fn one_third(site: &MathSite) -> f64 {
  Number::from_f64(1.0 / 3.0, site.ty).to_f64()
}

fn pow(site: &MathSite) -> Option<Expr> {
  if !is_pure(site.arg(1)) {
    return None;
  }
  let exponent = site.literal(1)?.to_f64();
  let x = site.operand(0);
  let pure = is_pure(site.arg(0));
  if site.is_fast() {
    if let Some(rewritten) = fast_pow(site, &x, exponent, pure) {
      return Some(rewritten);
    }
  }
  if exponent == 0.0 && pure {
    Some(site.number(1.0))
  } else if exponent == 1.0 {
    Some(x)
  } else if exponent == 2.0 && pure {
    Some(product(&x, 2))
  } else if exponent == -1.0 {
    Some(reciprocal(site, x))
  } else {
    None
  }
}

fn fast_pow(site: &MathSite, x: &Expr, exponent: f64, pure: bool) -> Option<Expr> {
  if exponent == -1.0 {
    return Some(site.build("ReciprocalEstimate", vec![x.clone()]));
  }
  if exponent == 0.5 {
    return Some(site.build("Sqrt", vec![x.clone()]));
  }
  if !pure {
    return None;
  }
  if exponent == one_third(site) {
    return Some(pow_one_third(site, x));
  }
  let magnitude = exponent.abs();
  if magnitude.fract() != 0.0 || !(2.0..=5.0).contains(&magnitude) {
    return None;
  }
  let n = magnitude as u32;
  if exponent > 0.0 {
    (n >= 3).then(|| product(x, n))
  } else {
    Some(reciprocal(site, product(x, n)))
  }
}

/// `Pow(x, 1/3)`, which unlike `Cbrt` is NaN below zero, `+0` at `-0`,
/// and `+Infinity` at `-Infinity`.
fn pow_one_third(site: &MathSite, x: &Expr) -> Expr {
  let conditional = |cond: Expr, then: Expr, otherwise: Expr| {
    Expr::Conditional(Rc::new(cond), Rc::new(then), Rc::new(otherwise))
  };
  let at_zero = conditional(
    Expr::binary(BinaryOp::Eq, x.clone(), site.number(0.0)),
    site.number(0.0),
    site.number(f64::NAN),
  );
  let finite = conditional(
    Expr::binary(BinaryOp::Gt, x.clone(), site.number(0.0)),
    site.build("Cbrt", vec![x.clone()]),
    at_zero,
  );
  conditional(
    site.build("IsNegativeInfinity", vec![x.clone()]),
    site.number(f64::INFINITY),
    finite,
  )
}

fn root_n(site: &MathSite) -> Option<Expr> {
  if !is_pure(site.arg(1)) {
    return None;
  }
  let n = site.ctx.fold_int(site.arg(1))?;
  let x = site.operand(0);
  match n {
    1 => Some(x),
    2 if site.is_fast() => Some(site.build("Sqrt", vec![x])),
    3 if site.is_fast() => Some(site.build("Cbrt", vec![x])),
    -1 if site.is_fast() => Some(reciprocal(site, x)),
    _ => None,
  }
}

/// `Sqrt(y * y)` is `Abs(y)` up to overflow in the square.
fn sqrt(site: &MathSite) -> Option<Expr> {
  if !site.is_fast() {
    return None;
  }
  let Expr::Binary(BinaryOp::Mul, lhs, rhs) = site.arg(0).unparen() else {
    return None;
  };
  let y = lhs.unparen();
  (y == rhs.unparen() && is_pure(y) && site.has_type(y)).then(|| site.build("Abs", vec![y.clone()]))
}

/// `Exp(Log(y))` is `y` for positive `y`.
fn exp(site: &MathSite) -> Option<Expr> {
  if !site.is_fast() {
    return None;
  }
  let inner = site.inner(0, MathFunction::Log)?;
  (inner.args.len() == 1).then(|| site.convert(&inner.args[0]))
}

/// `Lerp(a, b, t)` as one fused multiply-add.
fn lerp(site: &MathSite) -> Option<Expr> {
  if !site.is_fast() || !is_pure(site.arg(0)) {
    return None;
  }
  let (a, b, t) = (site.operand(0), site.operand(1), site.operand(2));
  let span = Expr::binary(BinaryOp::Sub, b, a.clone());
  Some(site.build("FusedMultiplyAdd", vec![t, span, a]))
}

fn inverse_step(site: &MathSite, inverse: MathFunction) -> Option<Expr> {
  let inner = site.inner(0, inverse)?;
  Some(site.convert(&inner.args[0]))
}
