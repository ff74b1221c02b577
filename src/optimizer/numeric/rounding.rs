
//! Floor, Ceiling, Truncate and Round.

use super::{negate, MathFunction, MathSite};
use crate::ast::{Call, Expr};
use crate::value::Value;

pub(super) fn rewrite(site: &MathSite) -> Option<Expr> {
  if site.ty.is_integer() {
    return None;
  }
  integer_operand(site)
    .or_else(|| integral_operand(site))
    .or_else(|| negated_operand(site))
}

/// The one-argument form, or `Round(x, mode)`.
fn is_plain(site: &MathSite, call: &Call) -> bool {
  match call.args.len() {
    1 => true,
    2 => site.ctx
      .resolve_call(call)
      .and_then(|s| s.parameter_types.get(1).map(|t| t.is_named("MidpointRounding")))
      .unwrap_or(false),
    _ => false,
  }
}

/// An integer argument is already integral; it only needs converting.
fn integer_operand(site: &MathSite) -> Option<Expr> {
  if !is_plain(site, site.ctx.call()) {
    return None;
  }
  let ty = site.ctx.resolve_type(site.arg(0))?.as_numeric()?;
  ty.is_integer().then(|| site.operand(0))
}

/// `Floor(Ceiling(x))` and friends: the inner result is integral.
fn integral_operand(site: &MathSite) -> Option<Expr> {
  if !is_plain(site, site.ctx.call()) {
    return None;
  }
  let (function, inner) = site.math_call(site.arg(0))?;
  (function.is_integral() && is_plain(site, inner)).then(|| site.arg(0).clone())
}

/// `Floor(-x)` to `-Ceiling(x)`, and the symmetric cases.
fn negated_operand(site: &MathSite) -> Option<Expr> {
  use MathFunction::*;
  let operand = site.negated(0)?;
  let name = match site.function {
    Floor => "Ceiling",
    Ceiling => "Floor",
    Truncate => "Truncate",
    Round if is_symmetric_round(site) => "Round",
    _ => return None,
  };
  let mut args = site.args().to_vec();
  args[0] = operand.clone();
  Some(negate(site.build(name, args)))
}

/// Whether `Round(-x, ...) == -Round(x, ...)` for the call's midpoint
/// mode.
fn is_symmetric_round(site: &MathSite) -> bool {
  let signature = site.ctx.signature();
  let Some(index) = signature.parameter_types.iter().position(|t| t.is_named("MidpointRounding")) else {
    // ToEven.
    return true;
  };
  match site.ctx.fold_value(site.arg(index)) {
    Some(Value::Enum { member, .. }) => matches!(member.as_str(), "ToEven" | "AwayFromZero" | "ToZero"),
    _ => false,
  }
}
