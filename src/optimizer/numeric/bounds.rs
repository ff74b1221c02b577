
//! Clamp, Max and Min.
//!
//! For floats, `Max` and `Min` order `-0.0` below `+0.0` and propagate
//! NaN, while `Clamp` compares with `<` and `>`. The rewrites that
//! trade one for the other therefore need bounds that are not NaN,
//! and outside [`EvaluationMode::FastApprox`] bounds that are not zero.
//!
//! [`EvaluationMode::FastApprox`]: crate::optimizer::EvaluationMode::FastApprox

use super::{MathFunction, MathSite};
use crate::ast::{Call, Expr};
use crate::ast::purity::is_pure;
use crate::value::Number;

use std::cmp::Ordering;

pub(super) fn rewrite(site: &MathSite) -> Option<Expr> {
  match site.function {
    MathFunction::Clamp => clamp(site),
    MathFunction::Max | MathFunction::Min => extremum(site),
    _ => None,
  }
}

fn clamp(site: &MathSite) -> Option<Expr> {
  let (lo, hi) = (site.arg(1), site.arg(2));
  if !is_pure(lo) || !is_pure(hi) {
    return None;
  }
  nested_clamp(site)
    .or_else(|| equal_bounds(site))
    .or_else(|| {
      (site.is_fast() && site.is_floating()).then(|| site.build("ClampNative", site.args().to_vec()))
    })
}

/// `Clamp(Clamp(y, lo, hi), lo, hi)`, `Clamp(Min(y, hi), lo, hi)` and
/// `Clamp(Max(y, lo), lo, hi)` are all `Clamp(y, lo, hi)`.
fn nested_clamp(site: &MathSite) -> Option<Expr> {
  let (lo, hi) = (site.arg(1), site.arg(2));
  let inner = site.typed_call(site.arg(0))?;
  let y = match inner.name.as_str() {
    "Clamp" | "ClampNative" => {
      (same(&inner.args[1], lo) && same(&inner.args[2], hi)).then(|| &inner.args[0])?
    }
    "Min" | "MinNative" if is_safe_bound(site, hi) => other_operand(inner, hi)?,
    "Max" | "MaxNative" if is_safe_bound(site, lo) => other_operand(inner, lo)?,
    _ => return None,
  };
  Some(site.build(&site.ctx.call().name, vec![site.convert(y), lo.clone(), hi.clone()]))
}

/// With `lo == hi` the result is the bound itself, except that a float
/// clamp passes NaN through.
fn equal_bounds(site: &MathSite) -> Option<Expr> {
  if site.is_floating() && !site.is_fast() {
    return None;
  }
  if !is_pure(site.arg(0)) {
    return None;
  }
  let (lo, hi) = (site.arg(1), site.arg(2));
  match (site.literal(1), site.literal(2)) {
    (Some(a), Some(b)) if a == b && !a.is_nan() => Some(Expr::number(a)),
    _ if same(lo, hi) => Some(site.convert(lo)),
    _ => None,
  }
}

fn extremum(site: &MathSite) -> Option<Expr> {
  clamp_pattern(site)
    .or_else(|| flatten(site))
    .or_else(|| {
      if !site.is_fast() || !site.is_floating() {
        return None;
      }
      let native = if site.function == MathFunction::Max { "MaxNative" } else { "MinNative" };
      Some(site.build(native, site.args().to_vec()))
    })
}

/// `Max(Min(y, hi), lo)` and `Min(Max(y, lo), hi)`, in either argument
/// order, with constant bounds `lo <= hi`, are `Clamp(y, lo, hi)`.
fn clamp_pattern(site: &MathSite) -> Option<Expr> {
  let inner_names: &[&str] = match site.function {
    MathFunction::Max => &["Min", "MinNative"],
    _ => &["Max", "MaxNative"],
  };
  let (inner, outer_bound) = (0..2).find_map(|i| {
    let call = site.typed_call(site.arg(i)).filter(|c| inner_names.contains(&c.name.as_str()))?;
    Some((call, site.arg(1 - i)))
  })?;
  let (inner_index, inner_bound) = constant_operand(site, inner)?;
  let y = &inner.args[1 - inner_index];
  let outer_value = bound_value(site, outer_bound)?;
  let (lo, hi) = match site.function {
    MathFunction::Max => (outer_value, inner_bound),
    _ => (inner_bound, outer_value),
  };
  if lo.compare(&hi) == Some(Ordering::Greater) {
    return None;
  }
  Some(site.build("Clamp", vec![site.convert(y), Expr::number(lo), Expr::number(hi)]))
}

/// `Max(Max(y, a), b)` to `Max(y, c)` with `c = Max(a, b)` folded.
fn flatten(site: &MathSite) -> Option<Expr> {
  let own = site.ctx.call().name.as_str();
  let (inner, outer_bound) = (0..2).find_map(|i| {
    let call = site.typed_call(site.arg(i)).filter(|c| same_extremum(own, &c.name))?;
    Some((call, site.arg(1 - i)))
  })?;
  let (inner_index, inner_bound) = constant_operand(site, inner)?;
  let outer_value = bound_value(site, outer_bound)?;
  let y = &inner.args[1 - inner_index];
  let combined = site.build(own, vec![Expr::number(inner_bound), Expr::number(outer_value)]);
  let folded = site.ctx.fold_number(&combined)?.convert(site.ty).ok()?;
  Some(site.build(own, vec![site.convert(y), Expr::number(folded)]))
}

fn same_extremum(outer: &str, inner: &str) -> bool {
  match outer {
    "Max" | "MaxNative" => matches!(inner, "Max" | "MaxNative"),
    _ => matches!(inner, "Min" | "MinNative"),
  }
}

/// The operand of a two-argument call that folds to a usable bound, and
/// its value.
fn constant_operand(site: &MathSite, call: &Call) -> Option<(usize, Number)> {
  (0..2).find_map(|i| bound_value(site, &call.args[i]).map(|n| (i, n)))
}

fn bound_value(site: &MathSite, expr: &Expr) -> Option<Number> {
  if !is_pure(expr) {
    return None;
  }
  let value = site.ctx.fold_number(expr)?.convert(site.ty).ok()?;
  is_safe_value(site, &value).then_some(value)
}

fn is_safe_bound(site: &MathSite, expr: &Expr) -> bool {
  if !site.is_floating() {
    return true;
  }
  site.ctx
    .fold_number(expr)
    .and_then(|n| n.convert(site.ty).ok())
    .is_some_and(|n| is_safe_value(site, &n))
}

fn is_safe_value(site: &MathSite, value: &Number) -> bool {
  !site.is_floating() || (!value.is_nan() && (site.is_fast() || !value.is_zero()))
}

/// The operand of `call` other than the one structurally equal to
/// `bound`.
fn other_operand<'e>(call: &'e Call, bound: &Expr) -> Option<&'e Expr> {
  if same(&call.args[1], bound) {
    Some(&call.args[0])
  } else if same(&call.args[0], bound) {
    Some(&call.args[1])
  } else {
    None
  }
}

fn same(a: &Expr, b: &Expr) -> bool {
  a.unparen() == b.unparen()
}
