
//! Set operations and the stages that join two sequences.

use super::{SequenceStage, StageSite};
use crate::ast::{Call, Expr};
use crate::ast::purity::{is_identity_lambda, is_pure};
use crate::value::Value;

use std::ptr;

pub(super) fn rewrite(site: &StageSite) -> Option<Expr> {
  use SequenceStage::*;
  match site.stage {
    Distinct => site.skip_receiver(|stage, call| {
      stage.is_materializing() || (stage == Select && call.args[0].unparen().as_lambda().is_some_and(is_identity_lambda))
    }),
    DistinctBy => distinct_by(site),
    Union => union(site),
    UnionBy => union_by(site),
    Intersect => intersect(site),
    Except => except(site),
    ExceptBy | IntersectBy => keyed_filter(site),
    Concat => concat(site),
    Append | Prepend => site.skip_materializing(),
    Zip => both_sides(site),
    _ => None,
  }
}

fn distinct(site: &StageSite, source: &Expr) -> Expr {
  site.ctx.optimize(Call::on(source.clone(), "Distinct", Vec::new()))
}

fn distinct_by(site: &StageSite) -> Option<Expr> {
  if site.lambda(0).is_some_and(is_identity_lambda) {
    return Some(distinct(site, site.receiver));
  }
  site.skip_materializing()
}

/// The argument that holds the other sequence.
fn other<'a>(site: &StageSite<'_, 'a>) -> Option<&'a Expr> {
  site.arg(0)
}

fn union(site: &StageSite) -> Option<Expr> {
  let other = other(site)?;
  if site.is_empty_source(site.receiver) {
    return Some(distinct(site, other));
  }
  if (site.is_empty_source(other) && site.droppable(other)) || site.same(site.receiver, other) {
    return Some(distinct(site, site.receiver));
  }
  site.skip_materializing()
}

fn union_by(site: &StageSite) -> Option<Expr> {
  let other = other(site)?;
  let key = site.arg(1)?.clone();
  if site.is_empty_source(site.receiver) {
    return Some(site.stage_on(other, "DistinctBy", vec![key]));
  }
  if site.is_empty_source(other) && site.droppable(other) {
    return Some(site.stage_on(site.receiver, "DistinctBy", vec![key]));
  }
  None
}

fn intersect(site: &StageSite) -> Option<Expr> {
  let other = other(site)?;
  if site.same(site.receiver, other) {
    return Some(distinct(site, site.receiver));
  }
  if (site.is_empty_source(site.receiver) && site.droppable(other)) ||
    (site.is_empty_source(other) && site.droppable(site.receiver))
  {
    return site.empty();
  }
  // a.Intersect(b).Intersect(c) keeps a's order, as does a.Intersect(b.Intersect(c))
  if let Some(inner) = site.upstream_is(SequenceStage::Intersect) {
    let (a, b) = (inner.receiver()?, &inner.args[0]);
    if is_pure(b) && is_pure(other) {
      let nested = site.stage_on(b, "Intersect", vec![other.clone()]);
      return Some(site.stage_on(a, "Intersect", vec![nested]));
    }
  }
  site.skip_materializing()
}

fn except(site: &StageSite) -> Option<Expr> {
  let other = other(site)?;
  if site.is_empty_source(other) && site.droppable(other) {
    return Some(distinct(site, site.receiver));
  }
  if (site.is_empty_source(site.receiver) && site.droppable(other)) || site.same(site.receiver, other) {
    return site.empty();
  }
  if let Some(inner) = site.upstream_is(SequenceStage::Except) {
    let (a, b) = (inner.receiver()?, &inner.args[0]);
    if is_pure(b) && is_pure(other) {
      let removed = site.stage_on(b, "Concat", vec![other.clone()]);
      return Some(site.stage_on(a, "Except", vec![removed]));
    }
  }
  // Except already drops duplicates from its receiver.
  site.skip_receiver(|stage, _| stage.is_materializing() || stage == SequenceStage::Distinct)
}

/// `ExceptBy` and `IntersectBy` on an empty receiver.
fn keyed_filter(site: &StageSite) -> Option<Expr> {
  let other = other(site)?;
  if site.is_empty_source(site.receiver) && site.droppable(other) {
    return site.empty();
  }
  None
}

fn concat(site: &StageSite) -> Option<Expr> {
  let other = other(site)?;
  let (front, back) = (site.items(site.receiver), site.items(other));
  if front.as_ref().is_some_and(Vec::is_empty) {
    return Some(other.clone());
  }
  if back.as_ref().is_some_and(Vec::is_empty) && site.droppable(other) {
    return Some(site.receiver.clone());
  }
  match (front, back) {
    (Some(front), Some(back)) => {
      let items = front.iter().chain(&back).map(Value::to_expr).collect::<Option<Vec<_>>>()?;
      return Some(Expr::ArrayLit(Some(site.element.clone()), items));
    }
    (_, Some(back)) if back.len() == 1 => {
      return Some(site.stage_on(site.receiver, "Append", vec![back[0].to_expr()?]));
    }
    _ => {}
  }
  both_sides(site)
}

/// Drops materializing stages from the receiver and from the other
/// sequence.
fn both_sides(site: &StageSite) -> Option<Expr> {
  let other = other(site)?;
  let transparent = |stage: SequenceStage, _: &Call| stage.is_materializing();
  let (source, second) = (site.skip(site.receiver, transparent), site.skip(other, transparent));
  if ptr::eq(source, site.receiver) && ptr::eq(second, other) {
    return None;
  }
  let call = site.call().with_receiver(source.clone()).with_args(vec![second.clone()]);
  Some(Expr::Call(call))
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use crate::optimizer::EvaluationMode;

  #[test]
  fn test_distinct() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.ToList().Select(x => x).Distinct()").unwrap(), "e.Distinct()");
    assert_eq!(rewrite_str(&session, "e.DistinctBy(x => x)").unwrap(), "e.Distinct()");
    assert_eq!(rewrite_str(&session, "e.ToArray().DistinctBy(x => x)").unwrap(), "e.Distinct()");
    assert_eq!(rewrite_str(&session, "e.DistinctBy(x => x % 3)"), None);
  }

  #[test]
  fn test_union() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "new int[] { }.Union(e)").unwrap(), "e.Distinct()");
    assert_eq!(rewrite_str(&session, "e.Union(new int[] { })").unwrap(), "e.Distinct()");
    assert_eq!(rewrite_str(&session, "e.Union(e)").unwrap(), "e.Distinct()");
    assert_eq!(rewrite_str(&session, "e.UnionBy(new int[] { }, x => x % 2)").unwrap(), "e.DistinctBy(x => x % 2)");
    assert_same_results(&session, "xs.Union(xs)", &[&[1, 2, 1, 3], &[]]);
  }

  #[test]
  fn test_intersect() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Intersect(e)").unwrap(), "e.Distinct()");
    assert_eq!(rewrite_str(&session, "e.Intersect(new int[] { })").unwrap(), "Enumerable.Empty<int>()");
    assert_eq!(rewrite_str(&session, "xs.Intersect(ys).Intersect(e)").unwrap(), "xs.Intersect(ys.Intersect(e))");
    assert_eq!(rewrite_str(&session, "xs.ToList().Intersect(ys)").unwrap(), "xs.Intersect(ys)");
  }

  #[test]
  fn test_except() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Except(new int[] { })").unwrap(), "e.Distinct()");
    assert_eq!(rewrite_str(&session, "new int[] { }.Except(e)").unwrap(), "Enumerable.Empty<int>()");
    assert_eq!(rewrite_str(&session, "e.Except(e)").unwrap(), "Enumerable.Empty<int>()");
    assert_eq!(rewrite_str(&session, "xs.Except(ys).Except(e)").unwrap(), "xs.Except(ys.Concat(e))");
    assert_eq!(rewrite_str(&session, "e.Distinct().Except(ys)").unwrap(), "e.Except(ys)");
    assert_same_results(&session, "xs.Distinct().Except(new[] { 2 })", &[&[1, 2, 1, 3, 3]]);
  }

  #[test]
  fn test_keyed_filters_of_empty() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "new int[] { }.ExceptBy(ys, x => x)").unwrap(), "Enumerable.Empty<int>()");
    assert_eq!(rewrite_str(&session, "e.IntersectBy(ys, x => x)"), None);
  }

  #[test]
  fn test_concat() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "new int[] { }.Concat(e)").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "e.Concat(new int[] { })").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "new[] { 1 }.Concat(new[] { 2, 3 })").unwrap(), "new int[] { 1, 2, 3 }.AsEnumerable()");
    assert_eq!(rewrite_str(&session, "e.Concat(new[] { 4 })").unwrap(), "e.Append(4)");
    assert_eq!(rewrite_str(&session, "xs.ToList().Concat(ys.ToArray())").unwrap(), "xs.Concat(ys)");
    assert_same_results(&session, "xs.Concat(new[] { 4 })", &[&[1, 2], &[]]);
  }

  #[test]
  fn test_zip_and_append() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.ToList().Zip(ys.AsEnumerable())").unwrap(), "e.Zip(ys)");
    assert_eq!(rewrite_str(&session, "e.ToArray().Prepend(n)").unwrap(), "e.Prepend(n)");
  }
}
