
//! Element-wise stages: filters, projections and conversions.

use super::{fusion, SequenceStage, StageSite};
use crate::ast::{Expr, Lambda, TypeRef};
use crate::ast::purity::is_identity_lambda;

pub(super) fn rewrite(site: &StageSite) -> Option<Expr> {
  use SequenceStage::*;
  match site.stage {
    Where => filter(site),
    Select => select(site),
    SelectMany => select_many(site),
    TakeWhile => while_stage(site, true),
    SkipWhile => while_stage(site, false),
    Cast => cast(site),
    OfType => of_type(site),
    Chunk => chunk(site),
    AsEnumerable => as_enumerable(site),
    _ => None,
  }
}

fn filter(site: &StageSite) -> Option<Expr> {
  match site.literal_predicate(0) {
    Some(true) => return Some(site.receiver.clone()),
    Some(false) => return site.empty_dropping(site.receiver),
    None => {}
  }
  fuse_filters(site).or_else(|| site.skip_materializing())
}

/// `xs.Where(p).Where(q)` to `xs.Where(x => p && q)`.
fn fuse_filters(site: &StageSite) -> Option<Expr> {
  let (source, mut predicates) = fusion::filters(site, site.receiver);
  if predicates.is_empty() {
    return None;
  }
  predicates.push(site.lambda(0).filter(|l| l.single_param().is_some())?);
  let fused = fusion::conjunction(site, &predicates)?;
  Some(site.stage_on(source, "Where", vec![fused]))
}

fn select(site: &StageSite) -> Option<Expr> {
  let g = site.lambda(0)?;
  if is_identity_lambda(g) || is_same_type_cast(g, &site.element) {
    return Some(site.receiver.clone());
  }
  if let Some(inner) = site.upstream_is(SequenceStage::Select) {
    let f = inner.args[0].unparen().as_lambda()?;
    if let Some(composed) = fusion::compose(f, g) {
      return Some(site.stage_on(inner.receiver()?, "Select", vec![composed]));
    }
  }
  site.skip_materializing()
}

/// `x => (T)x` where the elements are already `T`.
fn is_same_type_cast(lambda: &Lambda, element: &TypeRef) -> bool {
  let Some(param) = lambda.single_param() else {
    return false;
  };
  match lambda.body.unparen() {
    Expr::Cast(ty, operand) => ty == element && operand.unparen().as_ident() == Some(param),
    _ => false,
  }
}

fn select_many(site: &StageSite) -> Option<Expr> {
  if site.is_empty_source(site.receiver) {
    return site.empty();
  }
  site.skip_materializing()
}

/// A constant predicate either keeps every element or none of them.
fn while_stage(site: &StageSite, take: bool) -> Option<Expr> {
  let keeps_all = site.literal_predicate(0)? == take;
  if keeps_all { Some(site.receiver.clone()) } else { site.empty_dropping(site.receiver) }
}

fn cast(site: &StageSite) -> Option<Expr> {
  if site.call().type_args.first() == Some(&site.element) {
    return Some(site.receiver.clone());
  }
  site.skip_materializing()
}

/// A numeric `Cast<T>()` never yields null, so a following `OfType<T>()`
/// keeps everything.
fn of_type(site: &StageSite) -> Option<Expr> {
  let inner = site.upstream_is(SequenceStage::Cast)?;
  let ty = site.call().type_args.first()?;
  (ty.is_numeric() && inner.type_args.first() == Some(ty)).then(|| site.receiver.clone())
}

/// `Chunk(1)` to one-element arrays.
fn chunk(site: &StageSite) -> Option<Expr> {
  if site.literal_int(site.call(), 0) == Some(1) {
    let x = site.ctx.fresh_name("x");
    let singleton = Expr::ArrayLit(Some(site.element.clone()), vec![Expr::ident(x.clone())]);
    return Some(site.stage_on(site.receiver, "Select", vec![Expr::lambda(x, singleton)]));
  }
  site.skip_materializing()
}

/// `AsEnumerable()` on what is already exactly an `IEnumerable<T>`.
fn as_enumerable(site: &StageSite) -> Option<Expr> {
  let ty = site.ctx.resolve_type(site.receiver)?;
  (&ty == site.return_type()).then(|| site.receiver.clone())
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use crate::optimizer::EvaluationMode;

  #[test]
  fn test_where_literal_predicates() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Where(x => true)").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "xs.Where(x => true)").unwrap(), "xs.AsEnumerable()");
    assert_eq!(rewrite_str(&session, "xs.Where(x => false)").unwrap(), "Enumerable.Empty<int>()");
    assert_eq!(rewrite_str(&session, "xs.Where(x => 1 > 2)").unwrap(), "Enumerable.Empty<int>()");
  }

  #[test]
  fn test_where_false_keeps_effectful_receiver() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "xs.Select(x => x / v).Where(x => false)"), None);
  }

  #[test]
  fn test_where_chain_fuses() {
    let session = sequences(EvaluationMode::Exact);
    let source = "xs.Where(x => x % 2 == 0).Where(y => y > 2)";
    assert_eq!(rewrite_str(&session, source).unwrap(), "xs.Where(x => x % 2 == 0 && x > 2)");
    assert_same_results(&session, source, &[&[1, 2, 3, 4, 5, 6], &[], &[2]]);
    assert_eq!(
      rewrite_str(&session, "xs.Where(x => x > 0).Where(x => x > n).Where(x => x < 9)").unwrap(),
      "xs.Where(x => x > 0 && x > n && x < 9)",
    );
  }

  #[test]
  fn test_where_skips_materializing() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "xs.ToList().AsEnumerable().Where(x => x > n)").unwrap(), "xs.Where(x => x > n)");
  }

  #[test]
  fn test_select_identity_and_composition() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Select(x => x)").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "e.Select(x => (int)x)").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "e.Select(x => (long)x)"), None);
    let source = "xs.Select(x => x + 1).Select(y => y * 2)";
    assert_eq!(rewrite_str(&session, source).unwrap(), "xs.Select(x => (x + 1) * 2)");
    assert_same_results(&session, source, &[&[1, 2, 3], &[]]);
  }

  #[test]
  fn test_while_stages() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.TakeWhile(x => true)").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "e.TakeWhile(x => false)").unwrap(), "Enumerable.Empty<int>()");
    assert_eq!(rewrite_str(&session, "e.SkipWhile(x => false)").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "e.SkipWhile(x => true)").unwrap(), "Enumerable.Empty<int>()");
    assert_eq!(rewrite_str(&session, "e.SkipWhile(x => x > 2)"), None);
  }

  #[test]
  fn test_select_many_of_empty() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(
      rewrite_str(&session, "new int[] { }.SelectMany(x => ys)").unwrap(),
      "Enumerable.Empty<int>()",
    );
  }

  #[test]
  fn test_casts() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Cast<int>()").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "xs.ToList().Cast<long>()").unwrap(), "xs.Cast<long>()");
    assert_eq!(rewrite_str(&session, "xs.Cast<long>().OfType<long>()").unwrap(), "xs.Cast<long>()");
    assert_eq!(rewrite_str(&session, "e.OfType<int>().OfType<int>()").unwrap(), "e.OfType<int>()");
  }

  #[test]
  fn test_chunk_of_one() {
    let session = sequences(EvaluationMode::Exact);
    let rewritten = rewrite_str(&session, "xs.Chunk(1)").unwrap();
    assert_eq!(rewritten, "xs.Select(x => new int[] { x })");
    assert_same_results(&session, "xs.Chunk(1).Count()", &[&[4, 5], &[]]);
  }

  #[test]
  fn test_as_enumerable() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.AsEnumerable()").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "xs.AsEnumerable().AsEnumerable()").unwrap(), "xs.AsEnumerable()");
    assert_eq!(rewrite_str(&session, "xs.AsEnumerable()"), None);
  }
}
