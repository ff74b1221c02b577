
//! Counting and existence tests: `Count`, `LongCount`, `Any`, `All`,
//! `Contains` and `SequenceEqual`.

use super::{fusion, SequenceStage, StageSite};
use crate::ast::{BinaryOp, Call, Expr, Lambda, NumericType, TypeRef};
use crate::ast::purity::is_pure;
use crate::ast::walker::mentions;

pub(super) fn rewrite(site: &StageSite) -> Option<Expr> {
  use SequenceStage::*;
  match site.stage {
    Count | LongCount => count(site),
    Any => any(site),
    All => all(site),
    Contains => contains(site),
    SequenceEqual => sequence_equal(site),
    _ => None,
  }
}

/// `Where(p).S()` to `S(p)`, and `Where(p).S(q)` to `S(x => p && q)`,
/// for a terminal `S` with an optional predicate.
pub(super) fn fuse_predicate(site: &StageSite) -> Option<Expr> {
  let (source, mut predicates) = fusion::filters(site, site.receiver);
  if predicates.is_empty() {
    return None;
  }
  if !site.args().is_empty() {
    predicates.push(site.lambda(0).filter(|l| l.single_param().is_some())?);
  }
  let fused = fusion::conjunction(site, &predicates)?;
  Some(site.stage_on(source, site.name(), vec![fused]))
}

/// `S(x => true)` to `S()`, and `S(x => false)` to `when_false`.
fn literal_predicate(site: &StageSite, when_false: Expr) -> Option<Expr> {
  match site.literal_predicate(0)? {
    true => Some(site.stage_on(site.receiver, site.name(), Vec::new())),
    false => site.droppable(site.receiver).then_some(when_false),
  }
}

fn count(site: &StageSite) -> Option<Expr> {
  let counting_all = site.args().is_empty();
  if !counting_all {
    if let Some(rewritten) = literal_predicate(site, site.count_literal(0)?) {
      return Some(rewritten);
    }
  }
  if let Some(fused) = fuse_predicate(site) {
    return Some(fused);
  }
  if counting_all {
    if let Some(rewritten) = count_upstream(site) {
      return Some(rewritten);
    }
  }
  let source = site.skip(site.receiver, |stage, _| {
    stage.is_sort() || stage == SequenceStage::Reverse || stage.is_materializing() ||
      (counting_all && stage == SequenceStage::Select)
  });
  if counting_all {
    if let Some(length) = length(site, source) {
      return Some(length);
    }
  }
  (!std::ptr::eq(source, site.receiver)).then(|| site.rebuild(source))
}

/// Stages whose element count follows from their source's.
fn count_upstream(site: &StageSite) -> Option<Expr> {
  let (stage, call) = site.upstream()?;
  let source = call.receiver()?;
  let source_count = || site.stage_on(source, site.name(), Vec::new());
  match stage {
    SequenceStage::DefaultIfEmpty if call.args.iter().all(is_pure) => {
      let one = site.count_literal(1)?;
      Some(Expr::Call(Call::on_type(TypeRef::named("Math"), "Max", vec![source_count(), one])))
    }
    SequenceStage::Chunk => {
      let size = site.literal_int(call, 0).filter(|n| *n >= 1)?;
      if size == 1 {
        return Some(source_count());
      }
      let rounded_up = Expr::binary(BinaryOp::Add, source_count(), site.count_literal(size - 1)?);
      Some(Expr::binary(BinaryOp::Div, rounded_up, site.count_literal(size)?))
    }
    SequenceStage::Distinct => {
      let inner = distinct_without_ordering(site, call)?;
      Some(site.rebuild(&inner))
    }
    _ => None,
  }
}

/// Under a stage that ignores order, the `Distinct` call `distinct` with
/// the sorts and copies before it dropped, and then optimized as a
/// `Distinct` call in its own right.
fn distinct_without_ordering(site: &StageSite, distinct: &Call) -> Option<Expr> {
  let receiver = distinct.receiver()?;
  let source = site.skip(receiver, |stage, _| stage.is_sort() || stage.is_materializing());
  if std::ptr::eq(source, receiver) {
    return None;
  }
  Some(site.ctx.optimize(Call::on(source.clone(), "Distinct", Vec::new())))
}

/// `source.Length`, or `source.Count`, for an indexable source.
fn length(site: &StageSite, source: &Expr) -> Option<Expr> {
  let member = site.ctx.resolve_type(source)?.length_member()?;
  let length = Expr::member(source.clone(), member);
  match site.stage {
    SequenceStage::LongCount => Some(Expr::cast(NumericType::Int64.into(), length)),
    _ => Some(length),
  }
}

fn any(site: &StageSite) -> Option<Expr> {
  let testing_all = site.args().is_empty();
  if !testing_all {
    if let Some(rewritten) = literal_predicate(site, Expr::bool(false)) {
      return Some(rewritten);
    }
  }
  if testing_all {
    if let Some(contains) = membership_test(site) {
      return Some(contains);
    }
  }
  if let Some(fused) = fuse_predicate(site) {
    return Some(fused);
  }
  if let Some(inner) = site.upstream_is(SequenceStage::Distinct) {
    if let Some(inner) = distinct_without_ordering(site, inner) {
      return Some(site.rebuild(&inner));
    }
  }
  let source = site.skip(site.receiver, |stage, _| {
    stage.is_sort() || stage.is_materializing() || stage == SequenceStage::Distinct ||
      (testing_all && stage == SequenceStage::Select)
  });
  if testing_all {
    if let Some(length) = length(site, source) {
      return Some(Expr::binary(BinaryOp::Gt, length, Expr::int(0)));
    }
  }
  (!std::ptr::eq(source, site.receiver)).then(|| site.rebuild(source))
}

/// `Where(x => x == v).Any()` to `Contains(v)`, for elements whose
/// equality is exact.
fn membership_test(site: &StageSite) -> Option<Expr> {
  let filter = site.upstream_is(SequenceStage::Where)?;
  let lambda = filter.args[0].unparen().as_lambda()?;
  let value = compared_value(lambda)?;
  if !has_exact_equality(&site.element) || site.ctx.resolve_type(value).as_ref() != Some(&site.element) {
    return None;
  }
  Some(site.stage_on(filter.receiver()?, "Contains", vec![value.clone()]))
}

/// `v` in `x => x == v` or `x => v == x`, when `v` is pure and does not
/// depend on `x`.
fn compared_value(lambda: &Lambda) -> Option<&Expr> {
  let param = lambda.single_param()?;
  let Expr::Binary(BinaryOp::Eq, lhs, rhs) = lambda.body.unparen() else {
    return None;
  };
  let value = if lhs.unparen().as_ident() == Some(param) {
    rhs.as_ref()
  } else if rhs.unparen().as_ident() == Some(param) {
    lhs.as_ref()
  } else {
    return None;
  };
  (is_pure(value) && !mentions(value, param)).then_some(value)
}

/// Types whose `==` agrees with the default equality comparer.
fn has_exact_equality(ty: &TypeRef) -> bool {
  match ty {
    TypeRef::Numeric(t) => t.is_integer(),
    TypeRef::Bool | TypeRef::Char | TypeRef::String => true,
    _ => false,
  }
}

fn all(site: &StageSite) -> Option<Expr> {
  let (source, filters) = fusion::filters(site, site.receiver);
  if !filters.is_empty() {
    let conclusion = site.lambda(0).filter(|l| l.single_param().is_some())?;
    let fused = fusion::implication(site, &filters, conclusion)?;
    return Some(site.stage_on(source, "All", vec![fused]));
  }
  if let Some(inner) = site.upstream_is(SequenceStage::Distinct) {
    if let Some(inner) = distinct_without_ordering(site, inner) {
      return Some(site.rebuild(&inner));
    }
  }
  site.skip_receiver(|stage, _| {
    stage.is_sort() || stage.is_materializing() || stage == SequenceStage::Distinct
  })
}

fn contains(site: &StageSite) -> Option<Expr> {
  site.skip_receiver(|stage, _| {
    stage.is_sort() || stage.is_materializing() || stage == SequenceStage::Distinct || stage == SequenceStage::Reverse
  })
}

fn sequence_equal(site: &StageSite) -> Option<Expr> {
  let other = site.arg(0)?;
  if site.same(site.receiver, other) {
    return Some(Expr::bool(true));
  }
  (site.is_empty_source(site.receiver) && site.is_empty_source(other)).then(|| Expr::bool(true))
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use crate::optimizer::EvaluationMode;
  use crate::value::{Number, Value};

  #[test]
  fn test_count_fuses_filter_chain() {
    let session = sequences(EvaluationMode::Exact);
    let source = "xs.Where(x => x % 2 == 0).Where(x => x > 2).Count()";
    let rewritten = rewrite(&session, source).unwrap();
    assert_eq!(rewritten.to_string(), "xs.Count(x => x % 2 == 0 && x > 2)");
    let result = eval_with(&session, &rewritten, &[("xs", ints(&[1, 2, 3, 4, 5, 6]))]).unwrap();
    assert_eq!(result, Some(Value::Number(Number::Int32(2))));
    assert_same_results(&session, source, &[&[1, 2, 3, 4, 5, 6], &[], &[8, 8]]);
    assert_eq!(
      rewrite_str(&session, "xs.Where(x => x > 0).Count(y => y < n)").unwrap(),
      "xs.Count(x => x > 0 && x < n)",
    );
  }

  #[test]
  fn test_count_literal_predicates() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Count(x => true)").unwrap(), "e.Count()");
    assert_eq!(rewrite_str(&session, "e.Count(x => false)").unwrap(), "0");
    assert_eq!(rewrite_str(&session, "e.LongCount(x => false)").unwrap(), "0L");
  }

  #[test]
  fn test_count_skips_order_insensitive_stages() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.OrderBy(x => -x).Reverse().Count()").unwrap(), "e.Count()");
    assert_eq!(rewrite_str(&session, "e.Select(x => x * 2).Count()").unwrap(), "e.Count()");
    assert_eq!(
      rewrite_str(&session, "e.Select(x => x * 2).Count(x => x > 2)"),
      None,
    );
    assert_eq!(rewrite_str(&session, "e.Select(x => 10 / x).ToList().Count(x => x > 2)").unwrap(), "e.Select(x => 10 / x).Count(x => x > 2)");
  }

  #[test]
  fn test_count_of_indexable_source() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "xs.Count()").unwrap(), "xs.Length");
    assert_eq!(rewrite_str(&session, "list.Count()").unwrap(), "list.Count");
    assert_eq!(rewrite_str(&session, "xs.LongCount()").unwrap(), "(long)xs.Length");
    assert_eq!(rewrite_str(&session, "xs.Order().Count()").unwrap(), "xs.Length");
    assert_same_results(&session, "xs.Order().Count()", &[&[3, 1], &[]]);
  }

  #[test]
  fn test_count_through_reshaping_stages() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.DefaultIfEmpty().Count()").unwrap(), "Math.Max(e.Count(), 1)");
    assert_same_results(&session, "xs.DefaultIfEmpty().Count()", &[&[], &[1, 2, 3]]);
    assert_eq!(rewrite_str(&session, "e.Chunk(3).Count()").unwrap(), "(e.Count() + 2) / 3");
    assert_same_results(&session, "xs.Chunk(3).Count()", &[&[], &[1], &[1, 2, 3], &[1, 2, 3, 4]]);
    assert_eq!(rewrite_str(&session, "e.Chunk(0).Count()"), None);
    assert_eq!(rewrite_str(&session, "e.Order().Distinct().Count()").unwrap(), "e.Distinct().Count()");
  }

  #[test]
  fn test_any() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Where(x => x > n).Any()").unwrap(), "e.Any(x => x > n)");
    assert_eq!(rewrite_str(&session, "e.Where(x => x == v).Any()").unwrap(), "e.Contains(v)");
    assert_eq!(rewrite_str(&session, "e.Where(x => 3 == x).Any()").unwrap(), "e.Contains(3)");
    assert_eq!(rewrite_str(&session, "e.Any(x => false)").unwrap(), "false");
    assert_eq!(rewrite_str(&session, "e.Any(x => true)").unwrap(), "e.Any()");
    assert_eq!(rewrite_str(&session, "e.OrderBy(x => x).Select(x => x + 1).Any()").unwrap(), "e.Any()");
    assert_eq!(rewrite_str(&session, "list.Any()").unwrap(), "list.Count > 0");
    assert_same_results(&session, "xs.Where(x => x == 2).Any()", &[&[1, 2], &[1], &[]]);
  }

  #[test]
  fn test_any_keeps_floating_equality() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "ds.Where(x => x == 0.0).Any()").unwrap(), "ds.Any(x => x == 0.0)");
  }

  #[test]
  fn test_all_fuses_as_implication() {
    let session = sequences(EvaluationMode::Exact);
    let source = "xs.Where(x => x > 0).All(x => x % 2 == 0)";
    assert_eq!(rewrite_str(&session, source).unwrap(), "xs.All(x => !(x > 0) || x % 2 == 0)");
    assert_same_results(&session, source, &[&[-1, 2, 4], &[1, 2], &[]]);
    assert_eq!(rewrite_str(&session, "e.Distinct().ToList().All(x => x > 0)").unwrap(), "e.All(x => x > 0)");
  }

  #[test]
  fn test_contains_and_sequence_equal() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Reverse().Distinct().Contains(v)").unwrap(), "e.Contains(v)");
    assert_eq!(rewrite_str(&session, "xs.SequenceEqual(xs)").unwrap(), "true");
    assert_eq!(rewrite_str(&session, "xs.SequenceEqual(ys)"), None);
  }
}
