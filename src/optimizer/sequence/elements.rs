
//! Positional terminals: `First`, `Last`, `Single`, `ElementAt` and
//! their `OrDefault` forms.

use super::query::fuse_predicate;
use super::{SequenceStage, StageSite};
use crate::ast::{Call, Expr};
use crate::ast::purity::is_pure;

use std::rc::Rc;

pub(super) fn rewrite(site: &StageSite) -> Option<Expr> {
  use SequenceStage::*;
  match site.stage {
    First | FirstOrDefault => positional(site, End::Front),
    Last | LastOrDefault => positional(site, End::Back),
    Single | SingleOrDefault => fuse_predicate(site).or_else(|| site.skip_materializing()),
    ElementAt | ElementAtOrDefault => element_at(site),
    _ => None,
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
  Front,
  Back,
}

impl End {
  /// The same terminal taken from the other end.
  fn mirrored(self, name: &str) -> String {
    match self {
      End::Front => name.replacen("First", "Last", 1),
      End::Back => name.replacen("Last", "First", 1),
    }
  }
}

fn positional(site: &StageSite, end: End) -> Option<Expr> {
  let has_predicate = !site.args().is_empty();
  let throws_when_empty = matches!(site.stage, SequenceStage::First | SequenceStage::Last);
  if let Some(reverse) = site.upstream_is(SequenceStage::Reverse) {
    return Some(site.stage_on(reverse.receiver()?, &end.mirrored(site.name()), site.args().to_vec()));
  }
  if !has_predicate && throws_when_empty {
    if let Some(extremum) = sorted_extremum(site, end) {
      return Some(extremum);
    }
  }
  if let Some(fused) = fuse_predicate(site) {
    return Some(fused);
  }
  let source = site.skip(site.receiver, |stage, call| match stage {
    _ if stage.is_materializing() => true,
    SequenceStage::Distinct => end == End::Front,
    SequenceStage::Take => end == End::Front && !has_predicate && keeps_one(site, call),
    _ => false,
  });
  if !has_predicate && throws_when_empty && is_indexable(site, source) {
    let index = match end {
      End::Front => Expr::int(0),
      End::Back => Expr::FromEnd(Rc::new(Expr::int(1))),
    };
    return Some(Expr::index(source.clone(), index));
  }
  (!std::ptr::eq(source, site.receiver)).then(|| site.rebuild(source))
}

/// `Take(n)` with a literal `n >= 1` keeps the first element.
fn keeps_one(site: &StageSite, take: &Call) -> bool {
  site.literal_int(take, 0).is_some_and(|n| n >= 1)
}

/// The first element of an ascending sort of integers is the minimum,
/// and so on. Both throw the same exception on an empty source.
fn sorted_extremum(site: &StageSite, end: End) -> Option<Expr> {
  if !site.has_integer_elements() {
    return None;
  }
  let (stage, sort) = site.upstream()?;
  let name = match (stage, end) {
    (SequenceStage::Order, End::Front) | (SequenceStage::OrderDescending, End::Back) => "Min",
    (SequenceStage::Order, End::Back) | (SequenceStage::OrderDescending, End::Front) => "Max",
    _ => return None,
  };
  Some(site.stage_on(sort.receiver()?, name, Vec::new()))
}

fn is_indexable(site: &StageSite, source: &Expr) -> bool {
  site.ctx.resolve_type(source).is_some_and(|t| t.is_indexable())
}

fn element_at(site: &StageSite) -> Option<Expr> {
  let index = site.literal_int(site.call(), 0).filter(|n| *n >= 0);
  if let (Some(index), Some(skip)) = (index, site.upstream_is(SequenceStage::Skip)) {
    let skipped = site.literal_int(skip, 0).filter(|n| *n >= 0);
    if let Some(total) = skipped.and_then(|k| i32::try_from(k + index).ok()) {
      return Some(site.stage_on(skip.receiver()?, site.name(), vec![Expr::int(total)]));
    }
  }
  let source = site.skip(site.receiver, |stage, _| stage.is_materializing());
  let throws_out_of_range = site.stage == SequenceStage::ElementAt;
  if throws_out_of_range && is_indexable(site, source) && is_pure(&site.args()[0]) {
    return Some(Expr::index(source.clone(), site.args()[0].clone()));
  }
  if index == Some(0) {
    let first = if throws_out_of_range { "First" } else { "FirstOrDefault" };
    return Some(site.stage_on(source, first, Vec::new()));
  }
  (!std::ptr::eq(source, site.receiver)).then(|| site.rebuild(source))
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use crate::optimizer::EvaluationMode;

  #[test]
  fn test_first_of_indexable_source() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "xs.First()").unwrap(), "xs[0]");
    assert_eq!(rewrite_str(&session, "list.ToList().Last()").unwrap(), "list[^1]");
    assert_eq!(rewrite_str(&session, "xs.FirstOrDefault()"), None);
    assert_same_results(&session, "xs.Last()", &[&[1, 2, 3]]);
  }

  #[test]
  fn test_reverse_swaps_ends() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Reverse().First()").unwrap(), "e.Last()");
    assert_eq!(rewrite_str(&session, "e.Reverse().LastOrDefault(x => x > 1)").unwrap(), "e.FirstOrDefault(x => x > 1)");
  }

  #[test]
  fn test_sorted_ends_are_extrema() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Order().First()").unwrap(), "e.Min()");
    assert_eq!(rewrite_str(&session, "e.OrderDescending().First()").unwrap(), "e.Max()");
    assert_eq!(rewrite_str(&session, "e.Order().Last()").unwrap(), "e.Max()");
    assert_eq!(rewrite_str(&session, "e.Order().FirstOrDefault()"), None);
    assert_eq!(rewrite_str(&session, "ds.Order().First()"), None);
    assert_same_results(&session, "xs.Order().First()", &[&[4, -2, 9], &[]]);
  }

  #[test]
  fn test_first_skips_prefix_preserving_stages() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Distinct().Take(3).First()").unwrap(), "e.First()");
    assert_eq!(rewrite_str(&session, "e.Take(3).First(x => x > 2)"), None);
    assert_eq!(rewrite_str(&session, "e.Take(0).First()"), None);
    assert_eq!(rewrite_str(&session, "e.Distinct().Last()"), None);
    assert_eq!(rewrite_str(&session, "e.Where(x => x > n).First()").unwrap(), "e.First(x => x > n)");
  }

  #[test]
  fn test_single_fuses_filter() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Where(x => x > n).Single()").unwrap(), "e.Single(x => x > n)");
    assert_eq!(rewrite_str(&session, "e.ToArray().SingleOrDefault()").unwrap(), "e.SingleOrDefault()");
  }

  #[test]
  fn test_element_at() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Skip(2).ElementAt(3)").unwrap(), "e.ElementAt(5)");
    assert_eq!(rewrite_str(&session, "e.Skip(-2).ElementAt(3)"), None);
    assert_eq!(rewrite_str(&session, "xs.ElementAt(n)").unwrap(), "xs[n]");
    assert_eq!(rewrite_str(&session, "e.ElementAt(0)").unwrap(), "e.First()");
    assert_eq!(rewrite_str(&session, "e.ElementAtOrDefault(0)").unwrap(), "e.FirstOrDefault()");
    assert_eq!(rewrite_str(&session, "e.ToList().ElementAtOrDefault(n)").unwrap(), "e.ElementAtOrDefault(n)");
    assert_same_results(&session, "xs.Skip(1).ElementAt(1)", &[&[5, 6, 7]]);
  }
}
