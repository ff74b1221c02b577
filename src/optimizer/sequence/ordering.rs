
//! Sorting and reordering stages.
//!
//! The sorts are stable: elements whose keys compare equal keep the
//! order they arrived in. Dropping a stage in front of a sort is only
//! exact when nothing downstream can observe that arrival order, which
//! holds when equal elements are indistinguishable.

use super::{SequenceStage, StageSite};
use crate::ast::{Expr, TypeRef};
use crate::ast::purity::{is_identity_lambda, is_pure_lambda};

pub(super) fn rewrite(site: &StageSite) -> Option<Expr> {
  use SequenceStage::*;
  match site.stage {
    Order | OrderDescending => sort(site),
    OrderBy | OrderByDescending => sort_by(site),
    ThenBy | ThenByDescending => then_by(site),
    Shuffle => site.skip_receiver(|stage, _| {
      stage.is_materializing() || stage.is_sort() || stage == SequenceStage::Reverse
    }),
    Reverse => site.skip_materializing(),
    _ => None,
  }
}

/// Elements for which equality under the default comparer means
/// identity.
fn has_plain_elements(site: &StageSite) -> bool {
  site.has_integer_elements() || matches!(site.element, TypeRef::Bool | TypeRef::Char)
}

/// A whole-element sort replaces any earlier whole-element sort, since
/// both group ties the same way and keep them in source order. With
/// plain elements it replaces any earlier reordering at all.
fn sort(site: &StageSite) -> Option<Expr> {
  let plain = has_plain_elements(site);
  site.skip_receiver(|stage, call| {
    stage.is_materializing() ||
      matches!(stage, SequenceStage::Order | SequenceStage::OrderDescending) ||
      (plain && (stage.is_sort() || matches!(stage, SequenceStage::Reverse | SequenceStage::Shuffle)) &&
        call.type_args.is_empty())
  })
}

/// `OrderBy(x => x)` is `Order()`.
fn sort_by(site: &StageSite) -> Option<Expr> {
  if site.lambda(0).is_some_and(is_identity_lambda) {
    let name = if site.stage == SequenceStage::OrderBy { "Order" } else { "OrderDescending" };
    return Some(site.stage_on(site.receiver, name, Vec::new()));
  }
  site.skip_materializing()
}

/// After a whole-element sort of plain elements every tie is a run of
/// identical values, so a secondary key cannot reorder anything.
fn then_by(site: &StageSite) -> Option<Expr> {
  let (stage, _) = site.upstream()?;
  if !matches!(stage, SequenceStage::Order | SequenceStage::OrderDescending) || !has_plain_elements(site) {
    return None;
  }
  let key = site.lambda(0)?;
  is_pure_lambda(key).then(|| site.receiver.clone())
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use crate::optimizer::EvaluationMode;

  #[test]
  fn test_identity_key_sorts() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.OrderBy(x => x)").unwrap(), "e.Order()");
    assert_eq!(rewrite_str(&session, "e.OrderByDescending(y => y)").unwrap(), "e.OrderDescending()");
    assert_eq!(rewrite_str(&session, "e.OrderBy(x => -x)"), None);
    assert_same_results(&session, "xs.OrderByDescending(x => x)", &[&[3, 1, 2], &[]]);
  }

  #[test]
  fn test_sort_replaces_earlier_sorts() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Order().OrderDescending()").unwrap(), "e.OrderDescending()");
    assert_eq!(rewrite_str(&session, "ds.OrderDescending().Order()").unwrap(), "ds.Order()");
    assert_eq!(rewrite_str(&session, "e.OrderBy(x => -x).Reverse().Order()").unwrap(), "e.Order()");
    assert_eq!(rewrite_str(&session, "ds.OrderBy(x => -x).Order()"), None);
    assert_same_results(&session, "xs.Reverse().Order()", &[&[5, 1, 5, 3]]);
  }

  #[test]
  fn test_then_by_after_whole_element_sort() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Order().ThenBy(x => -x)").unwrap(), "e.Order()");
    assert_eq!(rewrite_str(&session, "e.OrderDescending().ThenByDescending(x => x % 3)").unwrap(), "e.OrderDescending()");
    assert_eq!(rewrite_str(&session, "ds.Order().ThenBy(x => -x)"), None);
    assert_eq!(rewrite_str(&session, "e.OrderBy(x => x % 2).ThenBy(x => -x)"), None);
    assert_same_results(&session, "xs.Order().ThenBy(x => -x)", &[&[2, 2, 1]]);
  }

  #[test]
  fn test_shuffle_ignores_earlier_order() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "ds.OrderBy(x => -x).Reverse().Shuffle()").unwrap(), "ds.Shuffle()");
  }

  #[test]
  fn test_reverse_skips_materializing() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.ToArray().Reverse()").unwrap(), "e.Reverse()");
  }
}
