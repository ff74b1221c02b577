
//! `Skip` and `Take` and their `Last` forms, plus the stages that copy
//! a sequence into a collection.

use super::{SequenceStage, StageSite};
use crate::ast::Expr;

pub(super) fn rewrite(site: &StageSite) -> Option<Expr> {
  use SequenceStage::*;
  match site.stage {
    Skip | SkipLast => skip(site),
    Take | TakeLast => take(site),
    ToHashSet => site.skip_receiver(|stage, _| stage.is_materializing() || stage == Distinct),
    DefaultIfEmpty | ToArray | ToList | GroupBy => site.skip_materializing(),
    _ => None,
  }
}

/// The count of a `Skip` or `Take` stage; negative counts act as zero.
fn count(site: &StageSite) -> Option<i64> {
  site.literal_int(site.call(), 0)
}

fn skip(site: &StageSite) -> Option<Expr> {
  let n = count(site);
  if n.is_some_and(|n| n <= 0) {
    return Some(site.receiver.clone());
  }
  if let (Some(n), Some(inner)) = (n, site.upstream_is(site.stage)) {
    let total = site.literal_int(inner, 0)
      .filter(|m| *m >= 0)
      .and_then(|m| i32::try_from(m + n).ok());
    if let Some(total) = total {
      return Some(site.stage_on(inner.receiver()?, site.name(), vec![Expr::int(total)]));
    }
  }
  site.skip_materializing()
}

fn take(site: &StageSite) -> Option<Expr> {
  let n = count(site);
  if n.is_some_and(|n| n <= 0) {
    return site.empty_dropping(site.receiver);
  }
  if let (Some(n), Some(inner)) = (n, site.upstream_is(site.stage)) {
    if let Some(m) = site.literal_int(inner, 0) {
      let fewest = i32::try_from(n.min(m)).ok()?;
      return Some(site.stage_on(inner.receiver()?, site.name(), vec![Expr::int(fewest)]));
    }
  }
  site.skip_materializing()
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use crate::optimizer::EvaluationMode;

  #[test]
  fn test_skip() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Skip(0)").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "e.SkipLast(-3)").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "e.Skip(1).Skip(2)").unwrap(), "e.Skip(3)");
    assert_eq!(rewrite_str(&session, "e.SkipLast(1).SkipLast(2)").unwrap(), "e.SkipLast(3)");
    assert_eq!(rewrite_str(&session, "e.Skip(-1).Skip(2)"), None);
    assert_eq!(rewrite_str(&session, "e.Skip(2147483647).Skip(1)"), None);
    assert_eq!(rewrite_str(&session, "e.ToList().Skip(n)").unwrap(), "e.Skip(n)");
    assert_same_results(&session, "xs.Skip(1).Skip(1)", &[&[1, 2, 3], &[1], &[]]);
  }

  #[test]
  fn test_take() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Take(0)").unwrap(), "Enumerable.Empty<int>()");
    assert_eq!(rewrite_str(&session, "e.Take(5).Take(2)").unwrap(), "e.Take(2)");
    assert_eq!(rewrite_str(&session, "e.TakeLast(2).TakeLast(5)").unwrap(), "e.TakeLast(2)");
    assert_eq!(rewrite_str(&session, "e.Take(-4).Take(2)").unwrap(), "e.Take(-4)");
    assert_eq!(rewrite_str(&session, "e.Take(n)"), None);
    assert_eq!(rewrite_str(&session, "xs.Select(x => x / v).Take(0)"), None);
    assert_same_results(&session, "xs.Take(3).Take(2)", &[&[1, 2, 3, 4], &[1]]);
  }

  #[test]
  fn test_collections_skip_copies() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "xs.ToList().ToArray()").unwrap(), "xs.ToArray()");
    assert_eq!(rewrite_str(&session, "e.AsEnumerable().ToList()").unwrap(), "e.ToList()");
    assert_eq!(rewrite_str(&session, "e.Distinct().ToArray().ToHashSet()").unwrap(), "e.ToHashSet()");
    assert_eq!(rewrite_str(&session, "e.ToList().DefaultIfEmpty()").unwrap(), "e.DefaultIfEmpty()");
    assert_eq!(rewrite_str(&session, "e.ToArray().GroupBy(x => x % 2)").unwrap(), "e.GroupBy(x => x % 2)");
    assert_eq!(rewrite_str(&session, "e.ToList()"), None);
  }
}
