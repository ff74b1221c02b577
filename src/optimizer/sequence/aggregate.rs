
//! Reductions: `Aggregate`, `Sum`, `Average`, `Max`, `Min`, `MaxBy` and
//! `MinBy`.

use super::{SequenceStage, StageSite};
use crate::ast::{BinaryOp, Expr, NumericType, TypeRef};
use crate::ast::purity::{is_identity_lambda, is_pure};
use crate::value::Number;

pub(super) fn rewrite(site: &StageSite) -> Option<Expr> {
  use SequenceStage::*;
  match site.stage {
    Aggregate => aggregate(site),
    Sum | Average => reduction(site, false),
    Max | Min => reduction(site, true),
    MaxBy | MinBy => site.skip_materializing(),
    _ => None,
  }
}

/// `Aggregate(0.0, (a, v) => a + v)` over doubles is `Sum()`: both add
/// left to right starting from positive zero.
fn aggregate(site: &StageSite) -> Option<Expr> {
  if site.args().len() == 2 && site.element == TypeRef::Numeric(NumericType::Double) && is_double_sum(site) {
    return Some(site.stage_on(site.receiver, "Sum", Vec::new()));
  }
  site.skip_materializing()
}

fn is_double_sum(site: &StageSite) -> bool {
  let seed = &site.args()[0];
  let is_zero_seed = is_pure(seed) &&
    site.ctx.fold_number(seed).is_some_and(|n| matches!(n, Number::Double(_)) && n.is_positive_zero());
  let Some(lambda) = site.lambda(1) else {
    return false;
  };
  let [acc, item] = lambda.params.as_slice() else {
    return false;
  };
  let is_addition = match lambda.body.unparen() {
    Expr::Binary(BinaryOp::Add, lhs, rhs) => {
      let (lhs, rhs) = (lhs.unparen().as_ident(), rhs.unparen().as_ident());
      (lhs == Some(acc) && rhs == Some(item)) || (lhs == Some(item) && rhs == Some(acc))
    }
    _ => false,
  };
  is_zero_seed && is_addition
}

/// The rules shared by `Sum`, `Average`, `Max` and `Min`: drop an
/// identity selector, and pull a preceding `Select` into the selector.
/// An extremum also ignores duplicates, and over integers ignores
/// order.
fn reduction(site: &StageSite, extremum: bool) -> Option<Expr> {
  if let Some(selector) = site.lambda(0) {
    if is_identity_lambda(selector) {
      return Some(site.stage_on(site.receiver, site.name(), Vec::new()));
    }
  }
  if site.args().is_empty() {
    if let Some(select) = site.upstream_is(SequenceStage::Select) {
      let selector = &select.args[0];
      if selector.unparen().as_lambda().is_some_and(|l| l.single_param().is_some()) {
        return Some(site.stage_on(select.receiver()?, site.name(), vec![selector.clone()]));
      }
    }
  }
  if !extremum {
    return site.skip_materializing();
  }
  let over_integers = site.return_type().as_numeric().is_some_and(NumericType::is_integer);
  site.skip_receiver(|stage, _| {
    stage.is_materializing() || stage == SequenceStage::Distinct ||
      (over_integers && (stage.is_sort() || stage == SequenceStage::Reverse))
  })
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use crate::ast::{NumericType, TypeRef};
  use crate::optimizer::EvaluationMode;
  use crate::value::{Number, Sequence, Value};

  fn doubles(values: &[f64]) -> Value {
    let items = values.iter().map(|x| Value::Number(Number::Double(*x))).collect();
    Value::Sequence(Sequence::array(TypeRef::Numeric(NumericType::Double), items))
  }

  #[test]
  fn test_aggregate_to_sum() {
    let session = sequences(EvaluationMode::Exact);
    let source = "ds.Aggregate(0.0, (a, v) => a + v)";
    let rewritten = rewrite(&session, source).unwrap();
    assert_eq!(rewritten.to_string(), "ds.Sum()");
    let original = crate::parsing::parse_expr(source).unwrap();
    for sample in [&[][..], &[-0.0], &[1.5, 2.25, -4.0], &[1e308, 1e308, -1e308]] {
      let bindings = [("ds", doubles(sample))];
      assert_eq!(eval_with(&session, &original, &bindings), eval_with(&session, &rewritten, &bindings));
    }
    assert_eq!(rewrite_str(&session, "ds.Aggregate(0.0, (a, v) => v + a)").unwrap(), "ds.Sum()");
  }

  #[test]
  fn test_aggregate_guards() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "ds.Aggregate(-0.0, (a, v) => a + v)"), None);
    assert_eq!(rewrite_str(&session, "ds.Aggregate(1.0, (a, v) => a + v)"), None);
    assert_eq!(rewrite_str(&session, "xs.Aggregate(0, (a, v) => a + v)"), None);
    assert_eq!(rewrite_str(&session, "ds.Aggregate(0.0, (a, v) => a * v)"), None);
  }

  #[test]
  fn test_selectors() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.Sum(x => x)").unwrap(), "e.Sum()");
    assert_eq!(rewrite_str(&session, "e.Select(x => x * 2).Sum()").unwrap(), "e.Sum(x => x * 2)");
    assert_eq!(rewrite_str(&session, "e.Select(x => x * 0.5).Average()").unwrap(), "e.Average(x => x * 0.5)");
    assert_eq!(rewrite_str(&session, "e.Max(x => x)").unwrap(), "e.Max()");
    assert_same_results(&session, "xs.Select(x => x * 3).Max()", &[&[1, 5, 2]]);
  }

  #[test]
  fn test_extremum_skips() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "e.OrderBy(x => -x).Distinct().ToList().Max()").unwrap(), "e.Max()");
    assert_eq!(rewrite_str(&session, "ds.Reverse().Min()"), None);
    assert_eq!(rewrite_str(&session, "ds.ToArray().Distinct().Min()").unwrap(), "ds.Min()");
    assert_eq!(rewrite_str(&session, "e.Reverse().Sum()"), None);
  }
}
