
//! Merging the lambdas of neighbouring stages.

use super::{SequenceStage, StageSite};
use crate::ast::{BinaryOp, Expr, Lambda, UnaryOp};
use crate::ast::purity::is_pure;
use crate::ast::walker::{can_substitute, count_occurrences, mentions, substitute};

/// The run of one-parameter `Where` stages directly before `from`,
/// earliest first, and the expression they filter.
pub(super) fn filters<'a>(site: &StageSite<'_, 'a>, from: &'a Expr) -> (&'a Expr, Vec<&'a Lambda>) {
  let mut source = from;
  let mut predicates = Vec::new();
  while let Some((SequenceStage::Where, call)) = site.stage_call(source) {
    let Some(lambda) = call.args[0].unparen().as_lambda().filter(|l| l.single_param().is_some()) else {
      break;
    };
    let Some(next) = call.receiver() else {
      break;
    };
    predicates.push(lambda);
    source = next;
  }
  predicates.reverse();
  (source, predicates)
}

/// Renames the parameter of every lambda in `lambdas` to one shared
/// name, returning the name and the renamed bodies.
pub(super) fn unify(site: &StageSite, lambdas: &[&Lambda]) -> Option<(String, Vec<Expr>)> {
  let first = lambdas.first()?.single_param()?.to_owned();
  [first, site.ctx.fresh_name("x")].into_iter().find_map(|name| {
    let bodies = lambdas.iter().map(|lambda| rename(lambda, &name)).collect::<Option<Vec<_>>>()?;
    Some((name, bodies))
  })
}

fn rename(lambda: &Lambda, name: &str) -> Option<Expr> {
  let param = lambda.single_param()?;
  if param == name {
    return Some(lambda.body.as_ref().clone());
  }
  if mentions(&lambda.body, name) {
    return None;
  }
  let replacement = Expr::ident(name);
  can_substitute(&lambda.body, param, &replacement).then(|| substitute(&lambda.body, param, &replacement))
}

/// `x => p1 && p2 && ...`, short-circuiting in the order given.
pub(super) fn conjunction(site: &StageSite, predicates: &[&Lambda]) -> Option<Expr> {
  let (param, bodies) = unify(site, predicates)?;
  let body = and_all(bodies)?;
  Some(Expr::Lambda(Lambda::new(vec![param], body)))
}

fn and_all(bodies: Vec<Expr>) -> Option<Expr> {
  bodies.into_iter().reduce(|lhs, rhs| Expr::binary(BinaryOp::And, lhs, rhs))
}

/// `x => !(p1 && ...) || q`: `q` holds for every element that passes
/// the filters.
pub(super) fn implication(site: &StageSite, filters: &[&Lambda], conclusion: &Lambda) -> Option<Expr> {
  let mut lambdas = filters.to_vec();
  lambdas.push(conclusion);
  let (param, mut bodies) = unify(site, &lambdas)?;
  let q = bodies.pop()?;
  let premise = and_all(bodies)?;
  let body = Expr::binary(BinaryOp::Or, Expr::unary(UnaryOp::Not, premise), q);
  Some(Expr::Lambda(Lambda::new(vec![param], body)))
}

/// `x => g(f(x))` from `f` and `g`, when substituting `f`'s body into
/// `g` evaluates it exactly once, or it is pure.
pub(super) fn compose(f: &Lambda, g: &Lambda) -> Option<Expr> {
  let x = f.single_param()?;
  let y = g.single_param()?;
  if count_occurrences(&g.body, y) != 1 && !is_pure(&f.body) {
    return None;
  }
  if x != y && mentions(&g.body, x) {
    return None;
  }
  if !can_substitute(&g.body, y, &f.body) {
    return None;
  }
  let body = substitute(&g.body, y, &f.body);
  Some(Expr::Lambda(Lambda::new(vec![x.to_owned()], body)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parsing::parse_expr;

  fn lambda(source: &str) -> Lambda {
    parse_expr(source).unwrap().as_lambda().unwrap().clone()
  }

  #[test]
  fn test_compose() {
    let f = lambda("x => x + 1");
    let g = lambda("y => y * 2");
    assert_eq!(compose(&f, &g).unwrap().to_string(), "x => (x + 1) * 2");
    let g = lambda("y => y * y");
    assert_eq!(compose(&f, &g).unwrap().to_string(), "x => (x + 1) * (x + 1)");
  }

  #[test]
  fn test_compose_refuses_capture() {
    let f = lambda("x => x + 1");
    assert_eq!(compose(&f, &lambda("y => y + x")), None);
    let effectful = lambda("x => Math.Sqrt(x)");
    assert_eq!(compose(&effectful, &lambda("y => y * y")), None);
    assert_eq!(compose(&effectful, &lambda("y => 0")), None);
    assert_eq!(compose(&effectful, &lambda("y => y + 1")).unwrap().to_string(), "x => Math.Sqrt(x) + 1");
  }

  #[test]
  fn test_rename() {
    assert_eq!(rename(&lambda("y => y > 2"), "x").unwrap().to_string(), "x > 2");
    assert_eq!(rename(&lambda("y => y > x"), "x"), None);
  }
}
