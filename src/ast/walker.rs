
//! Utility functions for walking an expression tree.

use super::{Call, CallTarget, Expr, Lambda};

use std::collections::HashSet;
use std::convert::Infallible;
use std::rc::Rc;

pub fn postorder_walk<E, F>(expr: Expr, mut f: F) -> Result<Expr, E>
where F: FnMut(Expr) -> Result<Expr, E> {
  postorder_walk_impl(expr, &mut f)
}

pub fn postorder_walk_ok<F>(expr: Expr, mut f: F) -> Expr
where F: FnMut(Expr) -> Expr {
  let f_ok = |expr| Ok::<Expr, Infallible>(f(expr));
  match postorder_walk(expr, f_ok) {
    Ok(expr) => expr,
    Err(never) => match never {},
  }
}

fn walk_rc<E, F>(expr: &Rc<Expr>, f: &mut F) -> Result<Rc<Expr>, E>
where F: FnMut(Expr) -> Result<Expr, E> {
  postorder_walk_impl(Expr::clone(expr), f).map(Rc::new)
}

fn walk_all<E, F>(exprs: Vec<Expr>, f: &mut F) -> Result<Vec<Expr>, E>
where F: FnMut(Expr) -> Result<Expr, E> {
  exprs.into_iter().map(|x| postorder_walk_impl(x, f)).collect()
}

fn postorder_walk_impl<E, F>(expr: Expr, f: &mut F) -> Result<Expr, E>
where F: FnMut(Expr) -> Result<Expr, E> {
  let expr = match expr {
    Expr::Literal(_) | Expr::Ident(_) | Expr::StaticMember(..) | Expr::Throw { .. } => expr,
    Expr::Paren(inner) => Expr::Paren(walk_rc(&inner, f)?),
    Expr::Unary(op, inner) => Expr::Unary(op, walk_rc(&inner, f)?),
    Expr::Binary(op, lhs, rhs) => Expr::Binary(op, walk_rc(&lhs, f)?, walk_rc(&rhs, f)?),
    Expr::Conditional(c, t, e) => Expr::Conditional(walk_rc(&c, f)?, walk_rc(&t, f)?, walk_rc(&e, f)?),
    Expr::Call(call) => {
      let target = match call.target {
        CallTarget::Instance(receiver) => CallTarget::Instance(walk_rc(&receiver, f)?),
        other => other,
      };
      let args = walk_all(call.args, f)?;
      Expr::Call(Call { target, name: call.name, type_args: call.type_args, args })
    }
    Expr::Member(receiver, name) => Expr::Member(walk_rc(&receiver, f)?, name),
    Expr::Index(receiver, index) => Expr::Index(walk_rc(&receiver, f)?, walk_rc(&index, f)?),
    Expr::Lambda(lambda) => Expr::Lambda(Lambda { params: lambda.params, body: walk_rc(&lambda.body, f)? }),
    Expr::Cast(ty, inner) => Expr::Cast(ty, walk_rc(&inner, f)?),
    Expr::ArrayLit(ty, items) => Expr::ArrayLit(ty, walk_all(items, f)?),
    Expr::New(ty, args, init) => {
      let init = init.map(|init| walk_all(init, f)).transpose()?;
      Expr::New(ty, walk_all(args, f)?, init)
    }
    Expr::Tuple(items) => Expr::Tuple(walk_all(items, f)?),
    Expr::Range(start, end) => {
      let start = start.map(|x| walk_rc(&x, f)).transpose()?;
      let end = end.map(|x| walk_rc(&x, f)).transpose()?;
      Expr::Range(start, end)
    }
    Expr::FromEnd(inner) => Expr::FromEnd(walk_rc(&inner, f)?),
  };
  f(expr)
}

/// The immediate sub-expressions of `expr`, in source order.
pub fn children(expr: &Expr) -> Vec<&Expr> {
  match expr {
    Expr::Literal(_) | Expr::Ident(_) | Expr::StaticMember(..) | Expr::Throw { .. } => vec![],
    Expr::Paren(inner) | Expr::Unary(_, inner) | Expr::Cast(_, inner) | Expr::FromEnd(inner) => vec![inner.as_ref()],
    Expr::Member(receiver, _) => vec![receiver.as_ref()],
    Expr::Binary(_, lhs, rhs) | Expr::Index(lhs, rhs) => vec![lhs.as_ref(), rhs.as_ref()],
    Expr::Conditional(c, t, e) => vec![c.as_ref(), t.as_ref(), e.as_ref()],
    Expr::Call(call) => call.receiver().into_iter().chain(&call.args).collect(),
    Expr::Lambda(lambda) => vec![lambda.body.as_ref()],
    Expr::ArrayLit(_, items) | Expr::Tuple(items) => items.iter().collect(),
    Expr::New(_, args, init) => args.iter().chain(init.iter().flatten()).collect(),
    Expr::Range(start, end) => start.iter().chain(end.iter()).map(|x| x.as_ref()).collect(),
  }
}

pub fn postorder_walk_borrowed<F>(expr: &Expr, mut f: F)
where F: FnMut(&Expr) {
  postorder_walk_borrowed_impl(expr, &mut f);
}

fn postorder_walk_borrowed_impl<F>(expr: &Expr, f: &mut F)
where F: FnMut(&Expr) {
  for child in children(expr) {
    postorder_walk_borrowed_impl(child, f);
  }
  f(expr);
}

/// Returns true if any of the sub-expressions of `expr` (including
/// `expr` itself) satisfies the predicate.
pub fn any<F>(expr: &Expr, f: F) -> bool
where F: Fn(&Expr) -> bool {
  let mut result = false;
  postorder_walk_borrowed(expr, |e| {
    if f(e) {
      result = true;
    }
  });
  result
}

/// Names of all free calls (helper invocations) in `expr`.
pub fn free_call_names(expr: &Expr) -> HashSet<String> {
  let mut names = HashSet::new();
  postorder_walk_borrowed(expr, |e| {
    if let Expr::Call(Call { target: CallTarget::Free, name, .. }) = e {
      names.insert(name.clone());
    }
  });
  names
}

/// Identifiers that occur free in `expr`, that is, not bound by an
/// enclosing lambda inside `expr`.
pub fn free_identifiers(expr: &Expr) -> HashSet<String> {
  let mut out = HashSet::new();
  collect_free(expr, &mut Vec::new(), &mut out);
  out
}

fn collect_free(expr: &Expr, bound: &mut Vec<String>, out: &mut HashSet<String>) {
  match expr {
    Expr::Ident(name) => {
      if !bound.contains(name) {
        out.insert(name.clone());
      }
    }
    Expr::Lambda(lambda) => {
      let len = bound.len();
      bound.extend(lambda.params.iter().cloned());
      collect_free(&lambda.body, bound, out);
      bound.truncate(len);
    }
    other => {
      for child in children(other) {
        collect_free(child, bound, out);
      }
    }
  }
}

/// True if identifier `name` occurs free in `expr`.
pub fn mentions(expr: &Expr, name: &str) -> bool {
  free_identifiers(expr).contains(name)
}

/// Counts free occurrences of identifier `name` in `expr`.
pub fn count_occurrences(expr: &Expr, name: &str) -> usize {
  match expr {
    Expr::Ident(n) => usize::from(n == name),
    Expr::Lambda(lambda) if lambda.params.iter().any(|p| p == name) => 0,
    other => children(other).into_iter().map(|c| count_occurrences(c, name)).sum(),
  }
}

/// Replaces free occurrences of identifier `name` with
/// `replacement`. Lambdas that rebind `name` are left alone.
///
/// The caller must ensure that no free identifier of `replacement` is
/// captured by a lambda inside `expr`; see [`can_substitute`].
pub fn substitute(expr: &Expr, name: &str, replacement: &Expr) -> Expr {
  match expr {
    Expr::Ident(n) if n == name => replacement.clone(),
    Expr::Lambda(lambda) if lambda.params.iter().any(|p| p == name) => expr.clone(),
    _ => map_children(expr, |child| substitute(child, name, replacement)),
  }
}

/// True when [`substitute`] would not capture any free identifier of
/// `replacement` under a lambda in `expr` that mentions `name`.
pub fn can_substitute(expr: &Expr, name: &str, replacement: &Expr) -> bool {
  let free = free_identifiers(replacement);
  !captures(expr, name, &free)
}

fn captures(expr: &Expr, name: &str, free: &HashSet<String>) -> bool {
  match expr {
    Expr::Lambda(lambda) => {
      if lambda.params.iter().any(|p| p == name) {
        return false;
      }
      (lambda.params.iter().any(|p| free.contains(p)) && mentions(&lambda.body, name)) ||
        captures(&lambda.body, name, free)
    }
    other => children(other).into_iter().any(|c| captures(c, name, free)),
  }
}

/// Rebuilds `expr` with each immediate child mapped through `f`.
pub fn map_children<F>(expr: &Expr, mut f: F) -> Expr
where F: FnMut(&Expr) -> Expr {
  let f = &mut f;
  match expr {
    Expr::Literal(_) | Expr::Ident(_) | Expr::StaticMember(..) | Expr::Throw { .. } => expr.clone(),
    Expr::Paren(inner) => Expr::Paren(map_rc(f, inner)),
    Expr::Unary(op, inner) => Expr::Unary(*op, map_rc(f, inner)),
    Expr::Binary(op, lhs, rhs) => Expr::Binary(*op, map_rc(f, lhs), map_rc(f, rhs)),
    Expr::Conditional(c, t, e) => Expr::Conditional(map_rc(f, c), map_rc(f, t), map_rc(f, e)),
    Expr::Call(call) => {
      let target = match &call.target {
        CallTarget::Instance(receiver) => CallTarget::Instance(map_rc(f, receiver)),
        other => other.clone(),
      };
      let args = map_all(f, &call.args);
      Expr::Call(Call { target, name: call.name.clone(), type_args: call.type_args.clone(), args })
    }
    Expr::Member(receiver, name) => Expr::Member(map_rc(f, receiver), name.clone()),
    Expr::Index(receiver, index) => Expr::Index(map_rc(f, receiver), map_rc(f, index)),
    Expr::Lambda(lambda) => Expr::Lambda(Lambda { params: lambda.params.clone(), body: map_rc(f, &lambda.body) }),
    Expr::Cast(ty, inner) => Expr::Cast(ty.clone(), map_rc(f, inner)),
    Expr::ArrayLit(ty, items) => Expr::ArrayLit(ty.clone(), map_all(f, items)),
    Expr::New(ty, args, init) => {
      let args = map_all(f, args);
      let init = init.as_ref().map(|init| map_all(f, init));
      Expr::New(ty.clone(), args, init)
    }
    Expr::Tuple(items) => Expr::Tuple(map_all(f, items)),
    Expr::Range(start, end) => {
      let start = start.as_ref().map(|x| map_rc(f, x));
      let end = end.as_ref().map(|x| map_rc(f, x));
      Expr::Range(start, end)
    }
    Expr::FromEnd(inner) => Expr::FromEnd(map_rc(f, inner)),
  }
}

fn map_rc<F>(f: &mut F, expr: &Rc<Expr>) -> Rc<Expr>
where F: FnMut(&Expr) -> Expr {
  Rc::new(f(expr.as_ref()))
}

fn map_all<F>(f: &mut F, exprs: &[Expr]) -> Vec<Expr>
where F: FnMut(&Expr) -> Expr {
  exprs.iter().map(|x| f(x)).collect()
}
