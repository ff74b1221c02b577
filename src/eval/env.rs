
use crate::ast::Expr;
use crate::ast::walker::mentions;
use crate::value::Value;

use std::collections::HashMap;

/// What the optimizer last knew about a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
  Value(Value),
  /// The (already rewritten) expression last assigned to it.
  Expr(Expr),
}

/// The bound-variable environment used for literal propagation.
///
/// Expression bindings refer to other variables by name, so binding
/// or forgetting a name also forgets every expression binding that
/// mentions it.
#[derive(Debug, Clone, Default)]
pub struct Environment {
  bindings: HashMap<String, Binding>,
}

impl Environment {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, name: &str) -> Option<&Binding> {
    self.bindings.get(name)
  }

  pub fn is_bound(&self, name: &str) -> bool {
    self.bindings.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.bindings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bindings.is_empty()
  }

  pub fn bind_value(&mut self, name: impl Into<String>, value: Value) {
    let name = name.into();
    self.invalidate(&name);
    self.bindings.insert(name, Binding::Value(value));
  }

  /// Binds `name` to `expr`. An expression that mentions `name` itself
  /// describes the old value, so the variable is only forgotten.
  pub fn bind_expr(&mut self, name: impl Into<String>, expr: Expr) {
    let name = name.into();
    let self_referential = mentions(&expr, &name);
    self.invalidate(&name);
    if !self_referential {
      self.bindings.insert(name, Binding::Expr(expr));
    }
  }

  /// Forgets `name` and everything derived from it.
  pub fn invalidate(&mut self, name: &str) {
    let mut stale = vec![name.to_owned()];
    while let Some(name) = stale.pop() {
      self.bindings.remove(&name);
      let dependents = self.bindings.iter()
        .filter(|(_, binding)| matches!(binding, Binding::Expr(e) if mentions(e, &name)))
        .map(|(dependent, _)| dependent.clone())
        .collect::<Vec<_>>();
      stale.extend(dependents);
    }
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.bindings.keys().map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parsing::parse_expr;
  use crate::value::Number;

  #[test]
  fn test_rebinding_forgets_dependents() {
    let mut env = Environment::new();
    env.bind_value("a", Value::Number(Number::Int32(1)));
    env.bind_expr("b", parse_expr("a + 1").unwrap());
    env.bind_expr("c", parse_expr("b * 2").unwrap());
    env.bind_expr("d", parse_expr("7").unwrap());
    env.bind_value("a", Value::Number(Number::Int32(5)));
    assert!(env.is_bound("a"));
    assert!(!env.is_bound("b"));
    assert!(!env.is_bound("c"));
    assert!(env.is_bound("d"));
  }

  #[test]
  fn test_self_reference_is_not_bound() {
    let mut env = Environment::new();
    env.bind_value("x", Value::Number(Number::Int32(1)));
    env.bind_expr("x", parse_expr("x + 1").unwrap());
    assert!(!env.is_bound("x"));
    assert!(env.is_empty());
  }
}
