
use crate::ast::{Call, Expr, MethodDefinition, TypeRef};
use crate::host::{Signature, SymbolResolver};

use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// A shared [`SymbolResolver`] together with the locals declared
/// since it was created.
///
/// Scopes are cheap to clone and own everything they refer to, so a
/// compiled lambda can carry one around.
#[derive(Clone)]
pub struct Scope {
  resolver: Rc<dyn SymbolResolver>,
  locals: Vec<(String, TypeRef)>,
}

impl Scope {
  pub fn new(resolver: Rc<dyn SymbolResolver>) -> Scope {
    Scope { resolver, locals: Vec::new() }
  }

  pub fn bind(&mut self, name: impl Into<String>, ty: TypeRef) {
    let name = name.into();
    self.locals.retain(|(n, _)| *n != name);
    self.locals.push((name, ty));
  }

  pub fn with_locals(&self, locals: impl IntoIterator<Item = (String, TypeRef)>) -> Scope {
    let mut scope = self.clone();
    for (name, ty) in locals {
      scope.bind(name, ty);
    }
    scope
  }

  pub fn local_type(&self, name: &str) -> Option<&TypeRef> {
    self.locals.iter().rev().find(|(n, _)| n == name).map(|(_, ty)| ty)
  }

  fn with_resolver<T>(&self, f: impl FnOnce(&dyn SymbolResolver) -> T) -> T {
    if self.locals.is_empty() {
      f(self.resolver.as_ref())
    } else {
      let scoped = self.resolver.with_locals(self.locals.clone());
      f(scoped.as_ref())
    }
  }

  pub fn resolve_type(&self, expr: &Expr) -> Option<TypeRef> {
    self.with_resolver(|r| r.resolve_type(expr))
  }

  pub fn resolve_call_signature(&self, call: &Call) -> Option<Signature> {
    self.with_resolver(|r| r.resolve_call_signature(call))
  }

  pub fn resolve_member(&self, expr: &Expr) -> Option<Signature> {
    self.with_resolver(|r| r.resolve_member(expr))
  }

  pub fn lambda_parameter_types(&self, call: &Call, index: usize) -> Option<Vec<TypeRef>> {
    self.with_resolver(|r| r.lambda_parameter_types(call, index))
  }

  /// The scope inside argument `index` of `call`, which must be a
  /// lambda, with its parameters typed.
  pub fn lambda_scope(&self, call: &Call, index: usize) -> Option<Scope> {
    let lambda = call.args.get(index)?.as_lambda()?;
    let types = self.lambda_parameter_types(call, index)?;
    Some(self.with_locals(lambda.params.iter().cloned().zip(types)))
  }

  pub fn declare_method(&self, method: &MethodDefinition) {
    self.resolver.declare_method(method);
  }
}

impl Debug for Scope {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("Scope").field("locals", &self.locals).finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::NumericType;
  use crate::host::ScopeResolver;
  use crate::parsing::parse_expr;

  #[test]
  fn test_locals_shadow() {
    let resolver = ScopeResolver::new().with_local("x", TypeRef::Bool);
    let scope = Scope::new(Rc::new(resolver));
    let x = parse_expr("x").unwrap();
    assert_eq!(scope.resolve_type(&x), Some(TypeRef::Bool));
    let inner = scope.with_locals([("x".to_owned(), TypeRef::Numeric(NumericType::Int32))]);
    assert_eq!(inner.resolve_type(&x), Some(TypeRef::Numeric(NumericType::Int32)));
    assert_eq!(scope.resolve_type(&x), Some(TypeRef::Bool));
  }

  #[test]
  fn test_lambda_scope() {
    let resolver = ScopeResolver::new().with_local("xs", TypeRef::array(NumericType::Double.into()));
    let scope = Scope::new(Rc::new(resolver));
    let expr = parse_expr("xs.Where(v => v > 0)").unwrap();
    let inner = scope.lambda_scope(expr.as_call().unwrap(), 0).unwrap();
    assert_eq!(inner.local_type("v"), Some(&TypeRef::Numeric(NumericType::Double)));
  }
}
