
//! The state a strategy sees: the call under inspection, the
//! evaluator for its scope, and the compilation unit's session.

use super::helpers::HelperTable;
use super::mode::EvaluationMode;
use super::try_optimize_call;
use crate::ast::{Call, Expr, HelperDefinition, Lambda, TypeRef};
use crate::ast::walker::free_identifiers;
use crate::driver::Diagnostic;
use crate::errorlist::ErrorList;
use crate::eval::PartialEvaluator;
use crate::host::Signature;
use crate::value::{Number, Value};

use log::trace;

use std::cell::{Ref, RefCell};
use std::collections::HashSet;

/// State shared by every call site of one compilation unit.
#[derive(Debug)]
pub struct Session {
  evaluator: PartialEvaluator,
  mode: EvaluationMode,
  helpers: RefCell<HelperTable>,
  diagnostics: RefCell<ErrorList<Diagnostic>>,
}

impl Session {
  pub fn new(evaluator: PartialEvaluator, mode: EvaluationMode) -> Self {
    Self {
      evaluator,
      mode,
      helpers: RefCell::new(HelperTable::new()),
      diagnostics: RefCell::new(ErrorList::new()),
    }
  }

  pub fn mode(&self) -> EvaluationMode {
    self.mode
  }

  pub fn set_mode(&mut self, mode: EvaluationMode) {
    self.mode = mode;
  }

  /// The evaluator for the statement currently being optimized.
  pub fn evaluator(&self) -> &PartialEvaluator {
    &self.evaluator
  }

  pub fn evaluator_mut(&mut self) -> &mut PartialEvaluator {
    &mut self.evaluator
  }

  pub fn helpers(&self) -> Ref<'_, HelperTable> {
    self.helpers.borrow()
  }

  /// Adds a helper to the pending table and makes calls to it
  /// resolvable and foldable.
  pub fn register_helper(&self, definition: HelperDefinition) -> bool {
    if !self.helpers.borrow_mut().register(definition.clone()) {
      self.report(Diagnostic::HelperConflict { name: definition.name });
      return false;
    }
    self.evaluator.add_method(definition);
    true
  }

  /// See [`HelperTable::prune`].
  pub fn prune_helpers(&self, roots: &HashSet<String>) -> Vec<String> {
    self.helpers.borrow_mut().prune(roots)
  }

  pub fn report(&self, diagnostic: Diagnostic) {
    self.diagnostics.borrow_mut().push(diagnostic);
  }

  /// Removes and returns everything reported so far.
  pub fn take_diagnostics(&self) -> ErrorList<Diagnostic> {
    self.diagnostics.take()
  }

  pub fn into_helpers(self) -> HelperTable {
    self.helpers.into_inner()
  }
}

/// One call site, with its arguments already optimized.
#[derive(Debug, Clone)]
pub struct OptimizerContext<'a> {
  call: &'a Call,
  original: &'a Call,
  signature: Signature,
  evaluator: &'a PartialEvaluator,
  session: &'a Session,
}

impl<'a> OptimizerContext<'a> {
  pub fn new(
    call: &'a Call,
    original: &'a Call,
    signature: Signature,
    evaluator: &'a PartialEvaluator,
    session: &'a Session,
  ) -> Self {
    Self { call, original, signature, evaluator, session }
  }

  /// The call with rewritten arguments.
  pub fn call(&self) -> &'a Call {
    self.call
  }

  /// The call as it was before its arguments were optimized.
  pub fn original(&self) -> &'a Call {
    self.original
  }

  pub fn signature(&self) -> &Signature {
    &self.signature
  }

  pub fn session(&self) -> &'a Session {
    self.session
  }

  pub fn mode(&self) -> EvaluationMode {
    self.session.mode()
  }

  pub fn is_fast(&self) -> bool {
    self.mode().is_fast()
  }

  pub fn evaluator(&self) -> &'a PartialEvaluator {
    self.evaluator
  }

  pub fn args(&self) -> &'a [Expr] {
    &self.call.args
  }

  pub fn arg(&self, index: usize) -> Option<&'a Expr> {
    self.call.args.get(index)
  }

  pub fn lambda_arg(&self, index: usize) -> Option<&'a Lambda> {
    self.arg(index)?.unparen().as_lambda()
  }

  pub fn receiver(&self) -> Option<&'a Expr> {
    self.call.receiver()
  }

  pub fn resolve_type(&self, expr: &Expr) -> Option<TypeRef> {
    self.evaluator.scope().resolve_type(expr)
  }

  pub fn resolve_call(&self, call: &Call) -> Option<Signature> {
    self.evaluator.scope().resolve_call_signature(call)
  }

  /// The value of `expr`, if it folds without raising.
  pub fn fold_value(&self, expr: &Expr) -> Option<Value> {
    match self.evaluator.fold(expr, None) {
      Ok(value) => value,
      Err(err) => {
        trace!("{expr} raises {err}");
        None
      }
    }
  }

  pub fn fold_number(&self, expr: &Expr) -> Option<Number> {
    match self.fold_value(expr)? {
      Value::Number(n) => Some(n),
      _ => None,
    }
  }

  pub fn fold_bool(&self, expr: &Expr) -> Option<bool> {
    self.fold_value(expr)?.as_bool()
  }

  pub fn fold_int(&self, expr: &Expr) -> Option<i64> {
    self.fold_value(expr)?.as_i64()
  }

  /// The literal that `expr` folds to, or a throw node if evaluating it
  /// raises. Values with no literal spelling do not fold.
  pub fn fold_expr(&self, expr: &Expr) -> Option<Expr> {
    match self.evaluator.fold(expr, None) {
      Ok(Some(value)) => value.to_expr(),
      Ok(None) => None,
      Err(err) => Some(err.to_expr()),
    }
  }

  /// [`Self::fold_expr`] on the whole call.
  pub fn fold_call(&self) -> Option<Expr> {
    self.fold_expr(&Expr::Call(self.call.clone()))
  }

  /// The evaluator inside the lambda passed as argument `index`.
  pub fn lambda_evaluator(&self, index: usize) -> PartialEvaluator {
    self.evaluator.enter_lambda(self.call, index)
  }

  /// The value a lambda argument's body always produces, regardless
  /// of its parameters.
  pub fn constant_lambda(&self, index: usize) -> Option<Value> {
    let lambda = self.lambda_arg(index)?;
    let inner = self.lambda_evaluator(index);
    inner.fold(&lambda.body, None).ok().flatten()
  }

  pub fn register_helper(&self, definition: HelperDefinition) -> bool {
    self.session.register_helper(definition)
  }

  /// Optimizes a call synthesized by a strategy, as if the driver had
  /// visited it. Returns the call itself when nothing applies.
  pub fn optimize(&self, call: Call) -> Expr {
    let Some(signature) = self.resolve_call(&call) else {
      return Expr::Call(call);
    };
    let ctx = OptimizerContext::new(&call, &call, signature, self.evaluator, self.session);
    try_optimize_call(&ctx).unwrap_or_else(|| Expr::Call(call.clone()))
  }

  /// A lambda parameter name that captures nothing in the current call
  /// or scope, based on `base`.
  pub fn fresh_name(&self, base: &str) -> String {
    let taken = free_identifiers(&Expr::Call(self.call.clone()));
    let is_free = |name: &str| !taken.contains(name) && self.resolve_type(&Expr::ident(name)).is_none();
    if is_free(base) {
      return base.to_owned();
    }
    (1..).map(|i| format!("{base}{i}")).find(|name| is_free(name)).unwrap_or_else(|| base.to_owned())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::eval::Scope;
  use crate::host::{InterpretingLoader, ScopeResolver};
  use crate::parsing::parse_expr;

  use std::rc::Rc;

  fn session(resolver: ScopeResolver) -> Session {
    let evaluator = PartialEvaluator::new(Scope::new(Rc::new(resolver)), Rc::new(InterpretingLoader::new()));
    Session::new(evaluator, EvaluationMode::Exact)
  }

  #[test]
  fn test_fold_call_turns_faults_into_throw() {
    let session = session(ScopeResolver::new());
    let expr = parse_expr("Math.Clamp(1, 5, 2)").unwrap();
    let call = expr.as_call().unwrap();
    let signature = session.evaluator().scope().resolve_call_signature(call).unwrap();
    let ctx = OptimizerContext::new(call, call, signature, session.evaluator(), &session);
    let folded = ctx.fold_call().unwrap();
    assert!(folded.is_throw());
  }

  #[test]
  fn test_fresh_name_avoids_captures() {
    let resolver = ScopeResolver::new().with_local("x", TypeRef::Bool);
    let session = session(resolver);
    let expr = parse_expr("Math.Abs(x1)").unwrap();
    let call = expr.as_call().unwrap();
    let signature = Signature::method(TypeRef::named("Math"), "Abs", vec![], TypeRef::Object);
    let ctx = OptimizerContext::new(call, call, signature, session.evaluator(), &session);
    assert_eq!(ctx.fresh_name("x"), "x2");
    assert_eq!(ctx.fresh_name("v"), "v");
  }

  #[test]
  fn test_registered_helpers_resolve() {
    let session = session(ScopeResolver::new());
    let helper = crate::parsing::parse_helper("static float Half(float x) => x * 0.5F;").unwrap();
    assert!(session.register_helper(helper));
    let call = parse_expr("Half(2F)").unwrap();
    assert_eq!(session.evaluator().scope().resolve_type(&call), Some(TypeRef::Numeric(crate::ast::NumericType::Single)));
    assert_eq!(session.helpers().len(), 1);
    let folded = session.evaluator().fold(&call, None).unwrap();
    assert_eq!(folded, Some(Value::Number(Number::Single(1.0))));
  }
}
