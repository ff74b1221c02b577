
//! The partial evaluator: resolves sub-trees to concrete values at
//! compile time.
//!
//! Folding has three outcomes. `Ok(Some(value))` is a known value,
//! `Ok(None)` means the tree cannot be resolved (an unbound variable,
//! an unknown member, a cycle), and `Err(exception)` means that
//! executing the tree raises, which callers turn into a throw node.

pub mod env;
pub mod interpreter;
pub mod scope;

pub use env::{Binding, Environment};
pub use scope::Scope;

use crate::ast::{BinaryOp, Call, CallTarget, Expr, Lambda, MethodDefinition, TypeRef};
use crate::host::{linq, HostException, Loader, Signature};
use crate::host::resolver::implicit_numeric;
use crate::value::{Delegate, Index, Sequence, Value};
use crate::value::ops::{self, promote};

use log::trace;

use std::cell::{Ref, RefCell};
use std::collections::HashSet;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

pub type FoldResult = Result<Option<Value>, HostException>;

/// Raised from inside a compiled lambda whose body cannot be resolved.
/// It never escapes the evaluator.
const UNRESOLVED: &str = "<unresolved>";

/// Nested helper calls beyond this depth do not fold.
const MAX_CALL_DEPTH: usize = 64;

fn unresolved() -> HostException {
  HostException::new(UNRESOLVED, "")
}

fn is_unresolved(err: &HostException) -> bool {
  err.type_name == UNRESOLVED
}

/// Turns an escaped "cannot resolve" signal back into a fold failure.
fn settle(result: FoldResult) -> FoldResult {
  match result {
    Err(err) if is_unresolved(&err) => Ok(None),
    other => other,
  }
}

#[derive(Clone)]
pub struct PartialEvaluator {
  scope: Scope,
  loader: Rc<dyn Loader>,
  env: Rc<Environment>,
  methods: Rc<RefCell<Vec<MethodDefinition>>>,
  depth: usize,
}

impl Debug for PartialEvaluator {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("PartialEvaluator")
      .field("scope", &self.scope)
      .field("env", &self.env)
      .field("depth", &self.depth)
      .finish_non_exhaustive()
  }
}

impl PartialEvaluator {
  pub fn new(scope: Scope, loader: Rc<dyn Loader>) -> Self {
    Self { scope, loader, env: Rc::new(Environment::new()), methods: Rc::default(), depth: 0 }
  }

  pub fn with_env(self, env: Environment) -> Self {
    Self { env: Rc::new(env), ..self }
  }

  pub fn with_scope(self, scope: Scope) -> Self {
    Self { scope, ..self }
  }

  /// Makes `methods` callable by unqualified name. The method table
  /// is shared by every clone of the result.
  pub fn with_methods(self, methods: Vec<MethodDefinition>) -> Self {
    Self { methods: Rc::new(RefCell::new(methods)), ..self }
  }

  pub fn scope(&self) -> &Scope {
    &self.scope
  }

  pub fn env(&self) -> &Environment {
    &self.env
  }

  pub fn loader(&self) -> &dyn Loader {
    self.loader.as_ref()
  }

  pub fn methods(&self) -> Ref<'_, [MethodDefinition]> {
    Ref::map(self.methods.borrow(), Vec::as_slice)
  }

  pub fn env_mut(&mut self) -> &mut Environment {
    Rc::make_mut(&mut self.env)
  }

  /// Declares a local of type `ty` whose value is not known yet.
  pub fn declare_local(&mut self, name: impl Into<String>, ty: TypeRef) {
    let name = name.into();
    self.env_mut().invalidate(&name);
    self.scope.bind(name, ty);
  }

  /// Makes a method callable by unqualified name, both for folding and
  /// for type resolution, in this evaluator and every evaluator it
  /// shares a method table with.
  pub fn add_method(&self, method: MethodDefinition) {
    self.scope.declare_method(&method);
    let mut methods = self.methods.borrow_mut();
    if !methods.iter().any(|m| m.signature_matches(&method)) {
      methods.push(method);
    }
  }

  /// The evaluator for the body of the lambda passed as argument
  /// `index` of `call`: its parameters are typed where the resolver
  /// knows them, and are never bound to values.
  pub fn enter_lambda(&self, call: &Call, index: usize) -> PartialEvaluator {
    let mut inner = self.clone();
    let Some(lambda) = call.args.get(index).and_then(Expr::as_lambda) else {
      return inner;
    };
    if let Some(scope) = self.scope.lambda_scope(call, index) {
      inner.scope = scope;
    }
    let env = inner.env_mut();
    for param in &lambda.params {
      env.invalidate(param);
    }
    inner
  }

  /// Folds `expr` with no variables visited yet.
  pub fn fold(&self, expr: &Expr, expected: Option<&TypeRef>) -> FoldResult {
    self.try_fold(expr, expected, &mut HashSet::new())
  }

  /// Folds `expr`. Variables in `visited` are being resolved further
  /// up and do not fold again. A numeric result converts to a numeric
  /// `expected` type where that conversion is implicit.
  pub fn try_fold(&self, expr: &Expr, expected: Option<&TypeRef>, visited: &mut HashSet<String>) -> FoldResult {
    let value = settle(self.fold_node(expr, expected, visited))?;
    Ok(value.map(|value| coerce(value, expected)))
  }

  fn fold_node(&self, expr: &Expr, expected: Option<&TypeRef>, visited: &mut HashSet<String>) -> FoldResult {
    match expr {
      Expr::Literal(lit) => Ok(Some(Value::from_literal(lit))),
      Expr::Ident(name) => self.fold_identifier(name, expected, visited),
      Expr::Paren(inner) => self.try_fold(inner, expected, visited),
      Expr::Unary(op, operand) => {
        let Some(operand) = self.try_fold(operand, None, visited)? else {
          return Ok(None);
        };
        ops::unary(*op, &operand)
      }
      Expr::Binary(op, lhs, rhs) => self.fold_binary(*op, lhs, rhs, visited),
      Expr::Conditional(cond, then, otherwise) => {
        let Some(cond) = self.try_fold(cond, Some(&TypeRef::Bool), visited)?.and_then(|c| c.as_bool()) else {
          return Ok(None);
        };
        self.try_fold(if cond { then } else { otherwise }, expected, visited)
      }
      Expr::Call(call) => self.fold_call(call, visited),
      Expr::Member(receiver, name) => {
        let Some(receiver) = self.try_fold(receiver, None, visited)? else {
          return Ok(None);
        };
        let signature = self.scope.resolve_member(expr)
          .unwrap_or_else(|| Signature::field(receiver.ty(), name.clone(), TypeRef::Object, false));
        self.loader.field_value(&signature, Some(&receiver))
      }
      Expr::StaticMember(ty, name) => {
        let signature = self.scope.resolve_member(expr)
          .unwrap_or_else(|| Signature::field(ty.clone(), name.clone(), TypeRef::Object, true));
        self.loader.field_value(&signature, None)
      }
      Expr::Index(receiver, index) => {
        let Some(receiver) = self.try_fold(receiver, None, visited)? else {
          return Ok(None);
        };
        let Some(index) = self.try_fold(index, None, visited)? else {
          return Ok(None);
        };
        match index {
          Value::Range(start, end) => linq::slice(&receiver, start, end),
          index => linq::element_at(&receiver, &index),
        }
      }
      Expr::Lambda(lambda) => Ok(Some(self.compile_lambda(lambda, None))),
      Expr::Cast(ty, operand) => {
        let Some(operand) = self.try_fold(operand, None, visited)? else {
          return Ok(None);
        };
        ops::cast(&operand, ty)
      }
      Expr::ArrayLit(ty, items) => self.fold_array(ty.as_ref(), items, expected, visited),
      Expr::New(ty, args, init) => self.fold_new(ty, args, init.as_deref(), visited),
      Expr::Tuple(items) => {
        if self.loader.tuple_type(items.len()).is_none() {
          return Ok(None);
        }
        let Some(values) = self.fold_all(items, None, visited)? else {
          return Ok(None);
        };
        Ok(Some(Value::Tuple(values)))
      }
      Expr::Range(start, end) => {
        let start = match start {
          Some(start) => self.fold_index(start, false, visited)?,
          None => Some(Index::start(0)),
        };
        let end = match end {
          Some(end) => self.fold_index(end, false, visited)?,
          None => Some(Index::end(0)),
        };
        Ok(start.zip(end).map(|(start, end)| Value::Range(start, end)))
      }
      Expr::FromEnd(inner) => Ok(self.fold_index(inner, true, visited)?.map(Value::Index)),
      Expr::Throw { exception_type, message } => Err(HostException::new(exception_type.clone(), message.clone())),
    }
  }

  fn fold_identifier(&self, name: &str, expected: Option<&TypeRef>, visited: &mut HashSet<String>) -> FoldResult {
    match self.env.get(name) {
      None => {
        trace!("{name} is not bound");
        Ok(None)
      }
      Some(Binding::Value(value)) => Ok(Some(value.clone())),
      Some(Binding::Expr(expr)) => {
        if !visited.insert(name.to_owned()) {
          trace!("cyclic reference to {name}");
          return Ok(None);
        }
        let result = self.try_fold(expr, expected, visited);
        visited.remove(name);
        result
      }
    }
  }

  fn fold_binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr, visited: &mut HashSet<String>) -> FoldResult {
    let Some(left) = self.try_fold(lhs, None, visited)? else {
      return Ok(None);
    };
    match (op, &left) {
      (BinaryOp::And, Value::Bool(false)) => return Ok(Some(Value::Bool(false))),
      (BinaryOp::Or, Value::Bool(true)) => return Ok(Some(Value::Bool(true))),
      (BinaryOp::And | BinaryOp::Or, Value::Bool(_)) => {
        return Ok(self.try_fold(rhs, Some(&TypeRef::Bool), visited)?.filter(|v| v.as_bool().is_some()));
      }
      (BinaryOp::Coalesce, Value::Null) => return self.try_fold(rhs, None, visited),
      (BinaryOp::Coalesce, _) => return Ok(Some(left)),
      _ => {}
    }
    let Some(right) = self.try_fold(rhs, None, visited)? else {
      return Ok(None);
    };
    ops::binary(op, &left, &right)
  }

  fn fold_all(&self, exprs: &[Expr], expected: Option<&TypeRef>, visited: &mut HashSet<String>) -> Result<Option<Vec<Value>>, HostException> {
    let mut values = Vec::with_capacity(exprs.len());
    for expr in exprs {
      match self.try_fold(expr, expected, visited)? {
        Some(value) => values.push(value),
        None => return Ok(None),
      }
    }
    Ok(Some(values))
  }

  fn fold_index(&self, expr: &Expr, from_end: bool, visited: &mut HashSet<String>) -> Result<Option<Index>, HostException> {
    let value = match self.try_fold(expr, None, visited)? {
      Some(Value::Index(index)) if !from_end => return Ok(Some(index)),
      Some(value) => value.as_i64(),
      None => None,
    };
    match value {
      Some(v) if v < 0 => Err(HostException::argument_out_of_range("value")),
      Some(v) => Ok(Some(Index { value: v, from_end })),
      None => Ok(None),
    }
  }

  fn fold_call(&self, call: &Call, visited: &mut HashSet<String>) -> FoldResult {
    if call.target == CallTarget::Free {
      let Some(args) = self.fold_all(&call.args, None, visited)? else {
        return Ok(None);
      };
      return self.call_method(&call.name, &args);
    }
    let Some(signature) = self.scope.resolve_call_signature(call) else {
      trace!("no signature for call to {}", call.name);
      return Ok(None);
    };
    let receiver = match call.receiver() {
      Some(receiver) => match self.try_fold(receiver, None, visited)? {
        Some(receiver) => Some(receiver),
        None => return Ok(None),
      },
      None => None,
    };
    let offset = usize::from(signature.is_extension);
    let mut args = Vec::with_capacity(call.args.len());
    for (i, arg) in call.args.iter().enumerate() {
      let value = match arg {
        Expr::Lambda(lambda) => self.compile_lambda(lambda, self.scope.lambda_parameter_types(call, i)),
        arg => match self.try_fold(arg, signature.parameter_types.get(i + offset), visited)? {
          Some(value) => value,
          None => return Ok(None),
        },
      };
      args.push(value);
    }
    self.invoke(&signature, receiver.as_ref(), &args)
  }

  /// Executes a resolved member through the loader.
  pub fn invoke(&self, signature: &Signature, receiver: Option<&Value>, args: &[Value]) -> FoldResult {
    settle(self.loader.invoke_method(signature, receiver, args))
  }

  fn fold_array(&self, ty: Option<&TypeRef>, items: &[Expr], expected: Option<&TypeRef>, visited: &mut HashSet<String>) -> FoldResult {
    let declared = ty.or_else(|| expected.and_then(TypeRef::element_type)).cloned();
    let Some(values) = self.fold_all(items, declared.as_ref(), visited)? else {
      return Ok(None);
    };
    let element = match declared {
      Some(element) => element,
      None => match common_type(&values) {
        Some(element) => element,
        None => return Ok(None),
      },
    };
    let values = values.iter()
      .map(|v| ops::implicit_convert(v, &element).ok())
      .collect::<Option<Vec<_>>>();
    Ok(values.map(|values| Value::Sequence(Sequence::array(element, values))))
  }

  fn fold_new(&self, ty: &TypeRef, args: &[Expr], init: Option<&[Expr]>, visited: &mut HashSet<String>) -> FoldResult {
    let Some(args) = self.fold_all(args, None, visited)? else {
      return Ok(None);
    };
    let constructor = Signature::constructor(ty.clone(), args.iter().map(Value::ty).collect());
    let Some(mut object) = self.invoke(&constructor, None, &args)? else {
      return Ok(None);
    };
    let element = ty.element_type().cloned();
    for item in init.unwrap_or_default() {
      let Some(item) = self.try_fold(item, element.as_ref(), visited)? else {
        return Ok(None);
      };
      let add = Signature { is_static: false, ..Signature::method(ty.clone(), "Add", vec![item.ty()], TypeRef::Void) };
      match self.invoke(&add, Some(&object), &[item])? {
        Some(next) => object = next,
        None => return Ok(None),
      }
    }
    Ok(Some(object))
  }

  /// Compiles a lambda to a delegate. Each invocation resolves the
  /// body against the arguments; a body that does not resolve makes
  /// the enclosing fold fail.
  pub fn compile_lambda(&self, lambda: &Lambda, parameter_types: Option<Vec<TypeRef>>) -> Value {
    let evaluator = self.clone();
    let lambda = lambda.clone();
    Value::Delegate(Delegate::new(move |args: &[Value]| {
      if args.len() != lambda.params.len() {
        return Err(unresolved());
      }
      let mut inner = evaluator.clone();
      for (i, (name, value)) in lambda.params.iter().zip(args).enumerate() {
        let ty = parameter_types.as_ref().and_then(|types| types.get(i)).cloned().unwrap_or_else(|| value.ty());
        inner.scope.bind(name.clone(), ty);
        inner.env_mut().bind_value(name.clone(), value.clone());
      }
      match inner.fold(&lambda.body, None)? {
        Some(value) => Ok(value),
        None => Err(unresolved()),
      }
    }))
  }

  /// Calls a method made available through [`Self::with_methods`].
  pub fn call_method(&self, name: &str, args: &[Value]) -> FoldResult {
    if self.depth >= MAX_CALL_DEPTH {
      trace!("call depth exceeded in {name}");
      return Ok(None);
    }
    let Some(method) = self.find_method(name, args) else {
      trace!("no method {name} for {} argument(s)", args.len());
      return Ok(None);
    };
    let inner = Self { depth: self.depth + 1, ..self.clone() };
    settle(interpreter::run_method(&inner, &method, args))
  }

  fn find_method(&self, name: &str, args: &[Value]) -> Option<MethodDefinition> {
    let methods = self.methods.borrow();
    let candidates = methods.iter().filter(|m| m.name == name && m.params.len() == args.len());
    let mut fallback = None;
    for method in candidates {
      let exact = method.params.iter().zip(args).all(|(p, a)| p.ty == a.ty());
      if exact {
        return Some(method.clone());
      }
      let convertible = method.params.iter().zip(args).all(|(p, a)| match (a.ty(), &p.ty) {
        (TypeRef::Numeric(from), TypeRef::Numeric(to)) => implicit_numeric(from, *to),
        (from, to) => from == *to || *to == TypeRef::Object,
      });
      if convertible && fallback.is_none() {
        fallback = Some(method);
      }
    }
    fallback.cloned()
  }
}

/// The element type inferred for `new[] { ... }`: the promoted type of
/// numeric elements, otherwise the first element's type.
fn common_type(values: &[Value]) -> Option<TypeRef> {
  let first = values.first()?;
  let mut numeric = first.as_number().map(|n| n.ty());
  for value in &values[1..] {
    numeric = match (numeric, value.as_number()) {
      (Some(acc), Some(n)) => promote(acc, n.ty()),
      _ => None,
    };
  }
  Some(numeric.map(TypeRef::Numeric).unwrap_or_else(|| first.ty()))
}

fn coerce(value: Value, expected: Option<&TypeRef>) -> Value {
  if let (Value::Number(n), Some(TypeRef::Numeric(t))) = (&value, expected) {
    if n.ty() != *t && implicit_numeric(n.ty(), *t) {
      if let Ok(converted) = n.convert(*t) {
        return Value::Number(converted);
      }
    }
  }
  value
}
