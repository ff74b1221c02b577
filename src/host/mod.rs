
//! The services the optimizer consults about the program it rewrites:
//! symbol resolution and host execution.
//!
//! Both are traits so that a driver embedded in a real compiler can
//! supply its own. [`ScopeResolver`] and [`InterpretingLoader`] are
//! self-contained implementations over this crate's own value model.

pub mod linq;
pub mod loader;
pub mod math;
pub mod resolver;

pub use loader::InterpretingLoader;
pub use resolver::ScopeResolver;

use crate::ast::{Call, Expr, MethodDefinition, TypeRef};
use crate::value::Value;

use thiserror::Error;

/// A runtime exception raised by executed host code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{type_name}: {message}")]
pub struct HostException {
  pub type_name: String,
  pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
  Method,
  Constructor,
  Field,
}

/// A resolved member. Extension methods are static methods whose first
/// parameter is the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
  pub name: String,
  pub declaring_type: TypeRef,
  pub parameter_types: Vec<TypeRef>,
  pub return_type: TypeRef,
  pub type_arguments: Vec<TypeRef>,
  pub kind: MemberKind,
  pub is_static: bool,
  pub is_extension: bool,
}

/// A type the loader knows how to execute members of.
#[derive(Debug, Clone, PartialEq)]
pub struct HostType {
  pub name: String,
  pub ty: TypeRef,
}

pub trait SymbolResolver {
  fn resolve_call_signature(&self, call: &Call) -> Option<Signature>;

  fn resolve_type(&self, expr: &Expr) -> Option<TypeRef>;

  /// The field or property named by a member access.
  fn resolve_member(&self, _expr: &Expr) -> Option<Signature> {
    None
  }

  /// The parameter types of the lambda passed as argument `index` of
  /// `call`.
  fn lambda_parameter_types(&self, _call: &Call, _index: usize) -> Option<Vec<TypeRef>> {
    None
  }

  /// A resolver for a nested scope that also knows `locals`.
  fn with_locals(&self, locals: Vec<(String, TypeRef)>) -> Box<dyn SymbolResolver + '_>;

  /// Makes a method callable by name in this and every derived scope.
  fn declare_method(&self, _method: &MethodDefinition) {}
}

pub trait Loader {
  fn host_type(&self, signature: &Signature) -> Option<HostType>;

  /// Executes a method or constructor. `Ok(None)` means the member is
  /// unknown; `Err` is an exception raised by the member itself.
  fn invoke_method(&self, signature: &Signature, receiver: Option<&Value>, args: &[Value]) -> Result<Option<Value>, HostException>;

  fn field_value(&self, signature: &Signature, receiver: Option<&Value>) -> Result<Option<Value>, HostException>;

  fn tuple_type(&self, arity: usize) -> Option<HostType>;
}

impl HostException {
  pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
    Self { type_name: type_name.into(), message: message.into() }
  }

  pub fn overflow() -> Self {
    Self::new("System.OverflowException", "Arithmetic operation resulted in an overflow.")
  }

  pub fn invalid_operation(message: impl Into<String>) -> Self {
    Self::new("System.InvalidOperationException", message)
  }

  pub fn argument(message: impl Into<String>) -> Self {
    Self::new("System.ArgumentException", message)
  }

  pub fn argument_out_of_range(param: &str) -> Self {
    Self::new(
      "System.ArgumentOutOfRangeException",
      format!("Specified argument was out of the range of valid values. (Parameter '{param}')"),
    )
  }

  /// A node that raises this exception wherever it is evaluated.
  pub fn to_expr(&self) -> Expr {
    Expr::Throw { exception_type: self.type_name.clone(), message: self.message.clone() }
  }
}

impl Signature {
  pub fn method(declaring_type: TypeRef, name: impl Into<String>, parameter_types: Vec<TypeRef>, return_type: TypeRef) -> Self {
    Self {
      name: name.into(),
      declaring_type,
      parameter_types,
      return_type,
      type_arguments: Vec::new(),
      kind: MemberKind::Method,
      is_static: true,
      is_extension: false,
    }
  }

  pub fn field(declaring_type: TypeRef, name: impl Into<String>, ty: TypeRef, is_static: bool) -> Self {
    Self {
      name: name.into(),
      declaring_type,
      parameter_types: Vec::new(),
      return_type: ty,
      type_arguments: Vec::new(),
      kind: MemberKind::Field,
      is_static,
      is_extension: false,
    }
  }

  pub fn constructor(ty: TypeRef, parameter_types: Vec<TypeRef>) -> Self {
    let name = match &ty {
      TypeRef::Named { name, .. } => name.clone(),
      other => other.to_string(),
    };
    Self {
      name,
      declaring_type: ty.clone(),
      parameter_types,
      return_type: ty,
      type_arguments: Vec::new(),
      kind: MemberKind::Constructor,
      is_static: true,
      is_extension: false,
    }
  }

  pub fn extension(self) -> Self {
    Self { is_extension: true, ..self }
  }

  pub fn with_type_arguments(self, type_arguments: Vec<TypeRef>) -> Self {
    Self { type_arguments, ..self }
  }

  /// Parameter count as written at the call site, which excludes the
  /// receiver of an extension method.
  pub fn arity(&self) -> usize {
    if self.is_extension {
      self.parameter_types.len().saturating_sub(1)
    } else {
      self.parameter_types.len()
    }
  }

  /// The declaring type's name, for named types.
  pub fn declaring_type_name(&self) -> Option<&str> {
    match &self.declaring_type {
      TypeRef::Named { name, .. } => Some(name),
      _ => None,
    }
  }

  /// Declared on `Math` or `MathF`.
  pub fn is_math_facade(&self) -> bool {
    matches!(self.declaring_type_name(), Some("Math" | "MathF"))
  }

  /// Declared on `System.Linq.Enumerable`.
  pub fn is_enumerable(&self) -> bool {
    self.declaring_type_name() == Some("Enumerable")
  }

  /// The element type of the receiver of a sequence operator.
  pub fn source_element_type(&self) -> Option<&TypeRef> {
    self.parameter_types.first().and_then(TypeRef::element_type)
  }
}
