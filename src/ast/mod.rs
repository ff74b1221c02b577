
//! The syntax tree that the optimizer reads and produces.
//!
//! Trees are immutable. Children are reference-counted, so a rewrite
//! that replaces one node shares every untouched sub-tree with the
//! original.

pub mod printer;
pub mod purity;
pub mod stmt;
pub mod types;
pub mod walker;

pub use stmt::{Declaration, HelperDefinition, MethodDefinition, Parameter, Stmt};
pub use types::{NumericType, TypeRef};

use crate::value::Number;

use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
  Number(Number),
  Bool(bool),
  Char(char),
  String(String),
  Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
  Neg,
  Plus,
  Not,
  BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Shl,
  Shr,
  Lt,
  Le,
  Gt,
  Ge,
  Eq,
  Ne,
  BitAnd,
  BitXor,
  BitOr,
  And,
  Or,
  Coalesce,
}

/// How a call names the function it invokes.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
  /// An unqualified call, such as a call to a helper definition.
  Free,
  /// `Type.Name(...)`.
  Static(TypeRef),
  /// `receiver.Name(...)`, including extension-method calls.
  Instance(Rc<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
  pub target: CallTarget,
  pub name: String,
  pub type_args: Vec<TypeRef>,
  pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
  pub params: Vec<String>,
  pub body: Rc<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Literal(Literal),
  Ident(String),
  Paren(Rc<Expr>),
  Unary(UnaryOp, Rc<Expr>),
  Binary(BinaryOp, Rc<Expr>, Rc<Expr>),
  Conditional(Rc<Expr>, Rc<Expr>, Rc<Expr>),
  Call(Call),
  /// Instance member access, `receiver.Name`.
  Member(Rc<Expr>, String),
  /// Static member access, `Type.Name`.
  StaticMember(TypeRef, String),
  Index(Rc<Expr>, Rc<Expr>),
  Lambda(Lambda),
  Cast(TypeRef, Rc<Expr>),
  /// `new T[] { ... }` when the element type is spelled, `new[] { ... }`
  /// otherwise.
  ArrayLit(Option<TypeRef>, Vec<Expr>),
  /// `new T(args) { initializer }`.
  New(TypeRef, Vec<Expr>, Option<Vec<Expr>>),
  Tuple(Vec<Expr>),
  Range(Option<Rc<Expr>>, Option<Rc<Expr>>),
  FromEnd(Rc<Expr>),
  /// `throw new Type("message")`, a node that always raises.
  Throw { exception_type: String, message: String },
}

impl Literal {
  pub fn as_number(&self) -> Option<&Number> {
    match self {
      Literal::Number(n) => Some(n),
      _ => None,
    }
  }
}

impl Call {
  pub fn free(name: impl Into<String>, args: Vec<Expr>) -> Call {
    Call { target: CallTarget::Free, name: name.into(), type_args: Vec::new(), args }
  }

  pub fn on_type(ty: TypeRef, name: impl Into<String>, args: Vec<Expr>) -> Call {
    Call { target: CallTarget::Static(ty), name: name.into(), type_args: Vec::new(), args }
  }

  pub fn on(receiver: Expr, name: impl Into<String>, args: Vec<Expr>) -> Call {
    Call { target: CallTarget::Instance(Rc::new(receiver)), name: name.into(), type_args: Vec::new(), args }
  }

  pub fn with_type_args(mut self, type_args: Vec<TypeRef>) -> Call {
    self.type_args = type_args;
    self
  }

  pub fn receiver(&self) -> Option<&Expr> {
    match &self.target {
      CallTarget::Instance(receiver) => Some(receiver.as_ref()),
      _ => None,
    }
  }

  pub fn static_type(&self) -> Option<&TypeRef> {
    match &self.target {
      CallTarget::Static(ty) => Some(ty),
      _ => None,
    }
  }

  /// The same call with its arguments replaced.
  pub fn with_args(&self, args: Vec<Expr>) -> Call {
    Call { args, ..self.clone() }
  }

  /// The same call on a different receiver.
  pub fn with_receiver(&self, receiver: Expr) -> Call {
    Call { target: CallTarget::Instance(Rc::new(receiver)), ..self.clone() }
  }
}

impl Lambda {
  pub fn new(params: Vec<String>, body: Expr) -> Lambda {
    Lambda { params, body: Rc::new(body) }
  }

  /// The single parameter of a one-argument lambda.
  pub fn single_param(&self) -> Option<&str> {
    match self.params.as_slice() {
      [param] => Some(param.as_str()),
      _ => None,
    }
  }
}

impl Expr {
  pub fn number(n: Number) -> Expr {
    Expr::Literal(Literal::Number(n))
  }

  pub fn int(n: i32) -> Expr {
    Expr::number(Number::Int32(n))
  }

  pub fn bool(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
  }

  pub fn ident(name: impl Into<String>) -> Expr {
    Expr::Ident(name.into())
  }

  pub fn call(call: Call) -> Expr {
    Expr::Call(call)
  }

  pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    Expr::Unary(op, Rc::new(operand))
  }

  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(op, Rc::new(lhs), Rc::new(rhs))
  }

  pub fn member(receiver: Expr, name: impl Into<String>) -> Expr {
    Expr::Member(Rc::new(receiver), name.into())
  }

  pub fn index(receiver: Expr, index: Expr) -> Expr {
    Expr::Index(Rc::new(receiver), Rc::new(index))
  }

  pub fn lambda(param: impl Into<String>, body: Expr) -> Expr {
    Expr::Lambda(Lambda::new(vec![param.into()], body))
  }

  pub fn cast(ty: TypeRef, operand: Expr) -> Expr {
    Expr::Cast(ty, Rc::new(operand))
  }

  pub fn as_call(&self) -> Option<&Call> {
    match self {
      Expr::Call(call) => Some(call),
      _ => None,
    }
  }

  pub fn as_lambda(&self) -> Option<&Lambda> {
    match self {
      Expr::Lambda(lambda) => Some(lambda),
      _ => None,
    }
  }

  pub fn as_literal(&self) -> Option<&Literal> {
    match self {
      Expr::Literal(lit) => Some(lit),
      _ => None,
    }
  }

  pub fn as_ident(&self) -> Option<&str> {
    match self {
      Expr::Ident(name) => Some(name.as_str()),
      _ => None,
    }
  }

  /// Strips any number of enclosing parentheses.
  pub fn unparen(&self) -> &Expr {
    let mut expr = self;
    while let Expr::Paren(inner) = expr {
      expr = inner.as_ref();
    }
    expr
  }

  /// The operand of a unary minus, looking through parentheses.
  pub fn as_negation(&self) -> Option<&Expr> {
    match self.unparen() {
      Expr::Unary(UnaryOp::Neg, operand) => Some(operand.as_ref()),
      _ => None,
    }
  }

  /// A numeric literal, or the negation of one, as written.
  pub fn as_numeric_literal(&self) -> Option<Number> {
    match self.unparen() {
      Expr::Literal(Literal::Number(n)) => Some(n.clone()),
      Expr::Unary(UnaryOp::Neg, inner) => {
        let n = inner.as_numeric_literal()?;
        crate::value::ops::negate(&n).ok().flatten()
      }
      _ => None,
    }
  }

  pub fn is_throw(&self) -> bool {
    matches!(self, Expr::Throw { .. })
  }

  /// Wraps `self` in parentheses unless it is already atomic.
  pub fn parenthesized(self) -> Expr {
    match self {
      Expr::Literal(_) | Expr::Ident(_) | Expr::Paren(_) | Expr::Call(_) |
      Expr::Member(..) | Expr::StaticMember(..) | Expr::Index(..) => self,
      other => Expr::Paren(Rc::new(other)),
    }
  }
}

impl From<Call> for Expr {
  fn from(call: Call) -> Expr {
    Expr::Call(call)
  }
}

impl From<Lambda> for Expr {
  fn from(lambda: Lambda) -> Expr {
    Expr::Lambda(lambda)
  }
}
