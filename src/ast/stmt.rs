
use super::{BinaryOp, Expr, TypeRef};

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
  /// `var name = init;` when `ty` is `None`, `T name = init;`
  /// otherwise.
  Let { ty: Option<TypeRef>, name: String, init: Expr },
  /// `name = value;`, or `name op= value;` when `op` is set.
  Assign { name: String, op: Option<BinaryOp>, value: Expr },
  If { cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt> },
  Block(Vec<Stmt>),
  Return(Expr),
  Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
  pub name: String,
  pub ty: TypeRef,
}

/// A static method: either a declaration being optimized or a helper
/// introduced by the optimizer.
///
/// Identity is structural: two definitions are the same helper
/// exactly when they compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefinition {
  pub name: String,
  pub return_type: TypeRef,
  pub params: Vec<Parameter>,
  pub body: Vec<Stmt>,
}

impl Parameter {
  pub fn new(name: impl Into<String>, ty: TypeRef) -> Parameter {
    Parameter { name: name.into(), ty }
  }
}

/// A helper is just a method the optimizer wrote.
pub type HelperDefinition = MethodDefinition;

/// A top-level method together with the attribute names written
/// before it, such as `[FastApprox]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
  pub attributes: Vec<String>,
  pub method: MethodDefinition,
}

impl MethodDefinition {
  /// The overload key: name plus parameter types.
  pub fn signature_matches(&self, other: &MethodDefinition) -> bool {
    self.name == other.name &&
      self.params.len() == other.params.len() &&
      self.params.iter().zip(&other.params).all(|(a, b)| a.ty == b.ty)
  }
}

impl Stmt {
  /// Every expression directly held by this statement, including
  /// those of nested statements.
  pub fn expressions(&self) -> Vec<&Expr> {
    let mut out = Vec::new();
    self.collect_expressions(&mut out);
    out
  }

  fn collect_expressions<'a>(&'a self, out: &mut Vec<&'a Expr>) {
    match self {
      Stmt::Let { init, .. } => out.push(init),
      Stmt::Assign { value, .. } => out.push(value),
      Stmt::If { cond, then, otherwise } => {
        out.push(cond);
        for stmt in then.iter().chain(otherwise) {
          stmt.collect_expressions(out);
        }
      }
      Stmt::Block(stmts) => {
        for stmt in stmts {
          stmt.collect_expressions(out);
        }
      }
      Stmt::Return(expr) | Stmt::Expr(expr) => out.push(expr),
    }
  }

  /// Rewrites every expression held by this statement, nested
  /// statements included.
  pub fn map_expressions<F>(self, f: &mut F) -> Stmt
  where F: FnMut(Expr) -> Expr {
    match self {
      Stmt::Let { ty, name, init } => Stmt::Let { ty, name, init: f(init) },
      Stmt::Assign { name, op, value } => Stmt::Assign { name, op, value: f(value) },
      Stmt::If { cond, then, otherwise } => Stmt::If {
        cond: f(cond),
        then: then.into_iter().map(|s| s.map_expressions(f)).collect(),
        otherwise: otherwise.into_iter().map(|s| s.map_expressions(f)).collect(),
      },
      Stmt::Block(stmts) => Stmt::Block(stmts.into_iter().map(|s| s.map_expressions(f)).collect()),
      Stmt::Return(expr) => Stmt::Return(f(expr)),
      Stmt::Expr(expr) => Stmt::Expr(f(expr)),
    }
  }
}
