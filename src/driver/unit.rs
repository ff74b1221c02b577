
//! Compilation units: a list of method declarations optimized
//! together, sharing one helper table.

use super::default_simplifier;
use super::diagnostic::Diagnostic;
use crate::ast::{Declaration, Expr, HelperDefinition, MethodDefinition, Stmt, TypeRef};
use crate::ast::purity::is_pure;
use crate::ast::walker::free_call_names;
use crate::errorlist::ErrorList;
use crate::eval::{PartialEvaluator, Scope};
use crate::host::{Loader, SymbolResolver};
use crate::optimizer::{EvaluationMode, OptimizerConfig, Session};
use crate::parsing::{parse_unit, ParseError};
use crate::value::{ops, Value};

use itertools::Itertools;
use log::{debug, info};

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct CompilationUnit {
  declarations: Vec<Declaration>,
}

/// The rewritten declarations of a unit, followed by the helpers they
/// call.
#[derive(Debug, Clone)]
pub struct OptimizedUnit {
  pub declarations: Vec<Declaration>,
  pub helpers: Vec<HelperDefinition>,
  pub diagnostics: ErrorList<Diagnostic>,
}

/// Optimizes the statements of one method body in order, carrying
/// what is known about its locals from one statement to the next.
struct BodyOptimizer<'a> {
  session: &'a mut Session,
  config: &'a OptimizerConfig,
  errors: ErrorList<Diagnostic>,
}

impl CompilationUnit {
  pub fn new(declarations: Vec<Declaration>) -> CompilationUnit {
    CompilationUnit { declarations }
  }

  pub fn parse(source: &str) -> Result<CompilationUnit, ParseError> {
    parse_unit(source).map(CompilationUnit::new)
  }

  pub fn declarations(&self) -> &[Declaration] {
    &self.declarations
  }

  pub fn optimize(
    &self,
    resolver: Rc<dyn SymbolResolver>,
    loader: Rc<dyn Loader>,
    config: &OptimizerConfig,
  ) -> OptimizedUnit {
    let scope = Scope::new(resolver);
    let methods = self.declarations.iter().map(|d| d.method.clone()).collect::<Vec<_>>();
    for method in &methods {
      scope.declare_method(method);
    }
    let base = PartialEvaluator::new(scope, loader).with_methods(methods);
    let mut session = Session::new(base.clone(), config.mode);
    let mut diagnostics = ErrorList::new();

    let mut declarations = Vec::with_capacity(self.declarations.len());
    for declaration in &self.declarations {
      let mode = declaration.attributes.iter()
        .find_map(|a| EvaluationMode::from_attribute(a))
        .unwrap_or(config.mode);
      info!("Optimizing {} in {mode:?} mode", declaration.method.name);
      session.set_mode(mode);
      *session.evaluator_mut() = base.clone();
      for param in &declaration.method.params {
        session.evaluator_mut().declare_local(param.name.clone(), param.ty.clone());
      }
      let mut body = BodyOptimizer { session: &mut session, config, errors: ErrorList::new() };
      let stmts = body.stmts(declaration.method.body.clone());
      diagnostics.append(&mut body.errors);
      let method = MethodDefinition { body: stmts, ..declaration.method.clone() };
      declarations.push(Declaration { attributes: declaration.attributes.clone(), method });
    }

    let roots = declarations.iter()
      .flat_map(|d| d.method.body.iter())
      .flat_map(Stmt::expressions)
      .flat_map(free_call_names)
      .collect::<HashSet<_>>();
    let pruned = session.prune_helpers(&roots);
    if !pruned.is_empty() {
      debug!("Dropped helpers no longer called: {}", pruned.join(", "));
    }
    diagnostics.append(&mut session.take_diagnostics());
    let helpers = session.into_helpers().into_definitions();
    OptimizedUnit { declarations, helpers, diagnostics }
  }
}

impl<'a> BodyOptimizer<'a> {
  fn expr(&mut self, expr: Expr) -> Expr {
    let simplifier = default_simplifier(self.session, self.config);
    simplifier.simplify_expr(expr, &mut self.errors)
  }

  fn evaluator(&mut self) -> &mut PartialEvaluator {
    self.session.evaluator_mut()
  }

  /// Statements after one that always throws are unreachable and are
  /// dropped.
  fn stmts(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
      let stmt = self.stmt(stmt);
      let stop = always_throws(&stmt);
      out.push(stmt);
      if stop {
        break;
      }
    }
    out
  }

  /// A statement whose expression settles to a throw is emitted as a
  /// throw statement, the only form C# accepts there.
  fn stmt(&mut self, stmt: Stmt) -> Stmt {
    let stmt = self.optimize_stmt(stmt);
    match thrown_by(&stmt) {
      Some(thrown) if !matches!(stmt, Stmt::Expr(_)) => {
        debug!("{stmt} always throws");
        Stmt::Expr(thrown)
      }
      _ => stmt,
    }
  }

  fn optimize_stmt(&mut self, stmt: Stmt) -> Stmt {
    match stmt {
      Stmt::Let { ty, name, init } => {
        let init = self.expr(init);
        let local_type = ty.clone().or_else(|| self.session.evaluator().scope().resolve_type(&init));
        match local_type {
          Some(local_type) => self.evaluator().declare_local(name.clone(), local_type),
          None => self.evaluator().env_mut().invalidate(&name),
        }
        self.bind(&name, &init, ty.as_ref());
        Stmt::Let { ty, name, init }
      }
      Stmt::Assign { name, op: None, value } => {
        let value = self.expr(value);
        let local_type = self.session.evaluator().scope().local_type(&name).cloned();
        self.evaluator().env_mut().invalidate(&name);
        self.bind(&name, &value, local_type.as_ref());
        Stmt::Assign { name, op: None, value }
      }
      Stmt::Assign { name, op: Some(op), value } => {
        let value = self.expr(value);
        let combined = Expr::binary(op, Expr::ident(name.clone()), value.clone());
        let result = self.compound_result(&name, &combined);
        let env = self.evaluator().env_mut();
        env.invalidate(&name);
        if let Some(result) = result {
          env.bind_value(name.clone(), result);
        }
        Stmt::Assign { name, op: Some(op), value }
      }
      Stmt::If { cond, then, otherwise } => {
        let cond = self.expr(cond);
        let saved = self.session.evaluator().clone();
        let then = self.stmts(then);
        *self.evaluator() = saved.clone();
        let otherwise = self.stmts(otherwise);
        *self.evaluator() = saved;
        let env = self.evaluator().env_mut();
        for name in assigned_names(&then).union(&assigned_names(&otherwise)) {
          env.invalidate(name);
        }
        Stmt::If { cond, then, otherwise }
      }
      Stmt::Block(stmts) => Stmt::Block(self.stmts(stmts)),
      Stmt::Return(expr) => Stmt::Return(self.expr(expr)),
      Stmt::Expr(expr) => Stmt::Expr(self.expr(expr)),
    }
  }

  /// Records what is known about `name` after it takes the value of
  /// `expr`: the value itself if it folds, the expression if it is
  /// pure, and nothing otherwise.
  fn bind(&mut self, name: &str, expr: &Expr, local_type: Option<&TypeRef>) {
    let folded = self.session.evaluator().fold(expr, local_type);
    let env = self.evaluator().env_mut();
    match folded {
      Ok(Some(value)) => env.bind_value(name, value),
      _ if is_pure(expr) => env.bind_expr(name, expr.clone()),
      _ => {}
    }
  }

  /// The value of `name op= value`, converted back to the type of
  /// `name` as compound assignment does.
  fn compound_result(&self, name: &str, combined: &Expr) -> Option<Value> {
    let evaluator = self.session.evaluator();
    let value = evaluator.fold(combined, None).ok()??;
    match evaluator.scope().local_type(name) {
      Some(ty) => ops::cast(&value, ty).ok()?,
      None => Some(value),
    }
  }
}

/// The throw node `stmt` evaluates in place of its own expression.
fn thrown_by(stmt: &Stmt) -> Option<Expr> {
  let expr = match stmt {
    Stmt::Let { init: expr, .. } | Stmt::Assign { value: expr, .. } => expr,
    Stmt::If { cond: expr, .. } | Stmt::Return(expr) | Stmt::Expr(expr) => expr,
    Stmt::Block(_) => return None,
  };
  expr.is_throw().then(|| expr.clone())
}

fn always_throws(stmt: &Stmt) -> bool {
  let ends_throwing = |stmts: &[Stmt]| stmts.last().map_or(false, always_throws);
  match stmt {
    Stmt::Expr(expr) => expr.is_throw(),
    Stmt::Block(inner) => ends_throwing(inner),
    Stmt::If { then, otherwise, .. } => ends_throwing(then) && ends_throwing(otherwise),
    Stmt::Let { .. } | Stmt::Assign { .. } | Stmt::Return(_) => false,
  }
}

/// Every local assigned somewhere in `stmts`, nested blocks included.
fn assigned_names(stmts: &[Stmt]) -> HashSet<String> {
  let mut names = HashSet::new();
  for stmt in stmts {
    match stmt {
      Stmt::Assign { name, .. } => {
        names.insert(name.clone());
      }
      Stmt::If { then, otherwise, .. } => {
        names.extend(assigned_names(then));
        names.extend(assigned_names(otherwise));
      }
      Stmt::Block(inner) => names.extend(assigned_names(inner)),
      Stmt::Let { .. } | Stmt::Return(_) | Stmt::Expr(_) => {}
    }
  }
  names
}

impl Display for OptimizedUnit {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let declarations = self.declarations.iter().map(|d| {
      let attributes = d.attributes.iter().map(|a| format!("[{a}]\n")).join("");
      format!("{attributes}{}", d.method)
    });
    let helpers = self.helpers.iter().map(ToString::to_string);
    write!(f, "{}", declarations.chain(helpers).join("\n\n"))
  }
}

impl OptimizedUnit {
  pub fn emit(&self) -> String {
    self.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::host::{InterpretingLoader, ScopeResolver};

  use test_log::test;

  fn optimize(source: &str) -> OptimizedUnit {
    let unit = CompilationUnit::parse(source).unwrap();
    unit.optimize(Rc::new(ScopeResolver::new()), Rc::new(InterpretingLoader::new()), &OptimizerConfig::default())
  }

  fn returned(unit: &OptimizedUnit, index: usize) -> String {
    let body = &unit.declarations[index].method.body;
    body.last().unwrap().to_string()
  }

  #[test]
  fn test_locals_carry_between_statements() {
    let unit = optimize("static int F(int a) { int n = 3; n += 2; return Math.Abs(n - 10); }");
    assert_eq!(returned(&unit, 0), "return 5;");
    assert!(unit.diagnostics.is_empty());
  }

  #[test]
  fn test_branch_assignments_forget_values() {
    let unit = optimize("static int F(int a) { int n = 3; if (a > 0) { n = 7; } return Math.Abs(n - 5); }");
    assert!(returned(&unit, 0).contains("Abs(n - 5)"));
    let unit = optimize("static int F(int a) { int n = 3; if (a > 0) { int m = 7; } return Math.Abs(n - 5); }");
    assert_eq!(returned(&unit, 0), "return 2;");
  }

  #[test]
  fn test_parameters_are_unknown() {
    let unit = optimize("static double F(double x) { return Math.Max(Math.Min(x, 1.5), 0.5); }");
    assert_eq!(returned(&unit, 0), "return double.Clamp(x, 0.5, 1.5);");
  }

  #[test]
  fn test_mode_per_declaration() {
    let unit = optimize(
      "[FastApprox] static double F(double x) { return Math.Sin(x); }\n\
       static double G(double x) => Math.Sin(x);",
    );
    assert_eq!(returned(&unit, 0), "return FastSin(x);");
    assert_eq!(returned(&unit, 1), "return double.Sin(x);");
    assert_eq!(unit.helpers.len(), 1);
    assert_eq!(unit.helpers[0].name, "FastSin");
  }

  #[test]
  fn test_helpers_shared_across_declarations() {
    let unit = optimize(
      "[FastApprox] static double F(double x) => Math.Sin(x) + Math.Sin(2.0 * x);\n\
       [FastApprox] static double G(double y) => Math.Sin(y);",
    );
    assert_eq!(unit.helpers.len(), 1);
    assert!(unit.diagnostics.is_empty());
  }

  #[test]
  fn test_helper_of_discarded_branch_is_pruned() {
    let unit = optimize("[FastApprox] static double F(double x) { return Math.Abs(-1) > 0 ? 1.0 : Math.Sin(x); }");
    assert_eq!(returned(&unit, 0), "return 1.0;");
    assert!(unit.helpers.is_empty());
  }

  #[test]
  fn test_faulting_statements_become_throw_statements() {
    let unit = optimize(
      "static int F(int a) { int c = a; int b = 1 / 0; return b + c; }\n\
       static int G(int a) { if (a > 0) { return (1 / 0) + a; } return a; }",
    );
    let thrown = "throw new System.DivideByZeroException(\"Attempted to divide by zero.\");";
    let body = &unit.declarations[0].method.body;
    assert_eq!(body.len(), 2);
    assert_eq!(returned(&unit, 0), thrown);
    let Stmt::If { then, .. } = &unit.declarations[1].method.body[0] else {
      panic!("expected an if statement");
    };
    assert_eq!(then.last().unwrap().to_string(), thrown);
    assert_eq!(returned(&unit, 1), "return a;");
    let text = unit.emit();
    assert!(!text.contains("= throw"));
    assert!(!text.contains("return throw"));
    assert!(!text.contains("(throw"));
  }

  #[test]
  fn test_emit() {
    let unit = optimize("[FastApprox] static double F(double x) { return Math.Sin(x); }");
    let text = unit.emit();
    assert!(text.starts_with("[FastApprox]\nprivate static double F(double x)\n{\n"));
    assert!(text.contains("return FastSin(x);"));
    assert!(text.contains("private static double FastSin(double x)"));
    assert_eq!(text.matches("FastSin(double").count(), 1);
  }
}
