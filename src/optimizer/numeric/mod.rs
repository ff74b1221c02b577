
//! Strategies for the math library: the members of `Math` and `MathF`,
//! and the same members called on a numeric type, such as
//! `double.Floor(x)`.
//!
//! Every strategy validates the call, folds it when all of its
//! arguments fold, and then tries, in order, idempotence, the
//! function's own algebraic rules, and (in
//! [`EvaluationMode::FastApprox`](super::EvaluationMode::FastApprox))
//! an approximating helper. A call that nothing applies to is
//! retargeted to its numeric type, `T.Name(args)`, which is the
//! canonical spelling of the overload it already resolved to.

mod bounds;
pub mod fast;
mod power;
mod rounding;
mod sign;

use super::context::OptimizerContext;
use super::flags::StrategyFlags;
use crate::ast::{Call, CallTarget, Expr, NumericType, TypeRef, UnaryOp};
use crate::value::Number;

use log::{debug, trace};
use phf::phf_map;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFunction {
  Abs,
  Acos,
  Acosh,
  AcosPi,
  Asin,
  Asinh,
  AsinPi,
  Atan,
  Atanh,
  AtanPi,
  Atan2,
  Atan2Pi,
  BitDecrement,
  BitIncrement,
  Cbrt,
  Ceiling,
  Clamp,
  CopySign,
  Cos,
  Cosh,
  CosPi,
  DegreesToRadians,
  Exp,
  Exp2,
  Exp10,
  Floor,
  ILogB,
  Lerp,
  Log,
  Log2,
  Log10,
  Max,
  Min,
  Pow,
  RadiansToDegrees,
  RootN,
  Round,
  Sign,
  Sin,
  SinCos,
  Sinh,
  SinPi,
  Sqrt,
  Tan,
  Tanh,
  TanPi,
  Truncate,
}

static FUNCTIONS: phf::Map<&'static str, MathFunction> = phf_map! {
  "Abs" => MathFunction::Abs,
  "Acos" => MathFunction::Acos,
  "Acosh" => MathFunction::Acosh,
  "AcosPi" => MathFunction::AcosPi,
  "Asin" => MathFunction::Asin,
  "Asinh" => MathFunction::Asinh,
  "AsinPi" => MathFunction::AsinPi,
  "Atan" => MathFunction::Atan,
  "Atanh" => MathFunction::Atanh,
  "AtanPi" => MathFunction::AtanPi,
  "Atan2" => MathFunction::Atan2,
  "Atan2Pi" => MathFunction::Atan2Pi,
  "BitDecrement" => MathFunction::BitDecrement,
  "BitIncrement" => MathFunction::BitIncrement,
  "Cbrt" => MathFunction::Cbrt,
  "Ceiling" => MathFunction::Ceiling,
  "Clamp" => MathFunction::Clamp,
  "CopySign" => MathFunction::CopySign,
  "Cos" => MathFunction::Cos,
  "Cosh" => MathFunction::Cosh,
  "CosPi" => MathFunction::CosPi,
  "DegreesToRadians" => MathFunction::DegreesToRadians,
  "Exp" => MathFunction::Exp,
  "Exp2" => MathFunction::Exp2,
  "Exp10" => MathFunction::Exp10,
  "Floor" => MathFunction::Floor,
  "ILogB" => MathFunction::ILogB,
  "Lerp" => MathFunction::Lerp,
  "Log" => MathFunction::Log,
  "Log2" => MathFunction::Log2,
  "Log10" => MathFunction::Log10,
  "Max" => MathFunction::Max,
  "Min" => MathFunction::Min,
  "Pow" => MathFunction::Pow,
  "RadiansToDegrees" => MathFunction::RadiansToDegrees,
  "RootN" => MathFunction::RootN,
  "Round" => MathFunction::Round,
  "Sign" => MathFunction::Sign,
  "Sin" => MathFunction::Sin,
  "SinCos" => MathFunction::SinCos,
  "Sinh" => MathFunction::Sinh,
  "SinPi" => MathFunction::SinPi,
  "Sqrt" => MathFunction::Sqrt,
  "Tan" => MathFunction::Tan,
  "Tanh" => MathFunction::Tanh,
  "TanPi" => MathFunction::TanPi,
  "Truncate" => MathFunction::Truncate,
};

impl MathFunction {
  pub fn from_name(name: &str) -> Option<MathFunction> {
    FUNCTIONS.get(name).copied()
  }

  /// Argument counts this function has a strategy for.
  pub fn arities(self) -> &'static [usize] {
    use MathFunction::*;
    match self {
      Atan2 | Atan2Pi | CopySign | Max | Min | Pow | RootN => &[2],
      Clamp | Lerp => &[3],
      Log => &[1, 2],
      Round => &[1, 2, 3],
      _ => &[1],
    }
  }

  pub fn flags(self) -> StrategyFlags {
    use MathFunction::*;
    match self {
      // Nested clamps with matching bounds are handled with the other
      // bound rules, since the bounds must be compared too.
      Abs | Ceiling | Floor | Round | Truncate => StrategyFlags::IS_IDEMPOTENT,
      _ => StrategyFlags::empty(),
    }
  }

  /// Functions whose result is always a whole number, an infinity, or
  /// NaN.
  pub fn is_integral(self) -> bool {
    matches!(self, MathFunction::Ceiling | MathFunction::Floor | MathFunction::Round | MathFunction::Truncate)
  }
}

/// A validated math call, together with the operand type `T` of the
/// overload it resolved to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MathSite<'c, 'a> {
  pub ctx: &'c OptimizerContext<'a>,
  pub function: MathFunction,
  pub ty: NumericType,
}

/// Tries the numeric registry on the context's call.
pub fn try_optimize(ctx: &OptimizerContext) -> Option<Expr> {
  let call = ctx.call();
  let function = MathFunction::from_name(&call.name)?;
  if !matches!(call.target, CallTarget::Static(_)) || !function.arities().contains(&call.args.len()) {
    return None;
  }
  let ty = operand_type(ctx)?;
  if let Some(folded) = ctx.fold_call() {
    debug!("Folded {call} to {folded}");
    return Some(folded);
  }
  let site = MathSite { ctx, function, ty };
  if let Some(rewritten) = site.rewrite() {
    debug!("{}: {call} => {rewritten}", call.name);
    return Some(rewritten);
  }
  retarget(&site)
}

/// The operand type of a recognized math call: declared on `Math`,
/// `MathF`, or a numeric type, with a numeric first parameter.
fn operand_type(ctx: &OptimizerContext) -> Option<NumericType> {
  let signature = ctx.signature();
  if !signature.is_math_facade() && !signature.declaring_type.is_numeric() {
    trace!("{} is not a math member", ctx.call());
    return None;
  }
  signature.parameter_types.first()?.as_numeric()
}

fn retarget(site: &MathSite) -> Option<Expr> {
  let call = site.ctx.call();
  let target = site.target();
  if call.static_type() == Some(&target) {
    return None;
  }
  let retargeted = Call::on_type(target, call.name.clone(), call.args.clone()).with_type_args(call.type_args.clone());
  let signature = site.ctx.resolve_call(&retargeted)?;
  if signature.return_type != site.ctx.signature().return_type {
    trace!("{retargeted} would change the type of {call}");
    return None;
  }
  debug!("Retargeted {call} to {retargeted}");
  Some(Expr::Call(retargeted))
}

impl<'c, 'a> MathSite<'c, 'a> {
  fn rewrite(&self) -> Option<Expr> {
    use MathFunction::*;
    self.idempotence()
      .or_else(|| match self.function {
        Ceiling | Floor | Round | Truncate => rounding::rewrite(self),
        Abs | CopySign => sign::rewrite(self),
        Clamp | Max | Min => bounds::rewrite(self),
        Pow | RootN | Sqrt | Exp | Lerp | DegreesToRadians | RadiansToDegrees |
        BitIncrement | BitDecrement => power::rewrite(self),
        _ => None,
      })
      .or_else(|| if self.is_fast() { fast::rewrite(self) } else { None })
  }

  /// `f(f(x))` to `f(x)` for the one-argument form of an idempotent
  /// function.
  fn idempotence(&self) -> Option<Expr> {
    if !self.function.flags().contains(StrategyFlags::IS_IDEMPOTENT) || self.args().len() != 1 {
      return None;
    }
    let inner = self.inner(0, self.function)?;
    (inner.args.len() == 1).then(|| self.arg(0).clone())
  }

  pub fn is_fast(&self) -> bool {
    self.ctx.is_fast()
  }

  pub fn args(&self) -> &'a [Expr] {
    self.ctx.args()
  }

  pub fn arg(&self, index: usize) -> &'a Expr {
    &self.ctx.args()[index]
  }

  /// `T` as a type.
  pub fn target(&self) -> TypeRef {
    TypeRef::Numeric(self.ty)
  }

  pub fn is_floating(&self) -> bool {
    self.ty.is_floating()
  }

  /// `T.name(args)`.
  pub fn build(&self, name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call(Call::on_type(self.target(), name, args))
  }

  pub fn has_type(&self, expr: &Expr) -> bool {
    self.ctx.resolve_type(expr).as_ref() == Some(&self.target())
  }

  /// `expr`, converted to `T` if it has some other type.
  pub fn convert(&self, expr: &Expr) -> Expr {
    if self.has_type(expr) {
      expr.clone()
    } else {
      Expr::cast(self.target(), expr.clone())
    }
  }

  /// Argument `index`, converted to `T`.
  pub fn operand(&self, index: usize) -> Expr {
    self.convert(self.arg(index))
  }

  /// The value of argument `index` as a `T`, if it folds.
  pub fn literal(&self, index: usize) -> Option<Number> {
    self.ctx.fold_number(self.arg(index))?.convert(self.ty).ok()
  }

  /// A literal of type `T`.
  pub fn number(&self, value: f64) -> Expr {
    Expr::number(Number::from_f64(value, self.ty))
  }

  /// A math call with operand and result type `T`, and which function
  /// it is.
  pub fn math_call(&self, expr: &'a Expr) -> Option<(MathFunction, &'a Call)> {
    let call = self.typed_call(expr)?;
    Some((MathFunction::from_name(&call.name)?, call))
  }

  /// A static call on `Math`, `MathF`, or a numeric type whose first
  /// operand and result are both `T`, whatever its name.
  pub fn typed_call(&self, expr: &'a Expr) -> Option<&'a Call> {
    let call = expr.unparen().as_call()?;
    if !matches!(call.target, CallTarget::Static(_)) {
      return None;
    }
    let signature = self.ctx.resolve_call(call)?;
    if !signature.is_math_facade() && !signature.declaring_type.is_numeric() {
      return None;
    }
    let target = self.target();
    (signature.parameter_types.first() == Some(&target) && signature.return_type == target).then_some(call)
  }

  /// Argument `index`, if it is a call to `function` on `T`.
  pub fn inner(&self, index: usize, function: MathFunction) -> Option<&'a Call> {
    match self.math_call(self.arg(index))? {
      (f, call) if f == function => Some(call),
      _ => None,
    }
  }

  /// The operand of argument `index` when that argument is a negation
  /// of a `T`.
  pub fn negated(&self, index: usize) -> Option<&'a Expr> {
    let operand = self.arg(index).as_negation()?;
    self.has_type(operand).then_some(operand)
  }
}

pub(crate) fn negate(expr: Expr) -> Expr {
  Expr::unary(UnaryOp::Neg, expr)
}

#[cfg(test)]
pub(crate) mod testing {
  use crate::ast::{Expr, TypeRef};
  use crate::eval::{FoldResult, PartialEvaluator, Scope};
  use crate::host::{InterpretingLoader, ScopeResolver};
  use crate::optimizer::{try_optimize_call, EvaluationMode, OptimizerContext, Session};
  use crate::parsing::parse_expr;
  use crate::value::Value;

  use std::rc::Rc;

  pub fn session(mode: EvaluationMode, locals: &[(&str, TypeRef)]) -> Session {
    let mut resolver = ScopeResolver::new();
    for (name, ty) in locals {
      resolver.bind(*name, ty.clone());
    }
    let evaluator = PartialEvaluator::new(Scope::new(Rc::new(resolver)), Rc::new(InterpretingLoader::new()));
    Session::new(evaluator, mode)
  }

  /// Runs the registries on the outermost call of `source`.
  pub fn rewrite(session: &Session, source: &str) -> Option<Expr> {
    let expr = parse_expr(source).unwrap();
    rewrite_expr(session, &expr)
  }

  pub fn rewrite_expr(session: &Session, expr: &Expr) -> Option<Expr> {
    let call = expr.as_call().unwrap();
    let signature = session.evaluator().scope().resolve_call_signature(call)?;
    let ctx = OptimizerContext::new(call, call, signature, session.evaluator(), session);
    try_optimize_call(&ctx)
  }

  pub fn rewrite_str(session: &Session, source: &str) -> Option<String> {
    rewrite(session, source).map(|e| e.to_string())
  }

  /// Asserts that `original` and `rewritten` agree for every value of
  /// `name` in `samples`, including which exception they raise. Any
  /// two NaNs agree.
  pub fn assert_agree(session: &Session, original: &str, rewritten: &Expr, name: &str, samples: &[Value]) {
    let original = parse_expr(original).unwrap();
    for sample in samples {
      let bindings = [(name, sample.clone())];
      let expected = eval_with(session, &original, &bindings);
      let actual = eval_with(session, rewritten, &bindings);
      let both_nan = matches!((&expected, &actual), (Ok(Some(Value::Number(a))), Ok(Some(Value::Number(b)))) if a.is_nan() && b.is_nan());
      assert!(both_nan || expected == actual, "{original} and {rewritten} differ at {name} = {sample:?}: {expected:?} vs {actual:?}");
    }
  }

  /// Doubles worth checking any rewrite against.
  pub fn edge_doubles() -> Vec<Value> {
    [0.0, -0.0, 1.0, -1.0, 2.5, -2.5, 0.5, -7.25, f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e300]
      .into_iter()
      .map(|x| Value::Number(crate::value::Number::Double(x)))
      .collect()
  }

  pub fn eval_with(session: &Session, expr: &Expr, bindings: &[(&str, Value)]) -> FoldResult {
    let mut evaluator = session.evaluator().clone();
    for (name, value) in bindings {
      evaluator.env_mut().bind_value(*name, value.clone());
    }
    evaluator.fold(expr, None)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use super::testing::*;
  use crate::optimizer::EvaluationMode;
  use crate::value::Value;

  fn double() -> TypeRef {
    TypeRef::Numeric(NumericType::Double)
  }

  #[test]
  fn test_registry_covers_catalog() {
    assert_eq!(FUNCTIONS.len(), 47);
    assert_eq!(MathFunction::from_name("Log").unwrap().arities(), &[1, 2]);
    assert!(MathFunction::from_name("FusedMultiplyAdd").is_none());
  }

  #[test]
  fn test_folds_literal_calls() {
    let session = session(EvaluationMode::Exact, &[]);
    assert_eq!(rewrite_str(&session, "Math.Max(3, 7)").unwrap(), "7");
    assert_eq!(rewrite_str(&session, "Math.Sqrt(4.0)").unwrap(), "2.0");
  }

  #[test]
  fn test_folding_preserves_faults() {
    let session = session(EvaluationMode::Exact, &[]);
    let folded = rewrite(&session, "Math.Clamp(1, 5, 2)").unwrap();
    assert!(folded.is_throw());
    let folded = rewrite(&session, "Math.Sign(double.NaN)").unwrap();
    assert_eq!(
      folded.to_string(),
      "throw new System.ArithmeticException(\"Function does not accept floating point Not-a-Number values.\")",
    );
  }

  #[test]
  fn test_retargets_to_operand_type() {
    let session = session(EvaluationMode::Exact, &[("x", double()), ("i", NumericType::Int32.into())]);
    assert_eq!(rewrite_str(&session, "Math.Sin(x)").unwrap(), "double.Sin(x)");
    assert_eq!(rewrite_str(&session, "Math.Max(i, 2)").unwrap(), "int.Max(i, 2)");
    assert_eq!(rewrite(&session, "double.Sin(x)"), None);
  }

  #[test]
  fn test_idempotence() {
    let session = session(EvaluationMode::Exact, &[("x", double())]);
    assert_eq!(rewrite_str(&session, "Math.Floor(double.Floor(x))").unwrap(), "double.Floor(x)");
    assert_eq!(rewrite_str(&session, "double.Abs(Math.Abs(x))").unwrap(), "Math.Abs(x)");
    assert!(!MathFunction::Clamp.flags().contains(StrategyFlags::IS_IDEMPOTENT));
    assert_eq!(rewrite_str(&session, "Math.Clamp(Math.Clamp(x, 0.5, 2.0), 0.5, 2.0)").unwrap(), "double.Clamp(x, 0.5, 2.0)");
  }

  #[test]
  fn test_declines_instance_calls() {
    let session = session(EvaluationMode::Exact, &[("xs", TypeRef::array(double()))]);
    let expr = parse("xs.Max()");
    let call = expr.as_call().unwrap();
    let signature = session.evaluator().scope().resolve_call_signature(call).unwrap();
    let ctx = OptimizerContext::new(call, call, signature, session.evaluator(), &session);
    assert_eq!(try_optimize(&ctx), None);
    let value = eval_with(&session, &parse("Math.Abs(-2.5)"), &[]).unwrap();
    assert_eq!(value, Some(Value::Number(Number::Double(2.5))));
  }

  fn parse(source: &str) -> Expr {
    crate::parsing::parse_expr(source).unwrap()
  }
}
