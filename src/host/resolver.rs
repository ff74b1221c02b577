
//! A self-contained [`SymbolResolver`] that types expressions from
//! their locals, their literals, and a built-in table of the math and
//! sequence libraries.

use super::{Signature, SymbolResolver};
use crate::ast::{BinaryOp, Call, CallTarget, Expr, Literal, MethodDefinition, NumericType, TypeRef, UnaryOp};
use crate::value::ops::{promote, promote_unary};

use phf::phf_map;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The type that owns the methods of a compilation unit.
pub const UNIT_TYPE: &str = "Program";

/// How the parameters and result of a math member relate to its
/// operand type `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
  /// `T f(T, ...)` with the given arity.
  Same(usize),
  /// `bool f(T)`.
  Predicate,
  /// `int f(T)`.
  ToInt32,
  /// `T f(T, int)`.
  WithInt32,
  /// `(T, T) f(T)`.
  Pair,
  /// `Round(T)`, `Round(T, int)`, `Round(T, MidpointRounding)` and
  /// `Round(T, int, MidpointRounding)`.
  Round,
  /// `Log(T)` and `Log(T, T)`.
  Log,
}

/// Which operand types a member has overloads for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
  Floating,
  /// Floating types and `decimal`.
  Rounding,
  /// Signed integers, floating types and `decimal`.
  Signed,
  All,
}

static MATH_MEMBERS: phf::Map<&'static str, (Shape, Family)> = phf_map! {
  "Abs" => (Shape::Same(1), Family::Signed),
  "Acos" => (Shape::Same(1), Family::Floating),
  "Acosh" => (Shape::Same(1), Family::Floating),
  "AcosPi" => (Shape::Same(1), Family::Floating),
  "Asin" => (Shape::Same(1), Family::Floating),
  "Asinh" => (Shape::Same(1), Family::Floating),
  "AsinPi" => (Shape::Same(1), Family::Floating),
  "Atan" => (Shape::Same(1), Family::Floating),
  "Atanh" => (Shape::Same(1), Family::Floating),
  "AtanPi" => (Shape::Same(1), Family::Floating),
  "Atan2" => (Shape::Same(2), Family::Floating),
  "Atan2Pi" => (Shape::Same(2), Family::Floating),
  "BitDecrement" => (Shape::Same(1), Family::Floating),
  "BitIncrement" => (Shape::Same(1), Family::Floating),
  "Cbrt" => (Shape::Same(1), Family::Floating),
  "Ceiling" => (Shape::Same(1), Family::Rounding),
  "Clamp" => (Shape::Same(3), Family::All),
  "ClampNative" => (Shape::Same(3), Family::Floating),
  "CopySign" => (Shape::Same(2), Family::Signed),
  "Cos" => (Shape::Same(1), Family::Floating),
  "Cosh" => (Shape::Same(1), Family::Floating),
  "CosPi" => (Shape::Same(1), Family::Floating),
  "DegreesToRadians" => (Shape::Same(1), Family::Floating),
  "Exp" => (Shape::Same(1), Family::Floating),
  "Exp2" => (Shape::Same(1), Family::Floating),
  "Exp10" => (Shape::Same(1), Family::Floating),
  "Floor" => (Shape::Same(1), Family::Rounding),
  "FusedMultiplyAdd" => (Shape::Same(3), Family::Floating),
  "Hypot" => (Shape::Same(2), Family::Floating),
  "ILogB" => (Shape::ToInt32, Family::Floating),
  "IsNaN" => (Shape::Predicate, Family::Floating),
  "IsInfinity" => (Shape::Predicate, Family::Floating),
  "IsPositiveInfinity" => (Shape::Predicate, Family::Floating),
  "IsNegativeInfinity" => (Shape::Predicate, Family::Floating),
  "IsNegative" => (Shape::Predicate, Family::Floating),
  "Lerp" => (Shape::Same(3), Family::Floating),
  "Log" => (Shape::Log, Family::Floating),
  "Log2" => (Shape::Same(1), Family::Floating),
  "Log10" => (Shape::Same(1), Family::Floating),
  "Max" => (Shape::Same(2), Family::All),
  "MaxNative" => (Shape::Same(2), Family::Floating),
  "Min" => (Shape::Same(2), Family::All),
  "MinNative" => (Shape::Same(2), Family::Floating),
  "Pow" => (Shape::Same(2), Family::Floating),
  "RadiansToDegrees" => (Shape::Same(1), Family::Floating),
  "ReciprocalEstimate" => (Shape::Same(1), Family::Floating),
  "RootN" => (Shape::WithInt32, Family::Floating),
  "Round" => (Shape::Round, Family::Rounding),
  "ScaleB" => (Shape::WithInt32, Family::Floating),
  "Sign" => (Shape::ToInt32, Family::Signed),
  "Sin" => (Shape::Same(1), Family::Floating),
  "SinCos" => (Shape::Pair, Family::Floating),
  "Sinh" => (Shape::Same(1), Family::Floating),
  "SinPi" => (Shape::Same(1), Family::Floating),
  "Sqrt" => (Shape::Same(1), Family::Floating),
  "Tan" => (Shape::Same(1), Family::Floating),
  "Tanh" => (Shape::Same(1), Family::Floating),
  "TanPi" => (Shape::Same(1), Family::Floating),
  "Truncate" => (Shape::Same(1), Family::Rounding),
};

const MIDPOINT_ROUNDING: [&str; 5] = ["ToEven", "AwayFromZero", "ToZero", "ToNegativeInfinity", "ToPositiveInfinity"];

impl Family {
  fn allows(self, ty: NumericType) -> bool {
    match self {
      Family::Floating => ty.is_floating(),
      Family::Rounding => ty.is_floating() || ty == NumericType::Decimal,
      Family::Signed => !ty.is_unsigned(),
      Family::All => true,
    }
  }

  /// The overload `Math` picks for an operand of type `operand`.
  fn math_overload(self, operand: NumericType) -> Option<NumericType> {
    let candidates = NumericType::ALL.into_iter()
      .filter(|t| self.allows(*t))
      .filter(|t| *t != NumericType::Single || matches!(self, Family::Signed | Family::All))
      .collect::<Vec<_>>();
    best_overload(operand, &candidates)
  }
}

/// Whether C# converts `from` to `to` implicitly.
pub fn implicit_numeric(from: NumericType, to: NumericType) -> bool {
  use NumericType::*;
  if from == to {
    return true;
  }
  match from {
    SByte => matches!(to, Int16 | Int32 | Int64 | Single | Double | Decimal),
    Byte => matches!(to, Int16 | UInt16 | Int32 | UInt32 | Int64 | UInt64 | Single | Double | Decimal),
    Int16 => matches!(to, Int32 | Int64 | Single | Double | Decimal),
    UInt16 => matches!(to, Int32 | UInt32 | Int64 | UInt64 | Single | Double | Decimal),
    Int32 => matches!(to, Int64 | Single | Double | Decimal),
    UInt32 => matches!(to, Int64 | UInt64 | Single | Double | Decimal),
    Int64 | UInt64 => matches!(to, Single | Double | Decimal),
    Single => to == Double,
    Double | Decimal => false,
  }
}

/// Overload resolution among single-type candidates: the applicable
/// candidate that converts to every other applicable one. An
/// ambiguous choice falls back to `double`.
fn best_overload(operand: NumericType, candidates: &[NumericType]) -> Option<NumericType> {
  let applicable = candidates.iter()
    .copied()
    .filter(|c| implicit_numeric(operand, *c))
    .collect::<Vec<_>>();
  applicable.iter()
    .copied()
    .find(|c| applicable.iter().all(|d| implicit_numeric(*c, *d)))
    .or_else(|| applicable.contains(&NumericType::Double).then_some(NumericType::Double))
}

/// Resolves names against a set of typed locals and the methods
/// declared in the compilation unit.
///
/// Declared methods are shared by every scope derived through
/// [`SymbolResolver::with_locals`].
#[derive(Debug, Clone, Default)]
pub struct ScopeResolver {
  locals: HashMap<String, TypeRef>,
  methods: Rc<RefCell<HashMap<String, Vec<MethodDefinition>>>>,
}

impl ScopeResolver {
  pub fn new() -> ScopeResolver {
    ScopeResolver::default()
  }

  pub fn bind(&mut self, name: impl Into<String>, ty: TypeRef) {
    self.locals.insert(name.into(), ty);
  }

  pub fn with_local(mut self, name: impl Into<String>, ty: TypeRef) -> ScopeResolver {
    self.bind(name, ty);
    self
  }

  fn numeric_type(&self, expr: &Expr) -> Option<NumericType> {
    match self.resolve_type(expr)? {
      TypeRef::Numeric(t) => Some(t),
      TypeRef::Char => Some(NumericType::UInt16),
      _ => None,
    }
  }

  fn math_signature(&self, declaring_type: &TypeRef, call: &Call) -> Option<Signature> {
    let (shape, family) = *MATH_MEMBERS.get(call.name.as_str())?;
    let operand_count = match shape {
      Shape::Same(n) => n,
      Shape::Log => call.args.len(),
      _ => 1,
    };
    if call.args.len() < operand_count || operand_count == 0 {
      return None;
    }
    let operand = call.args[..operand_count].iter()
      .map(|arg| self.numeric_type(arg))
      .try_fold(None, |acc: Option<NumericType>, ty| {
        let ty = ty?;
        Some(Some(match acc {
          None => ty,
          Some(acc) => promote(acc, ty)?,
        }))
      })??;
    let t = match declaring_type {
      TypeRef::Named { name, .. } if name == "Math" => family.math_overload(operand)?,
      TypeRef::Named { name, .. } if name == "MathF" => NumericType::Single,
      TypeRef::Numeric(t) if family.allows(*t) && implicit_numeric(operand, *t) => *t,
      _ => return None,
    };
    let ty = TypeRef::Numeric(t);
    let int32 = TypeRef::Numeric(NumericType::Int32);
    let midpoint = TypeRef::named("MidpointRounding");
    let (params, ret) = match shape {
      Shape::Same(n) if call.args.len() == n => (vec![ty.clone(); n], ty.clone()),
      Shape::Predicate if call.args.len() == 1 => (vec![ty.clone()], TypeRef::Bool),
      Shape::ToInt32 if call.args.len() == 1 => (vec![ty.clone()], int32),
      Shape::WithInt32 if call.args.len() == 2 => (vec![ty.clone(), int32], ty.clone()),
      Shape::Pair if call.args.len() == 1 => (vec![ty.clone()], TypeRef::generic("ValueTuple", vec![ty.clone(), ty.clone()])),
      Shape::Log if call.args.len() <= 2 => (vec![ty.clone(); call.args.len()], ty.clone()),
      Shape::Round => {
        let params = match call.args.len() {
          1 => vec![ty.clone()],
          2 if self.resolve_type(&call.args[1]).as_ref() == Some(&midpoint) => vec![ty.clone(), midpoint],
          2 => vec![ty.clone(), int32],
          3 => vec![ty.clone(), int32, midpoint],
          _ => return None,
        };
        (params, ty.clone())
      }
      _ => return None,
    };
    Some(Signature::method(declaring_type.clone(), call.name.clone(), params, ret))
  }

  fn enumerable_static_signature(&self, call: &Call) -> Option<Signature> {
    let int32 = TypeRef::Numeric(NumericType::Int32);
    let enumerable = TypeRef::named("Enumerable");
    let (params, element) = match (call.name.as_str(), call.args.len()) {
      ("Range", 2) => (vec![int32.clone(), int32.clone()], int32),
      ("Repeat", 2) => {
        let element = match call.type_args.first() {
          Some(t) => t.clone(),
          None => self.resolve_type(&call.args[0])?,
        };
        (vec![element.clone(), int32], element)
      }
      ("Empty", 0) => (Vec::new(), call.type_args.first()?.clone()),
      _ => return None,
    };
    let sig = Signature::method(enumerable, call.name.clone(), params, TypeRef::enumerable(element.clone()));
    Some(sig.with_type_arguments(vec![element]))
  }

  fn bit_converter_signature(&self, call: &Call) -> Option<Signature> {
    use NumericType::*;
    let (from, to) = match call.name.as_str() {
      "DoubleToInt64Bits" => (Double, Int64),
      "DoubleToUInt64Bits" => (Double, UInt64),
      "Int64BitsToDouble" => (Int64, Double),
      "UInt64BitsToDouble" => (UInt64, Double),
      "SingleToInt32Bits" => (Single, Int32),
      "SingleToUInt32Bits" => (Single, UInt32),
      "Int32BitsToSingle" => (Int32, Single),
      "UInt32BitsToSingle" => (UInt32, Single),
      _ => return None,
    };
    if call.args.len() != 1 {
      return None;
    }
    Some(Signature::method(TypeRef::named("BitConverter"), call.name.clone(), vec![from.into()], to.into()))
  }

  fn declared_signature(&self, call: &Call) -> Option<Signature> {
    let methods = self.methods.borrow();
    let overloads = methods.get(&call.name)?;
    let arg_types = call.args.iter().map(|a| self.resolve_type(a)).collect::<Vec<_>>();
    let candidates = overloads.iter().filter(|m| m.params.len() == call.args.len());
    let exact = candidates.clone().find(|m| m.params.iter().zip(&arg_types).all(|(p, a)| a.as_ref() == Some(&p.ty)));
    let method = exact.or_else(|| candidates.clone().find(|m| {
      m.params.iter().zip(&arg_types).all(|(p, a)| match (a, &p.ty) {
        (None, _) => true,
        (Some(TypeRef::Numeric(a)), TypeRef::Numeric(p)) => implicit_numeric(*a, *p),
        (Some(a), p) => a == p,
      })
    }))?;
    let params = method.params.iter().map(|p| p.ty.clone()).collect();
    Some(Signature::method(TypeRef::named(UNIT_TYPE), method.name.clone(), params, method.return_type.clone()))
  }

  /// The type a lambda argument returns, given its parameter types.
  fn lambda_result_type(&self, call: &Call, index: usize) -> Option<TypeRef> {
    let lambda = call.args.get(index)?.as_lambda()?;
    let types = self.lambda_parameter_types(call, index)?;
    let locals = lambda.params.iter().cloned().zip(types).collect();
    self.with_locals(locals).resolve_type(&lambda.body)
  }

  fn func_type(&self, call: &Call, index: usize) -> Option<TypeRef> {
    let mut args = self.lambda_parameter_types(call, index)?;
    args.push(self.lambda_result_type(call, index).unwrap_or(TypeRef::Object));
    Some(TypeRef::generic("Func", args))
  }

  fn sequence_signature(&self, receiver: &TypeRef, call: &Call) -> Option<Signature> {
    let element = receiver.element_type()?.clone();
    let seq = |t: TypeRef| TypeRef::enumerable(t);
    let arity = call.args.len();
    let selector = |index: usize| self.lambda_result_type(call, index);
    let ret = match (call.name.as_str(), arity) {
      ("Where" | "Skip" | "Take" | "SkipLast" | "TakeLast" | "SkipWhile" | "TakeWhile" |
       "Distinct" | "Reverse" | "Append" | "Prepend" | "Concat" | "Except" | "Intersect" |
       "Union" | "DefaultIfEmpty" | "AsEnumerable" | "DistinctBy" | "ExceptBy" |
       "IntersectBy" | "UnionBy" | "Shuffle", _) => seq(element.clone()),
      ("Order" | "OrderDescending" | "OrderBy" | "OrderByDescending" | "ThenBy" | "ThenByDescending", _) => {
        TypeRef::generic("IOrderedEnumerable", vec![element.clone()])
      }
      ("Select", 1) => seq(selector(0)?),
      ("SelectMany", 1) => seq(selector(0)?.element_type()?.clone()),
      ("Cast" | "OfType", 0) => seq(call.type_args.first()?.clone()),
      ("Chunk", 1) => seq(TypeRef::array(element.clone())),
      ("Zip", 1) => {
        let other = self.resolve_type(&call.args[0])?;
        seq(TypeRef::generic("ValueTuple", vec![element.clone(), other.element_type()?.clone()]))
      }
      ("GroupBy", 1) => seq(TypeRef::generic("IGrouping", vec![selector(0)?, element.clone()])),
      ("ToArray", 0) => TypeRef::array(element.clone()),
      ("ToList", 0) => TypeRef::list(element.clone()),
      ("ToHashSet", 0) => TypeRef::generic("HashSet", vec![element.clone()]),
      ("Count", 0 | 1) => NumericType::Int32.into(),
      ("LongCount", 0 | 1) => NumericType::Int64.into(),
      ("Any" | "All" | "Contains" | "SequenceEqual", _) => TypeRef::Bool,
      ("First" | "FirstOrDefault" | "Last" | "LastOrDefault" | "Single" | "SingleOrDefault" |
       "ElementAt" | "ElementAtOrDefault" | "MaxBy" | "MinBy", _) => element.clone(),
      ("Min" | "Max" | "Sum", 0) => element.clone(),
      ("Min" | "Max" | "Sum", 1) => selector(0)?,
      ("Average", 0) => average_type(&element)?,
      ("Average", 1) => average_type(&selector(0)?)?,
      ("Aggregate", 1) => element.clone(),
      ("Aggregate", 2) => self.resolve_type(&call.args[0])?,
      ("Aggregate", 3) => selector(2)?,
      _ => return None,
    };
    let mut params = vec![seq(element.clone())];
    for (i, arg) in call.args.iter().enumerate() {
      let ty = match arg {
        Expr::Lambda(_) => self.func_type(call, i)?,
        other => self.resolve_type(other).unwrap_or_else(|| element.clone()),
      };
      params.push(ty);
    }
    let mut type_arguments = vec![element];
    type_arguments.extend(call.type_args.iter().cloned());
    let sig = Signature::method(TypeRef::named("Enumerable"), call.name.clone(), params, ret);
    Some(sig.extension().with_type_arguments(type_arguments))
  }

  fn static_member_type(&self, ty: &TypeRef, name: &str) -> Option<TypeRef> {
    match ty {
      TypeRef::Named { name: owner, .. } if owner == "Math" && matches!(name, "PI" | "E" | "Tau") => {
        Some(NumericType::Double.into())
      }
      TypeRef::Named { name: owner, .. } if owner == "MathF" && matches!(name, "PI" | "E" | "Tau") => {
        Some(NumericType::Single.into())
      }
      TypeRef::Named { name: owner, .. } if owner == "MidpointRounding" && MIDPOINT_ROUNDING.contains(&name) => {
        Some(ty.clone())
      }
      TypeRef::Numeric(_) => super::math::constant(ty, name).map(|_| ty.clone()),
      _ => None,
    }
  }
}

fn average_type(ty: &TypeRef) -> Option<TypeRef> {
  match ty.as_numeric()? {
    NumericType::Single => Some(NumericType::Single.into()),
    NumericType::Decimal => Some(NumericType::Decimal.into()),
    _ => Some(NumericType::Double.into()),
  }
}

impl SymbolResolver for ScopeResolver {
  fn resolve_call_signature(&self, call: &Call) -> Option<Signature> {
    match &call.target {
      CallTarget::Free => self.declared_signature(call),
      CallTarget::Static(ty) => match ty {
        TypeRef::Named { name, .. } if name == "Enumerable" => self.enumerable_static_signature(call),
        TypeRef::Named { name, .. } if name == "BitConverter" => self.bit_converter_signature(call),
        _ => self.math_signature(ty, call),
      },
      CallTarget::Instance(receiver) => {
        let receiver = self.resolve_type(receiver)?;
        self.sequence_signature(&receiver, call)
      }
    }
  }

  fn resolve_type(&self, expr: &Expr) -> Option<TypeRef> {
    match expr {
      Expr::Literal(lit) => Some(match lit {
        Literal::Number(n) => TypeRef::Numeric(n.ty()),
        Literal::Bool(_) => TypeRef::Bool,
        Literal::Char(_) => TypeRef::Char,
        Literal::String(_) => TypeRef::String,
        Literal::Null => TypeRef::Object,
      }),
      Expr::Ident(name) => self.locals.get(name).cloned(),
      Expr::Paren(inner) => self.resolve_type(inner),
      Expr::Unary(UnaryOp::Not, _) => Some(TypeRef::Bool),
      Expr::Unary(op, inner) => {
        let ty = self.numeric_type(inner)?;
        match (op, ty) {
          (UnaryOp::Neg, NumericType::UInt32) => Some(NumericType::Int64.into()),
          (UnaryOp::Neg, NumericType::UInt64) => None,
          (UnaryOp::BitNot, t) if !t.is_integer() => None,
          (_, t) => Some(promote_unary(t).into()),
        }
      }
      Expr::Binary(op, lhs, rhs) => match op {
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge |
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::And | BinaryOp::Or => Some(TypeRef::Bool),
        BinaryOp::Coalesce => self.resolve_type(lhs).or_else(|| self.resolve_type(rhs)),
        BinaryOp::Shl | BinaryOp::Shr => Some(promote_unary(self.numeric_type(lhs)?).into()),
        _ => {
          let left = self.resolve_type(lhs)?;
          let right = self.resolve_type(rhs)?;
          match (&left, &right) {
            (TypeRef::String, _) | (_, TypeRef::String) if *op == BinaryOp::Add => Some(TypeRef::String),
            (TypeRef::Bool, TypeRef::Bool) => Some(TypeRef::Bool),
            _ => Some(promote(self.numeric_type(lhs)?, self.numeric_type(rhs)?)?.into()),
          }
        }
      },
      Expr::Conditional(_, then, otherwise) => {
        match (self.resolve_type(then), self.resolve_type(otherwise)) {
          (Some(TypeRef::Numeric(a)), Some(TypeRef::Numeric(b))) if a != b => promote(a, b).map(TypeRef::from),
          (a, b) => a.or(b),
        }
      }
      Expr::Call(call) => self.resolve_call_signature(call).map(|sig| sig.return_type),
      Expr::Member(..) | Expr::StaticMember(..) => self.resolve_member(expr).map(|sig| sig.return_type),
      Expr::Index(receiver, index) => {
        let receiver = self.resolve_type(receiver)?;
        if self.resolve_type(index).is_some_and(|t| t.is_named("Range")) {
          return Some(receiver);
        }
        receiver.element_type().cloned()
      }
      Expr::Lambda(_) | Expr::Throw { .. } => None,
      Expr::Cast(ty, _) => Some(ty.clone()),
      Expr::ArrayLit(Some(ty), _) => Some(TypeRef::array(ty.clone())),
      Expr::ArrayLit(None, items) => items.iter().find_map(|item| self.resolve_type(item)).map(TypeRef::array),
      Expr::New(ty, _, _) => Some(ty.clone()),
      Expr::Tuple(items) => {
        let types = items.iter().map(|item| self.resolve_type(item)).collect::<Option<Vec<_>>>()?;
        Some(TypeRef::generic("ValueTuple", types))
      }
      Expr::Range(..) => Some(TypeRef::named("Range")),
      Expr::FromEnd(_) => Some(TypeRef::named("Index")),
    }
  }

  fn resolve_member(&self, expr: &Expr) -> Option<Signature> {
    match expr {
      Expr::Member(receiver, name) => {
        let owner = self.resolve_type(receiver)?;
        let ty = match (&owner, name.as_str()) {
          (TypeRef::Named { name: tuple, args }, item) if tuple == "ValueTuple" => {
            let n = item.strip_prefix("Item")?.parse::<usize>().ok()?;
            args.get(n.checked_sub(1)?)?.clone()
          }
          (owner, member) if owner.length_member() == Some(member) => NumericType::Int32.into(),
          _ => return None,
        };
        Some(Signature::field(owner, name.clone(), ty, false))
      }
      Expr::StaticMember(owner, name) => {
        let ty = self.static_member_type(owner, name)?;
        Some(Signature::field(owner.clone(), name.clone(), ty, true))
      }
      _ => None,
    }
  }

  fn lambda_parameter_types(&self, call: &Call, index: usize) -> Option<Vec<TypeRef>> {
    let lambda = call.args.get(index)?.as_lambda()?;
    let receiver = self.resolve_type(call.receiver()?)?;
    let element = receiver.element_type()?.clone();
    let types = match (call.name.as_str(), call.args.len(), index, lambda.params.len()) {
      ("Aggregate", 1, 0, 2) => vec![element.clone(), element],
      ("Aggregate", 2 | 3, 1, 2) => vec![self.resolve_type(&call.args[0])?, element],
      ("Aggregate", 3, 2, 1) => vec![self.resolve_type(&call.args[0])?],
      ("Where" | "Select" | "SkipWhile" | "TakeWhile" | "SelectMany", 1, 0, 2) => {
        vec![element, NumericType::Int32.into()]
      }
      (_, _, _, 1) => vec![element],
      _ => return None,
    };
    Some(types)
  }

  fn with_locals(&self, locals: Vec<(String, TypeRef)>) -> Box<dyn SymbolResolver + '_> {
    let mut scope = self.clone();
    scope.locals.extend(locals);
    Box::new(scope)
  }

  fn declare_method(&self, method: &MethodDefinition) {
    let mut methods = self.methods.borrow_mut();
    let overloads = methods.entry(method.name.clone()).or_default();
    if !overloads.iter().any(|m| m.signature_matches(method)) {
      overloads.push(method.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parsing::{parse_expr, parse_helper};

  fn double() -> TypeRef {
    NumericType::Double.into()
  }

  fn int() -> TypeRef {
    NumericType::Int32.into()
  }

  fn resolver() -> ScopeResolver {
    ScopeResolver::new()
      .with_local("x", double())
      .with_local("f", NumericType::Single.into())
      .with_local("i", int())
      .with_local("u", NumericType::UInt32.into())
      .with_local("xs", TypeRef::array(int()))
      .with_local("ds", TypeRef::list(double()))
  }

  fn type_of(source: &str) -> Option<TypeRef> {
    resolver().resolve_type(&parse_expr(source).unwrap())
  }

  fn signature_of(source: &str) -> Signature {
    let expr = parse_expr(source).unwrap();
    resolver().resolve_call_signature(expr.as_call().unwrap()).unwrap()
  }

  #[test]
  fn test_operator_types() {
    assert_eq!(type_of("i + x"), Some(double()));
    assert_eq!(type_of("i * 2L"), Some(NumericType::Int64.into()));
    assert_eq!(type_of("-u"), Some(NumericType::Int64.into()));
    assert_eq!(type_of("i > 2 && x < 1.0"), Some(TypeRef::Bool));
    assert_eq!(type_of("(byte)1 + (byte)2"), Some(int()));
    assert_eq!(type_of("i << 2"), Some(int()));
    assert_eq!(type_of("y"), None);
  }

  #[test]
  fn test_math_overloads() {
    let sig = signature_of("Math.Abs(i)");
    assert_eq!(sig.parameter_types, vec![int()]);
    assert_eq!(sig.return_type, int());
    let sig = signature_of("Math.Abs(u)");
    assert_eq!(sig.parameter_types, vec![TypeRef::Numeric(NumericType::Int64)]);
    let sig = signature_of("Math.Max(i, x)");
    assert_eq!(sig.parameter_types, vec![double(), double()]);
    let sig = signature_of("Math.Sqrt(i)");
    assert_eq!(sig.parameter_types, vec![double()]);
    let sig = signature_of("Math.Floor(i)");
    assert_eq!(sig.return_type, double());
    let sig = signature_of("MathF.Sin(f)");
    assert_eq!(sig.return_type, TypeRef::Numeric(NumericType::Single));
    assert_eq!(signature_of("Math.Sign(x)").return_type, int());
    assert_eq!(signature_of("double.IsNaN(x)").return_type, TypeRef::Bool);
  }

  #[test]
  fn test_round_overloads() {
    let sig = signature_of("Math.Round(x, 2)");
    assert_eq!(sig.parameter_types, vec![double(), int()]);
    let sig = signature_of("Math.Round(x, MidpointRounding.AwayFromZero)");
    assert_eq!(sig.parameter_types, vec![double(), TypeRef::named("MidpointRounding")]);
  }

  #[test]
  fn test_numeric_type_members() {
    let sig = signature_of("float.Cbrt(f)");
    assert_eq!(sig.declaring_type, TypeRef::Numeric(NumericType::Single));
    let expr = parse_expr("int.Sqrt(i)").unwrap();
    assert_eq!(resolver().resolve_call_signature(expr.as_call().unwrap()), None);
    assert_eq!(type_of("int.MaxValue"), Some(int()));
    assert_eq!(type_of("Math.PI"), Some(double()));
  }

  #[test]
  fn test_sequence_signatures() {
    let sig = signature_of("xs.Where(v => v > 2)");
    assert!(sig.is_extension);
    assert_eq!(sig.source_element_type(), Some(&int()));
    assert_eq!(sig.parameter_types[1], TypeRef::generic("Func", vec![int(), TypeRef::Bool]));
    assert_eq!(type_of("xs.Select(v => v * 0.5)"), Some(TypeRef::enumerable(double())));
    assert_eq!(type_of("xs.Select(v => v * 0.5).Sum()"), Some(double()));
    assert_eq!(type_of("xs.Average()"), Some(double()));
    assert_eq!(type_of("ds.ToArray()"), Some(TypeRef::array(double())));
    assert_eq!(type_of("xs.Count()"), Some(int()));
    assert_eq!(type_of("xs.Length"), Some(int()));
    assert_eq!(type_of("ds.Count"), Some(int()));
    assert_eq!(type_of("xs.Aggregate(0.0, (a, v) => a + v)"), Some(double()));
    assert_eq!(type_of("Enumerable.Range(0, 3).Select((v, k) => v + k)"), Some(TypeRef::enumerable(int())));
  }

  #[test]
  fn test_lambda_parameter_types() {
    let expr = parse_expr("ds.Aggregate(0, (a, v) => a + v)").unwrap();
    let types = resolver().lambda_parameter_types(expr.as_call().unwrap(), 1);
    assert_eq!(types, Some(vec![int(), double()]));
  }

  #[test]
  fn test_declared_methods_are_shared() {
    let scope = resolver();
    let nested = scope.with_locals(vec![("y".into(), double())]);
    nested.declare_method(&parse_helper("static double Twice(double v) => v * 2.0;").unwrap());
    assert_eq!(scope.resolve_type(&parse_expr("Twice(x)").unwrap()), Some(double()));
    assert_eq!(nested.resolve_type(&parse_expr("Twice(y)").unwrap()), Some(double()));
    assert_eq!(scope.resolve_type(&parse_expr("Twice(true)").unwrap()), None);
  }

  #[test]
  fn test_implicit_numeric() {
    assert!(implicit_numeric(NumericType::Int32, NumericType::Double));
    assert!(!implicit_numeric(NumericType::Double, NumericType::Single));
    assert!(!implicit_numeric(NumericType::Int32, NumericType::UInt32));
  }
}
