
//! Operator semantics over [`Value`]s: numeric promotion, unchecked
//! integer arithmetic, IEEE floating arithmetic, and checked decimal
//! arithmetic.

use super::{Number, Value};
use super::number::DECIMAL_DIGITS;
use crate::ast::{BinaryOp, NumericType, TypeRef, UnaryOp};
use crate::host::HostException;

use num::{BigInt, BigRational, Signed, Zero, ToPrimitive};
use once_cell::sync::Lazy;

use std::cmp::Ordering;

/// Two operands converted to their common type.
#[derive(Debug, Clone, PartialEq)]
enum NumberPair {
  Integers(i128, i128, NumericType),
  Singles(f32, f32),
  Doubles(f64, f64),
  Decimals(BigRational, BigRational),
}

static DECIMAL_MAX: Lazy<BigRational> = Lazy::new(|| {
  BigRational::from_integer(BigInt::from(u128::MAX >> 32))
});

pub fn divide_by_zero() -> HostException {
  HostException::new("System.DivideByZeroException", "Attempted to divide by zero.")
}

/// The type both operands of a binary numeric operator convert to,
/// or `None` when the language rejects the combination.
pub fn promote(left: NumericType, right: NumericType) -> Option<NumericType> {
  use NumericType::*;
  let signed_small = |t: NumericType| matches!(t, SByte | Int16 | Int32 | Int64);
  let result = match (left, right) {
    (Decimal, other) | (other, Decimal) => {
      if other.is_floating() { return None; }
      Decimal
    }
    (Double, _) | (_, Double) => Double,
    (Single, _) | (_, Single) => Single,
    (UInt64, other) | (other, UInt64) => {
      if signed_small(other) { return None; }
      UInt64
    }
    (Int64, _) | (_, Int64) => Int64,
    (UInt32, other) | (other, UInt32) => {
      if signed_small(other) { Int64 } else { UInt32 }
    }
    _ => Int32,
  };
  Some(result)
}

/// The type a unary operator computes in: small integers widen to
/// `int`.
pub fn promote_unary(ty: NumericType) -> NumericType {
  match ty {
    NumericType::SByte | NumericType::Byte | NumericType::Int16 | NumericType::UInt16 => NumericType::Int32,
    other => other,
  }
}

impl NumberPair {
  fn promote(left: &Number, right: &Number) -> Result<Option<NumberPair>, HostException> {
    let Some(ty) = promote(left.ty(), right.ty()) else {
      return Ok(None);
    };
    let left = left.convert(ty)?;
    let right = right.convert(ty)?;
    let pair = match (left, right) {
      (Number::Single(a), Number::Single(b)) => NumberPair::Singles(a, b),
      (Number::Double(a), Number::Double(b)) => NumberPair::Doubles(a, b),
      (Number::Decimal(a), Number::Decimal(b)) => NumberPair::Decimals(a, b),
      (a, b) => match (a.to_i128(), b.to_i128()) {
        (Some(a), Some(b)) => NumberPair::Integers(a, b, ty),
        _ => return Ok(None),
      },
    };
    Ok(Some(pair))
  }
}

/// Rounds to the precision of the 128-bit decimal type and checks its
/// range.
pub fn decimal_result(x: BigRational) -> Result<Number, HostException> {
  let scale = BigRational::from_integer(num::pow(BigInt::from(10), DECIMAL_DIGITS));
  let scaled = &x * &scale;
  let floor = scaled.floor();
  let diff = &scaled - &floor;
  let half = BigRational::new(BigInt::from(1), BigInt::from(2));
  let rounded = match diff.cmp(&half) {
    Ordering::Less => floor,
    Ordering::Greater => floor + BigRational::from_integer(BigInt::from(1)),
    Ordering::Equal => {
      if floor.to_integer() % BigInt::from(2) == BigInt::zero() { floor } else { floor + BigRational::from_integer(BigInt::from(1)) }
    }
  };
  let result = rounded / scale;
  if result.abs() > *DECIMAL_MAX {
    return Err(HostException::new("System.OverflowException", "Value was either too large or too small for a Decimal."));
  }
  Ok(Number::Decimal(result))
}

fn integer_arith(op: BinaryOp, a: i128, b: i128, ty: NumericType) -> Result<Option<Number>, HostException> {
  let signed_min = Number::integer_bounds(ty).map(|(lo, _)| lo).filter(|lo| *lo < 0);
  let value = match op {
    BinaryOp::Add => a + b,
    BinaryOp::Sub => a - b,
    BinaryOp::Mul => a.wrapping_mul(b),
    BinaryOp::Div | BinaryOp::Rem => {
      if b == 0 {
        return Err(divide_by_zero());
      }
      if b == -1 && Some(a) == signed_min {
        return Err(HostException::overflow());
      }
      if op == BinaryOp::Div { a / b } else { a % b }
    }
    BinaryOp::BitAnd => a & b,
    BinaryOp::BitOr => a | b,
    BinaryOp::BitXor => a ^ b,
    _ => return Ok(None),
  };
  Ok(Some(Number::from_i128_wrapping(value, ty)))
}

fn compare_op(op: BinaryOp, ordering: Option<Ordering>) -> Option<bool> {
  let result = match op {
    BinaryOp::Lt => ordering == Some(Ordering::Less),
    BinaryOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
    BinaryOp::Gt => ordering == Some(Ordering::Greater),
    BinaryOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    BinaryOp::Eq => ordering == Some(Ordering::Equal),
    BinaryOp::Ne => ordering != Some(Ordering::Equal),
    _ => return None,
  };
  Some(result)
}

fn shift(op: BinaryOp, value: &Number, count: &Number) -> Result<Option<Number>, HostException> {
  let ty = promote_unary(value.ty());
  let (Some(v), Some(c)) = (value.convert(ty)?.to_i128(), count.convert(NumericType::Int32)?.to_i128()) else {
    return Ok(None);
  };
  let mask = if matches!(ty, NumericType::Int64 | NumericType::UInt64) { 63 } else { 31 };
  let c = (c & mask) as u32;
  let result = match op {
    BinaryOp::Shl => ((v as u128) << c) as i128,
    _ => v >> c,
  };
  Ok(Some(Number::from_i128_wrapping(result, ty)))
}

/// A binary operator applied to two numbers. `Ok(None)` means the
/// operator does not apply to these operand types.
pub fn numeric_binary(op: BinaryOp, left: &Number, right: &Number) -> Result<Option<Value>, HostException> {
  if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
    if !left.ty().is_integer() || !right.ty().is_integer() {
      return Ok(None);
    }
    return Ok(shift(op, left, right)?.map(Value::Number));
  }
  let Some(pair) = NumberPair::promote(left, right)? else {
    return Ok(None);
  };
  if let Some(result) = compare_op(op, compare_pair(&pair)) {
    return Ok(Some(Value::Bool(result)));
  }
  let number = match pair {
    NumberPair::Integers(a, b, ty) => return Ok(integer_arith(op, a, b, ty)?.map(Value::Number)),
    NumberPair::Singles(a, b) => match op {
      BinaryOp::Add => Number::Single(a + b),
      BinaryOp::Sub => Number::Single(a - b),
      BinaryOp::Mul => Number::Single(a * b),
      BinaryOp::Div => Number::Single(a / b),
      BinaryOp::Rem => Number::Single(a % b),
      _ => return Ok(None),
    },
    NumberPair::Doubles(a, b) => match op {
      BinaryOp::Add => Number::Double(a + b),
      BinaryOp::Sub => Number::Double(a - b),
      BinaryOp::Mul => Number::Double(a * b),
      BinaryOp::Div => Number::Double(a / b),
      BinaryOp::Rem => Number::Double(a % b),
      _ => return Ok(None),
    },
    NumberPair::Decimals(a, b) => match op {
      BinaryOp::Add => decimal_result(a + b)?,
      BinaryOp::Sub => decimal_result(a - b)?,
      BinaryOp::Mul => decimal_result(a * b)?,
      BinaryOp::Div | BinaryOp::Rem if b.is_zero() => return Err(divide_by_zero()),
      BinaryOp::Div => decimal_result(a / b)?,
      BinaryOp::Rem => {
        let quotient = (&a / &b).trunc();
        decimal_result(a - b * quotient)?
      }
      _ => return Ok(None),
    },
  };
  Ok(Some(Value::Number(number)))
}

fn compare_pair(pair: &NumberPair) -> Option<Ordering> {
  match pair {
    NumberPair::Integers(a, b, _) => Some(a.cmp(b)),
    NumberPair::Singles(a, b) => a.partial_cmp(b),
    NumberPair::Doubles(a, b) => a.partial_cmp(b),
    NumberPair::Decimals(a, b) => Some(a.cmp(b)),
  }
}

fn char_number(c: char) -> Number {
  Number::UInt16(c as u32 as u16)
}

/// A binary operator over evaluated operands. `&&`, `||` and `??`
/// are included for completeness, but callers that want
/// short-circuiting must handle them before evaluating the right
/// operand.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Option<Value>, HostException> {
  match (left, right) {
    (Value::Null, _) if op == BinaryOp::Coalesce => Ok(Some(right.clone())),
    (_, _) if op == BinaryOp::Coalesce => Ok(Some(left.clone())),
    (Value::Number(a), Value::Number(b)) => numeric_binary(op, a, b),
    (Value::Char(a), Value::Char(b)) => match compare_op(op, Some(a.cmp(b))) {
      Some(result) => Ok(Some(Value::Bool(result))),
      None => numeric_binary(op, &char_number(*a), &char_number(*b)),
    },
    (Value::Char(a), Value::Number(b)) => numeric_binary(op, &char_number(*a), b),
    (Value::Number(a), Value::Char(b)) => numeric_binary(op, a, &char_number(*b)),
    (Value::Bool(a), Value::Bool(b)) => {
      let result = match op {
        BinaryOp::And | BinaryOp::BitAnd => *a && *b,
        BinaryOp::Or | BinaryOp::BitOr => *a || *b,
        BinaryOp::BitXor | BinaryOp::Ne => a != b,
        BinaryOp::Eq => a == b,
        _ => return Ok(None),
      };
      Ok(Some(Value::Bool(result)))
    }
    (Value::String(a), Value::String(b)) => match op {
      BinaryOp::Add => Ok(Some(Value::String(format!("{a}{b}")))),
      BinaryOp::Eq => Ok(Some(Value::Bool(a == b))),
      BinaryOp::Ne => Ok(Some(Value::Bool(a != b))),
      _ => Ok(None),
    },
    (Value::String(a), Value::Char(b)) if op == BinaryOp::Add => Ok(Some(Value::String(format!("{a}{b}")))),
    (Value::Char(a), Value::String(b)) if op == BinaryOp::Add => Ok(Some(Value::String(format!("{a}{b}")))),
    (Value::Null, Value::Null) => match op {
      BinaryOp::Eq => Ok(Some(Value::Bool(true))),
      BinaryOp::Ne => Ok(Some(Value::Bool(false))),
      _ => Ok(None),
    },
    (Value::Enum { .. }, Value::Enum { .. }) => match op {
      BinaryOp::Eq => Ok(Some(Value::Bool(left == right))),
      BinaryOp::Ne => Ok(Some(Value::Bool(left != right))),
      _ => Ok(None),
    },
    _ => Ok(None),
  }
}

/// Negation of a number, in the type the operator computes in.
/// `ulong` has no negation and yields `Ok(None)`.
pub fn negate(n: &Number) -> Result<Option<Number>, HostException> {
  let result = match n {
    Number::Single(x) => Number::Single(-x),
    Number::Double(x) => Number::Double(-x),
    Number::Decimal(x) => Number::Decimal(-x),
    Number::UInt64(_) => return Ok(None),
    Number::UInt32(x) => Number::Int64(-(*x as i64)),
    other => {
      let ty = promote_unary(other.ty());
      let value = other.to_i128().unwrap_or_default();
      Number::from_i128_wrapping(-value, ty)
    }
  };
  Ok(Some(result))
}

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Option<Value>, HostException> {
  let number = match operand {
    Value::Number(n) => n.clone(),
    Value::Char(c) => char_number(*c).convert(NumericType::Int32)?,
    Value::Bool(b) if op == UnaryOp::Not => return Ok(Some(Value::Bool(!b))),
    _ => return Ok(None),
  };
  let result = match op {
    UnaryOp::Neg => negate(&number)?,
    UnaryOp::Plus => Some(number.convert(promote_unary(number.ty()))?),
    UnaryOp::BitNot => {
      let ty = promote_unary(number.ty());
      number.convert(ty)?.to_i128().map(|v| Number::from_i128_wrapping(!v, ty))
    }
    UnaryOp::Not => None,
  };
  Ok(result.map(Value::Number))
}

/// An explicit conversion `(T)value`.
pub fn cast(value: &Value, target: &TypeRef) -> Result<Option<Value>, HostException> {
  match (value, target) {
    (Value::Number(n), TypeRef::Numeric(t)) => Ok(Some(Value::Number(n.convert(*t)?))),
    (Value::Char(c), TypeRef::Numeric(t)) => Ok(Some(Value::Number(char_number(*c).convert(*t)?))),
    (Value::Number(n), TypeRef::Char) => {
      let code = n.convert(NumericType::UInt16)?.to_i128().unwrap_or_default();
      Ok(char::from_u32(code as u32).map(Value::Char))
    }
    (value, target) if value.ty() == *target => Ok(Some(value.clone())),
    (value, TypeRef::Object) => Ok(Some(value.clone())),
    _ => Ok(None),
  }
}

/// Converts a numeric value to `target` where the language allows an
/// implicit conversion, as when passing an `int` to a `double`
/// parameter.
pub fn implicit_convert(value: &Value, target: &TypeRef) -> Result<Value, HostException> {
  match (value, target) {
    (Value::Number(n), TypeRef::Numeric(t)) if n.ty() != *t => Ok(Value::Number(n.convert(*t)?)),
    (Value::Char(c), TypeRef::Numeric(t)) => Ok(Value::Number(char_number(*c).convert(*t)?)),
    _ => Ok(value.clone()),
  }
}

/// The ordering used by sorting operators and `Min`/`Max`: NaN sorts
/// below every other value.
pub fn total_compare(left: &Value, right: &Value) -> Ordering {
  match (left, right) {
    (Value::Number(a), Value::Number(b)) => {
      match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => {
          let ty = promote(a.ty(), b.ty()).unwrap_or(NumericType::Double);
          match (a.convert(ty), b.convert(ty)) {
            (Ok(a), Ok(b)) => a.compare(&b).unwrap_or(Ordering::Equal),
            _ => a.to_f64().partial_cmp(&b.to_f64()).unwrap_or(Ordering::Equal),
          }
        }
      }
    }
    (Value::Char(a), Value::Char(b)) => a.cmp(b),
    (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
    (Value::String(a), Value::String(b)) => a.cmp(b),
    (Value::Null, Value::Null) => Ordering::Equal,
    (Value::Null, _) => Ordering::Less,
    (_, Value::Null) => Ordering::Greater,
    _ => Ordering::Equal,
  }
}

pub fn rational_to_f64(x: &BigRational) -> f64 {
  x.to_f64().unwrap_or(f64::NAN)
}
