
use crate::ast::NumericType;
use crate::host::HostException;

use num::{BigInt, BigRational, Signed, ToPrimitive, Zero, One};

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

/// A number of one of the built-in numeric types.
///
/// Equality is structural: floating values compare by their bit
/// pattern, so `NaN == NaN` and `0.0 != -0.0`. Use
/// [`Number::compare`] for the language's numeric comparison.
#[derive(Debug, Clone)]
pub enum Number {
  SByte(i8),
  Byte(u8),
  Int16(i16),
  UInt16(u16),
  Int32(i32),
  UInt32(u32),
  Int64(i64),
  UInt64(u64),
  Single(f32),
  Double(f64),
  Decimal(BigRational),
}

pub(crate) const DECIMAL_DIGITS: usize = 28;

impl Number {
  pub fn ty(&self) -> NumericType {
    match self {
      Number::SByte(_) => NumericType::SByte,
      Number::Byte(_) => NumericType::Byte,
      Number::Int16(_) => NumericType::Int16,
      Number::UInt16(_) => NumericType::UInt16,
      Number::Int32(_) => NumericType::Int32,
      Number::UInt32(_) => NumericType::UInt32,
      Number::Int64(_) => NumericType::Int64,
      Number::UInt64(_) => NumericType::UInt64,
      Number::Single(_) => NumericType::Single,
      Number::Double(_) => NumericType::Double,
      Number::Decimal(_) => NumericType::Decimal,
    }
  }

  pub fn zero(ty: NumericType) -> Number {
    Number::from_i128_wrapping(0, ty)
  }

  pub fn one(ty: NumericType) -> Number {
    Number::from_i128_wrapping(1, ty)
  }

  /// The exact integer value, for integer types only.
  pub fn to_i128(&self) -> Option<i128> {
    match self {
      Number::SByte(x) => Some(*x as i128),
      Number::Byte(x) => Some(*x as i128),
      Number::Int16(x) => Some(*x as i128),
      Number::UInt16(x) => Some(*x as i128),
      Number::Int32(x) => Some(*x as i128),
      Number::UInt32(x) => Some(*x as i128),
      Number::Int64(x) => Some(*x as i128),
      Number::UInt64(x) => Some(*x as i128),
      Number::Single(_) | Number::Double(_) | Number::Decimal(_) => None,
    }
  }

  pub fn to_f64(&self) -> f64 {
    match self {
      Number::Single(x) => *x as f64,
      Number::Double(x) => *x,
      Number::Decimal(x) => x.to_f64().unwrap_or(f64::NAN),
      other => other.to_i128().map_or(f64::NAN, |x| x as f64),
    }
  }

  pub fn to_rational(&self) -> Option<BigRational> {
    match self {
      Number::Decimal(x) => Some(x.clone()),
      Number::Single(x) => BigRational::from_float(*x),
      Number::Double(x) => BigRational::from_float(*x),
      other => other.to_i128().map(|x| BigRational::from_integer(BigInt::from(x))),
    }
  }

  /// Truncates `value` to the width of `ty`, the way an unchecked
  /// integer conversion does.
  pub fn from_i128_wrapping(value: i128, ty: NumericType) -> Number {
    match ty {
      NumericType::SByte => Number::SByte(value as i8),
      NumericType::Byte => Number::Byte(value as u8),
      NumericType::Int16 => Number::Int16(value as i16),
      NumericType::UInt16 => Number::UInt16(value as u16),
      NumericType::Int32 => Number::Int32(value as i32),
      NumericType::UInt32 => Number::UInt32(value as u32),
      NumericType::Int64 => Number::Int64(value as i64),
      NumericType::UInt64 => Number::UInt64(value as u64),
      NumericType::Single => Number::Single(value as f32),
      NumericType::Double => Number::Double(value as f64),
      NumericType::Decimal => Number::Decimal(BigRational::from_integer(BigInt::from(value))),
    }
  }

  /// Converts a double to `ty`. Integer targets saturate and map NaN
  /// to zero.
  pub fn from_f64(value: f64, ty: NumericType) -> Number {
    match ty {
      NumericType::SByte => Number::SByte(value as i8),
      NumericType::Byte => Number::Byte(value as u8),
      NumericType::Int16 => Number::Int16(value as i16),
      NumericType::UInt16 => Number::UInt16(value as u16),
      NumericType::Int32 => Number::Int32(value as i32),
      NumericType::UInt32 => Number::UInt32(value as u32),
      NumericType::Int64 => Number::Int64(value as i64),
      NumericType::UInt64 => Number::UInt64(value as u64),
      NumericType::Single => Number::Single(value as f32),
      NumericType::Double => Number::Double(value),
      NumericType::Decimal => Number::Decimal(BigRational::from_float(value).unwrap_or_else(BigRational::zero)),
    }
  }

  /// The inclusive range of an integer type.
  pub fn integer_bounds(ty: NumericType) -> Option<(i128, i128)> {
    let bounds = match ty {
      NumericType::SByte => (i8::MIN as i128, i8::MAX as i128),
      NumericType::Byte => (0, u8::MAX as i128),
      NumericType::Int16 => (i16::MIN as i128, i16::MAX as i128),
      NumericType::UInt16 => (0, u16::MAX as i128),
      NumericType::Int32 => (i32::MIN as i128, i32::MAX as i128),
      NumericType::UInt32 => (0, u32::MAX as i128),
      NumericType::Int64 => (i64::MIN as i128, i64::MAX as i128),
      NumericType::UInt64 => (0, u64::MAX as i128),
      _ => return None,
    };
    Some(bounds)
  }

  /// An explicit, unchecked conversion to `target`. Conversions into
  /// or out of `decimal` are checked, as they are at runtime.
  pub fn convert(&self, target: NumericType) -> Result<Number, HostException> {
    if self.ty() == target {
      return Ok(self.clone());
    }
    match (self, target) {
      (Number::Decimal(x), t) if t.is_integer() => {
        let truncated = x.trunc().to_integer();
        let (lo, hi) = Number::integer_bounds(t).unwrap_or((0, 0));
        match truncated.to_i128() {
          Some(v) if v >= lo && v <= hi => Ok(Number::from_i128_wrapping(v, t)),
          _ => Err(HostException::overflow()),
        }
      }
      (Number::Decimal(x), t) => Ok(Number::from_f64(x.to_f64().unwrap_or(f64::NAN), t)),
      (Number::Single(x), NumericType::Decimal) => float_to_decimal(*x as f64),
      (Number::Double(x), NumericType::Decimal) => float_to_decimal(*x),
      (Number::Single(x), t) => Ok(Number::from_f64(*x as f64, t)),
      (Number::Double(x), t) => Ok(Number::from_f64(*x, t)),
      (integer, t) => {
        // unwrap safety: every remaining variant is an integer
        let value = integer.to_i128().unwrap_or_default();
        Ok(Number::from_i128_wrapping(value, t))
      }
    }
  }

  pub fn is_nan(&self) -> bool {
    match self {
      Number::Single(x) => x.is_nan(),
      Number::Double(x) => x.is_nan(),
      _ => false,
    }
  }

  pub fn is_zero(&self) -> bool {
    match self {
      Number::Single(x) => *x == 0.0,
      Number::Double(x) => *x == 0.0,
      Number::Decimal(x) => x.is_zero(),
      other => other.to_i128() == Some(0),
    }
  }

  /// True for a zero with the sign bit clear (or any integer zero).
  pub fn is_positive_zero(&self) -> bool {
    match self {
      Number::Single(x) => x.to_bits() == 0,
      Number::Double(x) => x.to_bits() == 0,
      other => other.is_zero(),
    }
  }

  pub fn is_one(&self) -> bool {
    match self {
      Number::Single(x) => *x == 1.0,
      Number::Double(x) => *x == 1.0,
      Number::Decimal(x) => x.is_one(),
      other => other.to_i128() == Some(1),
    }
  }

  /// Negative values, including negative zero.
  pub fn is_sign_negative(&self) -> bool {
    match self {
      Number::Single(x) => x.is_sign_negative(),
      Number::Double(x) => x.is_sign_negative(),
      Number::Decimal(x) => x.is_negative(),
      other => other.to_i128().is_some_and(|x| x < 0),
    }
  }

  /// The language's comparison, which is partial because of NaN.
  /// Operands must already share a type.
  pub fn compare(&self, other: &Number) -> Option<Ordering> {
    match (self, other) {
      (Number::Single(a), Number::Single(b)) => a.partial_cmp(b),
      (Number::Double(a), Number::Double(b)) => a.partial_cmp(b),
      (Number::Decimal(a), Number::Decimal(b)) => Some(a.cmp(b)),
      (a, b) => match (a.to_i128(), b.to_i128()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => self.to_f64().partial_cmp(&other.to_f64()),
      },
    }
  }

  /// The integer value, if this number is a whole number that fits.
  /// Floating values qualify when they are integral.
  pub fn as_integral(&self) -> Option<i128> {
    match self {
      Number::Single(x) => integral_f64(*x as f64),
      Number::Double(x) => integral_f64(*x),
      Number::Decimal(x) => x.is_integer().then(|| x.to_integer().to_i128()).flatten(),
      other => other.to_i128(),
    }
  }
}

fn integral_f64(x: f64) -> Option<i128> {
  (x.is_finite() && x.trunc() == x && x.abs() < 1e30).then_some(x as i128)
}

fn float_to_decimal(x: f64) -> Result<Number, HostException> {
  if !x.is_finite() || x.abs() >= 7.922816251426434e28 {
    return Err(HostException::new("System.OverflowException", "Value was either too large or too small for a Decimal."));
  }
  BigRational::from_float(x).map(Number::Decimal).ok_or_else(HostException::overflow)
}

impl PartialEq for Number {
  fn eq(&self, other: &Number) -> bool {
    match (self, other) {
      (Number::Single(a), Number::Single(b)) => a.to_bits() == b.to_bits(),
      (Number::Double(a), Number::Double(b)) => a.to_bits() == b.to_bits(),
      (Number::Decimal(a), Number::Decimal(b)) => a == b,
      (a, b) => a.ty() == b.ty() && a.to_i128() == b.to_i128(),
    }
  }
}

impl Eq for Number {}

/// Literal spelling, without the cast that small integer types need.
impl Display for Number {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Number::Single(x) => write!(f, "{x:?}F"),
      Number::Double(x) => write!(f, "{x:?}"),
      Number::Decimal(x) => write!(f, "{}M", decimal_to_string(x)),
      other => {
        let value = other.to_i128().unwrap_or_default();
        write!(f, "{value}{}", other.ty().literal_suffix())
      }
    }
  }
}

fn decimal_to_string(x: &BigRational) -> String {
  let negative = x.is_negative();
  let x = x.abs();
  let whole = x.trunc().to_integer();
  let mut frac = x.fract();
  let ten = BigRational::from_integer(BigInt::from(10));
  let mut digits = String::new();
  while !frac.is_zero() && digits.len() < DECIMAL_DIGITS {
    frac = frac * &ten;
    let digit = frac.trunc().to_integer();
    digits.push_str(&digit.to_string());
    frac = frac.fract();
  }
  let sign = if negative { "-" } else { "" };
  if digits.is_empty() {
    format!("{sign}{whole}")
  } else {
    format!("{sign}{whole}.{digits}")
  }
}
