
//! Execution of the math library: `Math`, `MathF`, the static members
//! of the numeric types, and `BitConverter`.
//!
//! Floating functions run in the precision of their declaring type.
//! Edge cases follow the runtime library: `Max` and `Min` propagate
//! NaN and order `-0` below `+0`, `Round` rounds half to even, `Sign`
//! rejects NaN, and `Clamp` rejects inverted bounds.

use super::{HostException, Signature};
use crate::ast::{NumericType, TypeRef};
use crate::value::{Number, Value};
use crate::value::ops::{decimal_result, implicit_convert};

use num::{BigInt, BigRational, Float, One, Signed, Zero};

use std::cmp::Ordering;
use std::fmt::{Debug, Display};

/// The operations the runtime defines on `float` and `double` beyond
/// what [`num::Float`] offers.
pub trait HostFloat: Float + Debug + Display {
  const TYPE: NumericType;
  const PI: Self;
  const E: Self;
  const TAU: Self;
  /// The smallest positive subnormal, which the runtime calls
  /// `Epsilon`.
  const EPSILON: Self;
  /// Largest `digits` accepted by `Round(x, digits)`.
  const MAX_ROUND_DIGITS: i32;
  /// Magnitude above which `Round(x, digits)` returns `x` unchanged.
  const ROUND_LIMIT: Self;

  fn to_number(self) -> Number;
  fn from_number(n: &Number) -> Option<Self>;
  fn bit_increment(self) -> Self;
  fn bit_decrement(self) -> Self;
  fn ilogb(self) -> i32;
  fn scale_b(self, n: i32) -> Self;

  fn lit(x: f64) -> Self {
    <Self as num::NumCast>::from(x).unwrap_or_else(Self::nan)
  }
}

macro_rules! host_float_impl {
  ($t:ty, $bits:ty, $signed_bits:ty, $numeric:ident, $mantissa:expr, $bias:expr, $epsilon:expr, $max_digits:expr, $limit:expr) => {
    impl HostFloat for $t {
      const TYPE: NumericType = NumericType::$numeric;
      const PI: $t = std::f64::consts::PI as $t;
      const E: $t = std::f64::consts::E as $t;
      const TAU: $t = std::f64::consts::TAU as $t;
      const EPSILON: $t = $epsilon;
      const MAX_ROUND_DIGITS: i32 = $max_digits;
      const ROUND_LIMIT: $t = $limit;

      fn to_number(self) -> Number {
        Number::$numeric(self)
      }

      fn from_number(n: &Number) -> Option<Self> {
        match n {
          Number::$numeric(x) => Some(*x),
          _ => None,
        }
      }

      fn bit_increment(self) -> Self {
        let bits = self.to_bits() as $signed_bits;
        if !self.is_finite() {
          return if self == <$t>::NEG_INFINITY { <$t>::MIN } else { self };
        }
        if bits == <$signed_bits>::MIN {
          return Self::EPSILON;
        }
        let bits = if bits < 0 { bits - 1 } else { bits + 1 };
        <$t>::from_bits(bits as $bits)
      }

      fn bit_decrement(self) -> Self {
        let bits = self.to_bits() as $signed_bits;
        if !self.is_finite() {
          return if self == <$t>::INFINITY { <$t>::MAX } else { self };
        }
        if bits == 0 {
          return -Self::EPSILON;
        }
        let bits = if bits < 0 { bits + 1 } else { bits - 1 };
        <$t>::from_bits(bits as $bits)
      }

      fn ilogb(self) -> i32 {
        if !self.is_finite() {
          return i32::MAX;
        }
        if self == 0.0 {
          return i32::MIN;
        }
        let bits = self.to_bits();
        let exponent = ((bits >> $mantissa) & ((1 << (<$bits>::BITS - 1 - $mantissa)) - 1)) as i32;
        if exponent == 0 {
          let mantissa = bits & ((1 << $mantissa) - 1);
          let top = (<$bits>::BITS - 1 - mantissa.leading_zeros()) as i32;
          top - ($bias - 1) - $mantissa
        } else {
          exponent - $bias
        }
      }

      fn scale_b(self, n: i32) -> Self {
        let max_exp: i32 = $bias;
        let min_exp: i32 = 1 - $bias;
        let big = <$t>::from_bits(((2 * $bias) as $bits) << $mantissa);
        let small = <$t>::from_bits(1 << $mantissa) * <$t>::from_bits((($bias + $mantissa + 1) as $bits) << $mantissa);
        let (mut x, mut n) = (self, n);
        if n > max_exp {
          x *= big;
          n -= max_exp;
          if n > max_exp {
            x *= big;
            n -= max_exp;
            n = n.min(max_exp);
          }
        } else if n < min_exp {
          x *= small;
          n -= min_exp + $mantissa + 1;
          if n < min_exp {
            x *= small;
            n -= min_exp + $mantissa + 1;
            n = n.max(min_exp);
          }
        }
        x * <$t>::from_bits((($bias + n) as $bits) << $mantissa)
      }
    }
  };
}

host_float_impl!(f64, u64, i64, Double, 52, 1023, 5e-324, 15, 1e16);
host_float_impl!(f32, u32, i32, Single, 23, 127, 1e-45, 6, 1e8);

/// Round half to even.
pub fn round_even<F: Float>(x: F) -> F {
  let half = F::one() / (F::one() + F::one());
  if (x - x.trunc()).abs() == half {
    let two = F::one() + F::one();
    two * (x / two).round()
  } else {
    x.round()
  }
}

pub fn max<F: Float>(a: F, b: F) -> F {
  if a != b {
    if a.is_nan() { a } else if b < a { a } else { b }
  } else if b.is_sign_negative() {
    a
  } else {
    b
  }
}

pub fn min<F: Float>(a: F, b: F) -> F {
  if a.is_nan() || b.is_nan() {
    return F::nan();
  }
  if a != b {
    if a < b { a } else { b }
  } else if a.is_sign_negative() {
    a
  } else {
    b
  }
}

fn min_max_error<T: Display>(lo: T, hi: T) -> HostException {
  HostException::argument(format!("'{lo}' cannot be greater than {hi}."))
}

fn nan_sign_error() -> HostException {
  HostException::new("System.ArithmeticException", "Function does not accept floating point Not-a-Number values.")
}

fn abs_overflow() -> HostException {
  HostException::new("System.OverflowException", "Negating the minimum value of a twos complement number is invalid.")
}

fn sin_pi<F: HostFloat>(x: F) -> F {
  if !x.is_finite() {
    return F::nan();
  }
  let r = x.abs() % F::lit(2.0);
  let v = if r == F::zero() || r == F::one() {
    F::zero()
  } else if r == F::lit(0.5) {
    F::one()
  } else if r == F::lit(1.5) {
    -F::one()
  } else {
    (r * F::PI).sin()
  };
  if x.is_sign_negative() { -v } else { v }
}

fn cos_pi<F: HostFloat>(x: F) -> F {
  if !x.is_finite() {
    return F::nan();
  }
  let r = x.abs() % F::lit(2.0);
  if r == F::zero() {
    F::one()
  } else if r == F::one() {
    -F::one()
  } else if r == F::lit(0.5) || r == F::lit(1.5) {
    F::zero()
  } else {
    (r * F::PI).cos()
  }
}

fn tan_pi<F: HostFloat>(x: F) -> F {
  if !x.is_finite() {
    return F::nan();
  }
  let r = x.abs() % F::one();
  let v = if r == F::zero() {
    F::zero()
  } else if r == F::lit(0.5) {
    F::infinity()
  } else {
    (r * F::PI).tan()
  };
  if x.is_sign_negative() { -v } else { v }
}

fn root_n<F: HostFloat>(x: F, n: i32) -> F {
  match n {
    0 => F::nan(),
    1 => x,
    2 => x.sqrt(),
    3 => x.cbrt(),
    -1 => F::one() / x,
    n => {
      if x.is_nan() {
        return x;
      }
      if x < F::zero() && n % 2 == 0 {
        return F::nan();
      }
      let root = x.abs().powf(F::one() / F::lit(n as f64));
      if x.is_sign_negative() { -root } else { root }
    }
  }
}

fn log_base<F: Float>(a: F, new_base: F) -> F {
  if a.is_nan() {
    return a;
  }
  if new_base.is_nan() {
    return new_base;
  }
  if new_base == F::one() {
    return F::nan();
  }
  if a != F::one() && (new_base == F::zero() || new_base == F::infinity()) {
    return F::nan();
  }
  a.ln() / new_base.ln()
}

/// A `MidpointRounding` argument.
fn rounding_mode(value: &Value) -> Option<&str> {
  match value {
    Value::Enum { ty, member } if ty == "MidpointRounding" => Some(member.as_str()),
    _ => None,
  }
}

fn round_with<F: HostFloat>(x: F, digits: i32, mode: &str) -> Result<F, HostException> {
  if !(0..=F::MAX_ROUND_DIGITS).contains(&digits) {
    return Err(HostException::argument_out_of_range("digits"));
  }
  let round: fn(F) -> F = match mode {
    "ToEven" => round_even,
    "AwayFromZero" => F::round,
    "ToZero" => F::trunc,
    "ToNegativeInfinity" => F::floor,
    "ToPositiveInfinity" => F::ceil,
    _ => return Err(HostException::argument(format!("The value '{mode}' is not valid for this usage of the type MidpointRounding."))),
  };
  if x.abs() >= F::ROUND_LIMIT {
    return Ok(x);
  }
  let power = F::lit(10f64.powi(digits));
  Ok(round(x * power) / power)
}

fn float_arg<F: HostFloat>(args: &[Value], i: usize) -> Option<F> {
  args.get(i)?.as_number().and_then(F::from_number)
}

fn int_arg(args: &[Value], i: usize) -> Option<i32> {
  args.get(i)?.as_i64().and_then(|x| i32::try_from(x).ok())
}

fn float_call<F: HostFloat>(name: &str, args: &[Value]) -> Result<Option<Value>, HostException> {
  let Some(x) = float_arg::<F>(args, 0) else {
    return Ok(None);
  };
  let y = float_arg::<F>(args, 1);
  let z = float_arg::<F>(args, 2);
  let number = |v: F| Ok(Some(Value::Number(v.to_number())));
  match (name, args.len(), y, z) {
    ("Abs", 1, _, _) => number(x.abs()),
    ("Acos", 1, _, _) => number(x.acos()),
    ("Acosh", 1, _, _) => number(x.acosh()),
    ("AcosPi", 1, _, _) => number(x.acos() / F::PI),
    ("Asin", 1, _, _) => number(x.asin()),
    ("Asinh", 1, _, _) => number(x.asinh()),
    ("AsinPi", 1, _, _) => number(x.asin() / F::PI),
    ("Atan", 1, _, _) => number(x.atan()),
    ("Atanh", 1, _, _) => number(x.atanh()),
    ("AtanPi", 1, _, _) => number(x.atan() / F::PI),
    ("Atan2", 2, Some(y), _) => number(x.atan2(y)),
    ("Atan2Pi", 2, Some(y), _) => number(x.atan2(y) / F::PI),
    ("BitDecrement", 1, _, _) => number(x.bit_decrement()),
    ("BitIncrement", 1, _, _) => number(x.bit_increment()),
    ("Cbrt", 1, _, _) => number(x.cbrt()),
    ("Ceiling", 1, _, _) => number(x.ceil()),
    ("Clamp", 3, Some(lo), Some(hi)) => {
      if lo > hi {
        return Err(min_max_error(lo, hi));
      }
      number(if x < lo { lo } else if x > hi { hi } else { x })
    }
    ("ClampNative", 3, Some(lo), Some(hi)) => {
      let v = if x > lo { x } else { lo };
      number(if v < hi { v } else { hi })
    }
    ("CopySign", 2, Some(y), _) => number(x.copysign(y)),
    ("Cos", 1, _, _) => number(x.cos()),
    ("Cosh", 1, _, _) => number(x.cosh()),
    ("CosPi", 1, _, _) => number(cos_pi(x)),
    ("DegreesToRadians", 1, _, _) => number(x * F::PI / F::lit(180.0)),
    ("Exp", 1, _, _) => number(x.exp()),
    ("Exp2", 1, _, _) => number(F::lit(2.0).powf(x)),
    ("Exp10", 1, _, _) => number(F::lit(10.0).powf(x)),
    ("Floor", 1, _, _) => number(x.floor()),
    ("FusedMultiplyAdd", 3, Some(y), Some(z)) => number(x.mul_add(y, z)),
    ("Hypot", 2, Some(y), _) => number(x.hypot(y)),
    ("ILogB", 1, _, _) => Ok(Some(Value::Number(Number::Int32(x.ilogb())))),
    ("IsNaN", 1, _, _) => Ok(Some(Value::Bool(x.is_nan()))),
    ("IsInfinity", 1, _, _) => Ok(Some(Value::Bool(x.is_infinite()))),
    ("IsPositiveInfinity", 1, _, _) => Ok(Some(Value::Bool(x == F::infinity()))),
    ("IsNegativeInfinity", 1, _, _) => Ok(Some(Value::Bool(x == F::neg_infinity()))),
    ("IsNegative", 1, _, _) => Ok(Some(Value::Bool(x.is_sign_negative()))),
    ("Lerp", 3, Some(b), Some(t)) => number(x * (F::one() - t) + b * t),
    ("Log", 1, _, _) => number(x.ln()),
    ("Log", 2, Some(y), _) => number(log_base(x, y)),
    ("Log2", 1, _, _) => number(x.log2()),
    ("Log10", 1, _, _) => number(x.log10()),
    ("Max", 2, Some(y), _) => number(max(x, y)),
    ("MaxNative", 2, Some(y), _) => number(if x > y { x } else { y }),
    ("Min", 2, Some(y), _) => number(min(x, y)),
    ("MinNative", 2, Some(y), _) => number(if x < y { x } else { y }),
    ("Pow", 2, Some(y), _) => number(x.powf(y)),
    ("RadiansToDegrees", 1, _, _) => number(x * F::lit(180.0) / F::PI),
    ("ReciprocalEstimate", 1, _, _) => number(F::one() / x),
    ("RootN", 2, _, _) => match int_arg(args, 1) {
      Some(n) => number(root_n(x, n)),
      None => Ok(None),
    },
    ("Round", 1, _, _) => number(round_even(x)),
    ("Round", 2, _, _) => {
      if let Some(mode) = args.get(1).and_then(rounding_mode) {
        return number(round_with(x, 0, mode)?);
      }
      match int_arg(args, 1) {
        Some(digits) => number(round_with(x, digits, "ToEven")?),
        None => Ok(None),
      }
    }
    ("Round", 3, _, _) => match (int_arg(args, 1), args.get(2).and_then(rounding_mode)) {
      (Some(digits), Some(mode)) => number(round_with(x, digits, mode)?),
      _ => Ok(None),
    },
    ("ScaleB", 2, _, _) => match int_arg(args, 1) {
      Some(n) => number(x.scale_b(n)),
      None => Ok(None),
    },
    ("Sign", 1, _, _) => {
      if x.is_nan() {
        return Err(nan_sign_error());
      }
      let sign = if x > F::zero() { 1 } else if x < F::zero() { -1 } else { 0 };
      Ok(Some(Value::Number(Number::Int32(sign))))
    }
    ("Sin", 1, _, _) => number(x.sin()),
    ("SinCos", 1, _, _) => {
      let (s, c) = x.sin_cos();
      Ok(Some(Value::Tuple(vec![Value::Number(s.to_number()), Value::Number(c.to_number())])))
    }
    ("Sinh", 1, _, _) => number(x.sinh()),
    ("SinPi", 1, _, _) => number(sin_pi(x)),
    ("Sqrt", 1, _, _) => number(x.sqrt()),
    ("Tan", 1, _, _) => number(x.tan()),
    ("Tanh", 1, _, _) => number(x.tanh()),
    ("TanPi", 1, _, _) => number(tan_pi(x)),
    ("Truncate", 1, _, _) => number(x.trunc()),
    _ => Ok(None),
  }
}

fn decimal_arg(args: &[Value], i: usize) -> Option<BigRational> {
  match args.get(i)?.as_number()? {
    Number::Decimal(x) => Some(x.clone()),
    _ => None,
  }
}

fn decimal_round_even(x: &BigRational) -> BigRational {
  let floor = x.floor();
  let diff = x - &floor;
  let half = BigRational::new(BigInt::one(), BigInt::from(2));
  match diff.cmp(&half) {
    Ordering::Less => floor,
    Ordering::Greater => floor + BigRational::one(),
    Ordering::Equal if (floor.to_integer() % BigInt::from(2)).is_zero() => floor,
    Ordering::Equal => floor + BigRational::one(),
  }
}

fn decimal_call(name: &str, args: &[Value]) -> Result<Option<Value>, HostException> {
  let Some(x) = decimal_arg(args, 0) else {
    return Ok(None);
  };
  let y = decimal_arg(args, 1);
  let z = decimal_arg(args, 2);
  let number = |v: BigRational| Ok(Some(Value::Number(decimal_result(v)?)));
  match (name, args.len(), y, z) {
    ("Abs", 1, _, _) => number(x.abs()),
    ("Ceiling", 1, _, _) => number(x.ceil()),
    ("Floor", 1, _, _) => number(x.floor()),
    ("Truncate", 1, _, _) => number(x.trunc()),
    ("Round", 1, _, _) => number(decimal_round_even(&x)),
    ("Round", 2, _, _) => {
      let Some(digits) = int_arg(args, 1) else {
        return Ok(None);
      };
      if !(0..=28).contains(&digits) {
        return Err(HostException::argument_out_of_range("decimals"));
      }
      let power = BigRational::from_integer(num::pow(BigInt::from(10), digits as usize));
      number(decimal_round_even(&(x * &power)) / power)
    }
    ("Max", 2, Some(y), _) => number(if y > x { y } else { x }),
    ("Min", 2, Some(y), _) => number(if y < x { y } else { x }),
    ("Clamp", 3, Some(lo), Some(hi)) => {
      if lo > hi {
        return Err(min_max_error(Number::Decimal(lo), Number::Decimal(hi)));
      }
      number(if x < lo { lo } else if x > hi { hi } else { x })
    }
    ("Sign", 1, _, _) => {
      let sign = if x.is_positive() { 1 } else if x.is_negative() { -1 } else { 0 };
      Ok(Some(Value::Number(Number::Int32(sign))))
    }
    _ => Ok(None),
  }
}

fn integer_call(name: &str, ty: NumericType, args: &[Value]) -> Result<Option<Value>, HostException> {
  let ints = args.iter()
    .map(|a| a.as_number().filter(|n| n.ty() == ty).and_then(Number::to_i128))
    .collect::<Option<Vec<_>>>();
  let Some(ints) = ints else {
    return Ok(None);
  };
  let (lo, _) = Number::integer_bounds(ty).unwrap_or((0, 0));
  let number = |v: i128| Ok(Some(Value::Number(Number::from_i128_wrapping(v, ty))));
  match (name, ints.as_slice()) {
    ("Abs", [x]) => {
      if *x == lo && lo < 0 {
        return Err(abs_overflow());
      }
      number(x.abs())
    }
    ("Max", [x, y]) => number(*x.max(y)),
    ("Min", [x, y]) => number(*x.min(y)),
    ("Clamp", [x, min, max]) => {
      if min > max {
        return Err(min_max_error(min, max));
      }
      number(*x.clamp(min, max))
    }
    ("Sign", [x]) => Ok(Some(Value::Number(Number::Int32(x.signum() as i32)))),
    ("CopySign", [x, sign]) => {
      let magnitude = x.abs();
      if *sign < 0 {
        number(-magnitude)
      } else if magnitude > -(lo + 1) && lo < 0 {
        Err(HostException::overflow())
      } else {
        number(magnitude)
      }
    }
    _ => Ok(None),
  }
}

/// Runs a member of `Math`, `MathF`, or a numeric type. Arguments are
/// first converted to the parameter types of `signature`.
pub fn invoke(signature: &Signature, args: &[Value]) -> Result<Option<Value>, HostException> {
  if args.len() != signature.parameter_types.len() {
    return Ok(None);
  }
  let args = args.iter()
    .zip(&signature.parameter_types)
    .map(|(arg, ty)| implicit_convert(arg, ty))
    .collect::<Result<Vec<_>, _>>()?;
  let Some(ty) = signature.parameter_types.first().and_then(TypeRef::as_numeric) else {
    return Ok(None);
  };
  let name = signature.name.as_str();
  match ty {
    NumericType::Double => float_call::<f64>(name, &args),
    NumericType::Single => float_call::<f32>(name, &args),
    NumericType::Decimal => decimal_call(name, &args),
    integer => integer_call(name, integer, &args),
  }
}

/// `BitConverter` reinterpretations between floating values and their
/// bit patterns.
pub fn bit_converter(name: &str, args: &[Value]) -> Option<Value> {
  let n = args.first()?.as_number()?;
  let result = match (name, n) {
    ("DoubleToInt64Bits", Number::Double(x)) => Number::Int64(x.to_bits() as i64),
    ("DoubleToUInt64Bits", Number::Double(x)) => Number::UInt64(x.to_bits()),
    ("Int64BitsToDouble", Number::Int64(x)) => Number::Double(f64::from_bits(*x as u64)),
    ("UInt64BitsToDouble", Number::UInt64(x)) => Number::Double(f64::from_bits(*x)),
    ("SingleToInt32Bits", Number::Single(x)) => Number::Int32(x.to_bits() as i32),
    ("SingleToUInt32Bits", Number::Single(x)) => Number::UInt32(x.to_bits()),
    ("Int32BitsToSingle", Number::Int32(x)) => Number::Single(f32::from_bits(*x as u32)),
    ("UInt32BitsToSingle", Number::UInt32(x)) => Number::Single(f32::from_bits(*x)),
    _ => return None,
  };
  Some(Value::Number(result))
}

fn float_constant<F: HostFloat>(name: &str) -> Option<Number> {
  let value = match name {
    "PI" | "Pi" => F::PI,
    "E" => F::E,
    "Tau" => F::TAU,
    "NaN" => F::nan(),
    "PositiveInfinity" => F::infinity(),
    "NegativeInfinity" => F::neg_infinity(),
    "NegativeZero" => F::neg_zero(),
    "Epsilon" => F::EPSILON,
    "MaxValue" => F::max_value(),
    "MinValue" => F::min_value(),
    _ => return None,
  };
  Some(value.to_number())
}

/// Constants of `Math`, `MathF`, and the numeric types.
pub fn constant(declaring_type: &TypeRef, name: &str) -> Option<Value> {
  let number = match declaring_type {
    TypeRef::Named { name: ty, .. } if ty == "Math" => float_constant::<f64>(name)?,
    TypeRef::Named { name: ty, .. } if ty == "MathF" => float_constant::<f32>(name)?,
    TypeRef::Numeric(NumericType::Double) => float_constant::<f64>(name)?,
    TypeRef::Numeric(NumericType::Single) => float_constant::<f32>(name)?,
    TypeRef::Numeric(NumericType::Decimal) => {
      let max = BigRational::from_integer(BigInt::from(u128::MAX >> 32));
      match name {
        "MaxValue" => Number::Decimal(max),
        "MinValue" => Number::Decimal(-max),
        "One" => Number::Decimal(BigRational::one()),
        "Zero" => Number::Decimal(BigRational::zero()),
        "MinusOne" => Number::Decimal(-BigRational::one()),
        _ => return None,
      }
    }
    TypeRef::Numeric(ty) => {
      let (lo, hi) = Number::integer_bounds(*ty)?;
      match name {
        "MaxValue" => Number::from_i128_wrapping(hi, *ty),
        "MinValue" => Number::from_i128_wrapping(lo, *ty),
        _ => return None,
      }
    }
    _ => return None,
  };
  Some(Value::Number(number))
}
