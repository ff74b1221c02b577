
//! Approximating helpers for [`EvaluationMode::FastApprox`].
//!
//! Each helper is a template over the floating type `T`: `{T}` names
//! the type, `{F}` is its literal suffix, and the remaining
//! placeholders are per-type constants. The interiors are series
//! expansions after range reduction; NaN, the infinities, zero, and
//! the domain boundaries are special-cased so they return what the
//! exact function returns.
//!
//! [`EvaluationMode::FastApprox`]: crate::optimizer::EvaluationMode::FastApprox

use super::{MathFunction, MathSite};
use crate::ast::{Call, Expr, NumericType};
use crate::driver::Diagnostic;
use crate::optimizer::Session;
use crate::parsing::parse_helper;

use log::warn;
use phf::phf_map;

#[derive(Debug, Clone, Copy)]
struct HelperTemplate {
  /// Helpers this one calls, which must be registered first.
  requires: &'static [&'static str],
  double: &'static str,
  /// The `float` source, when it differs from `double` by more than
  /// the placeholders.
  single: Option<&'static str>,
}

const DOUBLE_CONSTANTS: &[(&str, &str)] = &[
  ("MAX_LOG", "709.782712893384"),
  ("MIN_LOG", "-745.1332191019411"),
  ("MAX_EXP2", "1024"),
  ("MIN_EXP2", "-1080"),
  ("MAX_EXP10", "308.25471555991675"),
  ("MIN_EXP10", "-323.60724"),
  ("ASINH_LARGE", "1e150"),
  ("HYPERBOLIC_LIMIT", "22"),
];

const SINGLE_CONSTANTS: &[(&str, &str)] = &[
  ("MAX_LOG", "88.72283"),
  ("MIN_LOG", "-103.972084"),
  ("MAX_EXP2", "128"),
  ("MIN_EXP2", "-150"),
  ("MAX_EXP10", "38.53184"),
  ("MIN_EXP10", "-45.15"),
  ("ASINH_LARGE", "1e18"),
  ("HYPERBOLIC_LIMIT", "9"),
];

static TEMPLATES: phf::Map<&'static str, HelperTemplate> = phf_map! {
  "FastSin" => HelperTemplate { requires: &[], double: FAST_SIN, single: None },
  "FastCos" => HelperTemplate { requires: &[], double: FAST_COS, single: None },
  "FastTan" => HelperTemplate { requires: &[], double: FAST_TAN, single: None },
  "FastAtan" => HelperTemplate { requires: &[], double: FAST_ATAN, single: None },
  "FastAsin" => HelperTemplate { requires: &["FastAtan"], double: FAST_ASIN, single: None },
  "FastAcos" => HelperTemplate { requires: &["FastAtan"], double: FAST_ACOS, single: None },
  "FastAtanPi" => HelperTemplate { requires: &["FastAtan"], double: FAST_ATAN_PI, single: None },
  "FastAsinPi" => HelperTemplate { requires: &["FastAsin"], double: FAST_ASIN_PI, single: None },
  "FastAcosPi" => HelperTemplate { requires: &["FastAcos"], double: FAST_ACOS_PI, single: None },
  "FastAtan2" => HelperTemplate { requires: &["FastAtan"], double: FAST_ATAN2, single: None },
  "FastAtan2Pi" => HelperTemplate { requires: &["FastAtan2"], double: FAST_ATAN2_PI, single: None },
  "FastExp" => HelperTemplate { requires: &[], double: FAST_EXP, single: None },
  "FastExp2" => HelperTemplate { requires: &[], double: FAST_EXP2, single: None },
  "FastExp10" => HelperTemplate { requires: &[], double: FAST_EXP10, single: None },
  "FastLog" => HelperTemplate { requires: &[], double: FAST_LOG, single: None },
  "FastLog2" => HelperTemplate { requires: &[], double: FAST_LOG2, single: None },
  "FastLog10" => HelperTemplate { requires: &["FastLog"], double: FAST_LOG10, single: None },
  "FastSinh" => HelperTemplate { requires: &["FastExp"], double: FAST_SINH, single: None },
  "FastCosh" => HelperTemplate { requires: &["FastExp"], double: FAST_COSH, single: None },
  "FastTanh" => HelperTemplate { requires: &["FastSinh"], double: FAST_TANH, single: None },
  "FastAsinh" => HelperTemplate { requires: &["FastLog"], double: FAST_ASINH, single: None },
  "FastAcosh" => HelperTemplate { requires: &["FastLog"], double: FAST_ACOSH, single: None },
  "FastAtanh" => HelperTemplate { requires: &["FastLog"], double: FAST_ATANH, single: None },
  "FastCbrt" => HelperTemplate { requires: &[], double: FAST_CBRT_DOUBLE, single: Some(FAST_CBRT_SINGLE) },
  "FastSign" => HelperTemplate { requires: &[], double: FAST_SIGN, single: None },
};

/// Replaces the call with a call to its helper, registering the helper
/// (and the helpers it builds on) on first use.
pub(super) fn rewrite(site: &MathSite) -> Option<Expr> {
  if !site.is_floating() {
    return None;
  }
  let name = helper_name(site.function, site.args().len())?;
  if !instantiate(site.ctx.session(), name, site.ty) {
    return None;
  }
  let args = (0..site.args().len()).map(|i| site.operand(i)).collect();
  Some(Expr::Call(Call::free(name, args)))
}

pub fn helper_name(function: MathFunction, arity: usize) -> Option<&'static str> {
  use MathFunction::*;
  let name = match function {
    Sin => "FastSin",
    Cos => "FastCos",
    Tan => "FastTan",
    Asin => "FastAsin",
    Acos => "FastAcos",
    Atan => "FastAtan",
    AsinPi => "FastAsinPi",
    AcosPi => "FastAcosPi",
    AtanPi => "FastAtanPi",
    Atan2 => "FastAtan2",
    Atan2Pi => "FastAtan2Pi",
    Sinh => "FastSinh",
    Cosh => "FastCosh",
    Tanh => "FastTanh",
    Asinh => "FastAsinh",
    Acosh => "FastAcosh",
    Atanh => "FastAtanh",
    Exp => "FastExp",
    Exp2 => "FastExp2",
    Exp10 => "FastExp10",
    Log if arity == 1 => "FastLog",
    Log2 => "FastLog2",
    Log10 => "FastLog10",
    Cbrt => "FastCbrt",
    Sign => "FastSign",
    _ => return None,
  };
  Some(name)
}

/// The source of helper `name` for the floating type `ty`.
pub fn render(name: &str, ty: NumericType) -> Option<String> {
  let template = TEMPLATES.get(name)?;
  let (source, constants) = match ty {
    NumericType::Double => (template.double, DOUBLE_CONSTANTS),
    NumericType::Single => (template.single.unwrap_or(template.double), SINGLE_CONSTANTS),
    _ => return None,
  };
  let mut text = source.replace("{T}", ty.keyword()).replace("{F}", ty.literal_suffix());
  for (placeholder, value) in constants {
    text = text.replace(&format!("{{{placeholder}}}"), value);
  }
  Some(text)
}

/// Registers helper `name` for `ty` and everything it requires.
/// Returns false, after reporting why, if any of them could not be
/// registered.
pub fn instantiate(session: &Session, name: &str, ty: NumericType) -> bool {
  let Some(template) = TEMPLATES.get(name) else {
    return false;
  };
  if !template.requires.iter().all(|dependency| instantiate(session, dependency, ty)) {
    return false;
  }
  let Some(source) = render(name, ty) else {
    return false;
  };
  match parse_helper(&source) {
    Ok(definition) => session.register_helper(definition),
    Err(err) => {
      warn!("Helper template {name} for {ty} did not parse: {err}");
      session.report(Diagnostic::HelperTemplate { name: name.to_owned(), message: err.to_string() });
      false
    }
  }
}

// Quadrant reduction: x = k * pi/2 + r with |r| <= pi/4, then Taylor
// series for sin(r) and cos(r).

const FAST_SIN: &str = r#"
static {T} FastSin({T} x)
{
    if ({T}.IsNaN(x) || {T}.IsInfinity(x)) return {T}.NaN;
    if (x == 0{F}) return x;
    {T} k = {T}.Round(x * 0.6366197723675814{F});
    {T} r = x - k * 1.5707963267948966{F};
    {T} r2 = r * r;
    {T} s = r * (1{F} + r2 * (-0.16666666666666666{F} + r2 * (0.008333333333333333{F} + r2 * (-0.0001984126984126984{F} + r2 * 2.7557319223985893e-06{F}))));
    {T} c = 1{F} + r2 * (-0.5{F} + r2 * (0.041666666666666664{F} + r2 * (-0.001388888888888889{F} + r2 * 2.48015873015873e-05{F})));
    long q = (long)k & 3;
    if (q == 0) return s;
    if (q == 1) return c;
    if (q == 2) return -s;
    return -c;
}
"#;

const FAST_COS: &str = r#"
static {T} FastCos({T} x)
{
    if ({T}.IsNaN(x) || {T}.IsInfinity(x)) return {T}.NaN;
    if (x == 0{F}) return 1{F};
    {T} k = {T}.Round(x * 0.6366197723675814{F});
    {T} r = x - k * 1.5707963267948966{F};
    {T} r2 = r * r;
    {T} s = r * (1{F} + r2 * (-0.16666666666666666{F} + r2 * (0.008333333333333333{F} + r2 * (-0.0001984126984126984{F} + r2 * 2.7557319223985893e-06{F}))));
    {T} c = 1{F} + r2 * (-0.5{F} + r2 * (0.041666666666666664{F} + r2 * (-0.001388888888888889{F} + r2 * 2.48015873015873e-05{F})));
    long q = (long)k & 3;
    if (q == 0) return c;
    if (q == 1) return -s;
    if (q == 2) return -c;
    return s;
}
"#;

const FAST_TAN: &str = r#"
static {T} FastTan({T} x)
{
    if ({T}.IsNaN(x) || {T}.IsInfinity(x)) return {T}.NaN;
    if (x == 0{F}) return x;
    {T} k = {T}.Round(x * 0.6366197723675814{F});
    {T} r = x - k * 1.5707963267948966{F};
    {T} r2 = r * r;
    {T} s = r * (1{F} + r2 * (-0.16666666666666666{F} + r2 * (0.008333333333333333{F} + r2 * (-0.0001984126984126984{F} + r2 * 2.7557319223985893e-06{F}))));
    {T} c = 1{F} + r2 * (-0.5{F} + r2 * (0.041666666666666664{F} + r2 * (-0.001388888888888889{F} + r2 * 2.48015873015873e-05{F})));
    long q = (long)k & 1;
    if (q == 0) return s / c;
    return -c / s;
}
"#;

// |x| > 1 is folded through atan(x) = pi/2 - atan(1/x), then
// arguments above tan(pi/8) shift by pi/4, which leaves |t| <= 0.4143
// for the odd series.

const FAST_ATAN: &str = r#"
static {T} FastAtan({T} x)
{
    if ({T}.IsNaN(x) || x == 0{F}) return x;
    if ({T}.IsPositiveInfinity(x)) return 1.5707963267948966{F};
    if ({T}.IsNegativeInfinity(x)) return -1.5707963267948966{F};
    {T} a = x < 0{F} ? -x : x;
    {T} t = a > 1{F} ? 1{F} / a : a;
    {T} offset = 0{F};
    if (t > 0.41421356237309503{F})
    {
        offset = 0.7853981633974483{F};
        t = (t - 1{F}) / (t + 1{F});
    }
    {T} t2 = t * t;
    {T} p = t * (1{F} + t2 * (-0.3333333333333333{F} + t2 * (0.2{F} + t2 * (-0.14285714285714285{F} + t2 * (0.1111111111111111{F} + t2 * (-0.09090909090909091{F} + t2 * (0.07692307692307693{F} + t2 * (-0.06666666666666667{F} + t2 * 0.058823529411764705{F}))))))));
    {T} r = offset + p;
    if (a > 1{F}) r = 1.5707963267948966{F} - r;
    return x < 0{F} ? -r : r;
}
"#;

const FAST_ASIN: &str = r#"
static {T} FastAsin({T} x)
{
    if ({T}.IsNaN(x) || x > 1{F} || x < -1{F}) return {T}.NaN;
    if (x == 1{F}) return 1.5707963267948966{F};
    if (x == -1{F}) return -1.5707963267948966{F};
    if (x == 0{F}) return x;
    return FastAtan(x / {T}.Sqrt((1{F} - x) * (1{F} + x)));
}
"#;

const FAST_ACOS: &str = r#"
static {T} FastAcos({T} x)
{
    if ({T}.IsNaN(x) || x > 1{F} || x < -1{F}) return {T}.NaN;
    if (x == 1{F}) return 0{F};
    if (x == -1{F}) return 3.141592653589793{F};
    return 2{F} * FastAtan({T}.Sqrt((1{F} - x) / (1{F} + x)));
}
"#;

const FAST_ATAN_PI: &str = r#"
static {T} FastAtanPi({T} x)
{
    if ({T}.IsNaN(x) || x == 0{F}) return x;
    if ({T}.IsPositiveInfinity(x)) return 0.5{F};
    if ({T}.IsNegativeInfinity(x)) return -0.5{F};
    if (x == 1{F}) return 0.25{F};
    if (x == -1{F}) return -0.25{F};
    return FastAtan(x) * 0.3183098861837907{F};
}
"#;

const FAST_ASIN_PI: &str = r#"
static {T} FastAsinPi({T} x)
{
    if ({T}.IsNaN(x) || x > 1{F} || x < -1{F}) return {T}.NaN;
    if (x == 1{F}) return 0.5{F};
    if (x == -1{F}) return -0.5{F};
    if (x == 0{F}) return x;
    return FastAsin(x) * 0.3183098861837907{F};
}
"#;

const FAST_ACOS_PI: &str = r#"
static {T} FastAcosPi({T} x)
{
    if ({T}.IsNaN(x) || x > 1{F} || x < -1{F}) return {T}.NaN;
    if (x == 1{F}) return 0{F};
    if (x == -1{F}) return 1{F};
    if (x == 0{F}) return 0.5{F};
    return FastAcos(x) * 0.3183098861837907{F};
}
"#;

const FAST_ATAN2: &str = r#"
static {T} FastAtan2({T} y, {T} x)
{
    if ({T}.IsNaN(y) || {T}.IsNaN(x)) return {T}.NaN;
    if (y == 0{F} || x == 0{F} || {T}.IsInfinity(y) || {T}.IsInfinity(x)) return {T}.Atan2(y, x);
    {T} r = FastAtan(y / x);
    if (x > 0{F}) return r;
    return y > 0{F} ? r + 3.141592653589793{F} : r - 3.141592653589793{F};
}
"#;

const FAST_ATAN2_PI: &str = r#"
static {T} FastAtan2Pi({T} y, {T} x)
{
    if ({T}.IsNaN(y) || {T}.IsNaN(x)) return {T}.NaN;
    if (y == 0{F} || x == 0{F} || {T}.IsInfinity(y) || {T}.IsInfinity(x)) return {T}.Atan2Pi(y, x);
    return FastAtan2(y, x) * 0.3183098861837907{F};
}
"#;

// exp(x) = 2^k * exp(r) with |r| <= ln(2) / 2.

const FAST_EXP: &str = r#"
static {T} FastExp({T} x)
{
    if ({T}.IsNaN(x)) return x;
    if (x > {MAX_LOG}{F}) return {T}.PositiveInfinity;
    if (x < {MIN_LOG}{F}) return 0{F};
    if (x == 0{F}) return 1{F};
    {T} k = {T}.Round(x * 1.4426950408889634{F});
    {T} r = x - k * 0.6931471805599453{F};
    {T} p = 1{F} + r * (1{F} + r * (0.5{F} + r * (0.16666666666666666{F} + r * (0.041666666666666664{F} + r * (0.008333333333333333{F} + r * (0.001388888888888889{F} + r * (0.0001984126984126984{F} + r * (2.48015873015873e-05{F} + r * (2.7557319223985893e-06{F} + r * 2.755731922398589e-07{F})))))))));
    return {T}.ScaleB(p, (int)k);
}
"#;

const FAST_EXP2: &str = r#"
static {T} FastExp2({T} x)
{
    if ({T}.IsNaN(x)) return x;
    if (x >= {MAX_EXP2}{F}) return {T}.PositiveInfinity;
    if (x < {MIN_EXP2}{F}) return 0{F};
    {T} k = {T}.Round(x);
    {T} r = (x - k) * 0.6931471805599453{F};
    {T} p = 1{F} + r * (1{F} + r * (0.5{F} + r * (0.16666666666666666{F} + r * (0.041666666666666664{F} + r * (0.008333333333333333{F} + r * (0.001388888888888889{F} + r * (0.0001984126984126984{F} + r * (2.48015873015873e-05{F} + r * (2.7557319223985893e-06{F} + r * 2.755731922398589e-07{F})))))))));
    return {T}.ScaleB(p, (int)k);
}
"#;

const FAST_EXP10: &str = r#"
static {T} FastExp10({T} x)
{
    if ({T}.IsNaN(x)) return x;
    if (x > {MAX_EXP10}{F}) return {T}.PositiveInfinity;
    if (x < {MIN_EXP10}{F}) return 0{F};
    if (x == 0{F}) return 1{F};
    {T} k = {T}.Round(x * 3.321928094887362{F});
    {T} r = (x - k * 0.30102999566398120{F}) * 2.302585092994046{F};
    {T} p = 1{F} + r * (1{F} + r * (0.5{F} + r * (0.16666666666666666{F} + r * (0.041666666666666664{F} + r * (0.008333333333333333{F} + r * (0.001388888888888889{F} + r * (0.0001984126984126984{F} + r * (2.48015873015873e-05{F} + r * (2.7557319223985893e-06{F} + r * 2.755731922398589e-07{F})))))))));
    return {T}.ScaleB(p, (int)k);
}
"#;

// log(x) = e * ln(2) + log(m) with m in [sqrt(2)/2, sqrt(2)], and
// log(m) = 2 * atanh((m - 1) / (m + 1)).

const FAST_LOG: &str = r#"
static {T} FastLog({T} x)
{
    if ({T}.IsNaN(x) || x < 0{F}) return {T}.NaN;
    if (x == 0{F}) return {T}.NegativeInfinity;
    if ({T}.IsPositiveInfinity(x)) return x;
    int e = {T}.ILogB(x);
    {T} m = {T}.ScaleB(x, -e);
    if (m > 1.4142135623730951{F})
    {
        m = m * 0.5{F};
        e = e + 1;
    }
    {T} s = (m - 1{F}) / (m + 1{F});
    {T} s2 = s * s;
    {T} p = 2{F} * s * (1{F} + s2 * (0.3333333333333333{F} + s2 * (0.2{F} + s2 * (0.14285714285714285{F} + s2 * (0.1111111111111111{F} + s2 * (0.09090909090909091{F} + s2 * 0.07692307692307693{F}))))));
    return p + e * 0.6931471805599453{F};
}
"#;

const FAST_LOG2: &str = r#"
static {T} FastLog2({T} x)
{
    if ({T}.IsNaN(x) || x < 0{F}) return {T}.NaN;
    if (x == 0{F}) return {T}.NegativeInfinity;
    if ({T}.IsPositiveInfinity(x)) return x;
    int e = {T}.ILogB(x);
    {T} m = {T}.ScaleB(x, -e);
    if (m > 1.4142135623730951{F})
    {
        m = m * 0.5{F};
        e = e + 1;
    }
    {T} s = (m - 1{F}) / (m + 1{F});
    {T} s2 = s * s;
    {T} p = 2{F} * s * (1{F} + s2 * (0.3333333333333333{F} + s2 * (0.2{F} + s2 * (0.14285714285714285{F} + s2 * (0.1111111111111111{F} + s2 * (0.09090909090909091{F} + s2 * 0.07692307692307693{F}))))));
    return e + p * 1.4426950408889634{F};
}
"#;

const FAST_LOG10: &str = r#"
static {T} FastLog10({T} x) => FastLog(x) * 0.4342944819032518{F};
"#;

const FAST_SINH: &str = r#"
static {T} FastSinh({T} x)
{
    if ({T}.IsNaN(x) || {T}.IsInfinity(x) || x == 0{F}) return x;
    {T} a = x < 0{F} ? -x : x;
    if (a < 0.5{F})
    {
        {T} x2 = x * x;
        return x * (1{F} + x2 * (0.16666666666666666{F} + x2 * (0.008333333333333333{F} + x2 * (0.0001984126984126984{F} + x2 * (2.7557319223985893e-06{F} + x2 * 2.505210838544172e-08{F})))));
    }
    if (a > {HYPERBOLIC_LIMIT}{F})
    {
        {T} h = FastExp(a - 0.6931471805599453{F});
        return x < 0{F} ? -h : h;
    }
    {T} e = FastExp(a);
    {T} s = 0.5{F} * (e - 1{F} / e);
    return x < 0{F} ? -s : s;
}
"#;

const FAST_COSH: &str = r#"
static {T} FastCosh({T} x)
{
    if ({T}.IsNaN(x)) return x;
    if ({T}.IsInfinity(x)) return {T}.PositiveInfinity;
    {T} a = x < 0{F} ? -x : x;
    if (a > {HYPERBOLIC_LIMIT}{F}) return FastExp(a - 0.6931471805599453{F});
    {T} e = FastExp(a);
    return 0.5{F} * (e + 1{F} / e);
}
"#;

const FAST_TANH: &str = r#"
static {T} FastTanh({T} x)
{
    if ({T}.IsNaN(x) || x == 0{F}) return x;
    if (x > {HYPERBOLIC_LIMIT}{F}) return 1{F};
    if (x < -{HYPERBOLIC_LIMIT}{F}) return -1{F};
    {T} s = FastSinh(x);
    return s / {T}.Sqrt(1{F} + s * s);
}
"#;

const FAST_ASINH: &str = r#"
static {T} FastAsinh({T} x)
{
    if ({T}.IsNaN(x) || {T}.IsInfinity(x) || x == 0{F}) return x;
    {T} a = x < 0{F} ? -x : x;
    if (a < 0.125{F})
    {
        {T} x2 = x * x;
        return x * (1{F} + x2 * (-0.16666666666666666{F} + x2 * (0.075{F} + x2 * (-0.044642857142857144{F} + x2 * 0.030381944444444444{F}))));
    }
    {T} r = a > {ASINH_LARGE}{F} ? FastLog(a) + 0.6931471805599453{F} : FastLog(a + {T}.Sqrt(a * a + 1{F}));
    return x < 0{F} ? -r : r;
}
"#;

const FAST_ACOSH: &str = r#"
static {T} FastAcosh({T} x)
{
    if ({T}.IsNaN(x) || x < 1{F}) return {T}.NaN;
    if (x == 1{F}) return 0{F};
    if ({T}.IsPositiveInfinity(x)) return x;
    if (x > {ASINH_LARGE}{F}) return FastLog(x) + 0.6931471805599453{F};
    return FastLog(x + {T}.Sqrt((x - 1{F}) * (x + 1{F})));
}
"#;

const FAST_ATANH: &str = r#"
static {T} FastAtanh({T} x)
{
    if ({T}.IsNaN(x) || x > 1{F} || x < -1{F}) return {T}.NaN;
    if (x == 1{F}) return {T}.PositiveInfinity;
    if (x == -1{F}) return {T}.NegativeInfinity;
    if (x == 0{F}) return x;
    {T} a = x < 0{F} ? -x : x;
    {T} a2 = a * a;
    {T} r = a < 0.125{F} ? a * (1{F} + a2 * (0.3333333333333333{F} + a2 * (0.2{F} + a2 * (0.14285714285714285{F} + a2 * (0.1111111111111111{F} + a2 * 0.09090909090909091{F}))))) : 0.5{F} * FastLog((1{F} + a) / (1{F} - a));
    return x < 0{F} ? -r : r;
}
"#;

// An exponent-thirding bit trick for the first guess, then Newton
// steps. Subnormal inputs are scaled into the normal range first.

const FAST_CBRT_DOUBLE: &str = r#"
static double FastCbrt(double x)
{
    if (double.IsNaN(x) || double.IsInfinity(x) || x == 0) return x;
    double a = x < 0 ? -x : x;
    double scale = 1;
    if (a < 2.2250738585072014E-308)
    {
        a = a * 18014398509481984.0;
        scale = 3.814697265625E-06;
    }
    long bits = BitConverter.DoubleToInt64Bits(a);
    double y = BitConverter.Int64BitsToDouble(bits / 3 + 3071306045661749710);
    y = (2 * y + a / (y * y)) * 0.3333333333333333;
    y = (2 * y + a / (y * y)) * 0.3333333333333333;
    y = (2 * y + a / (y * y)) * 0.3333333333333333;
    y = (2 * y + a / (y * y)) * 0.3333333333333333;
    y = y * scale;
    return x < 0 ? -y : y;
}
"#;

const FAST_CBRT_SINGLE: &str = r#"
static float FastCbrt(float x)
{
    if (float.IsNaN(x) || float.IsInfinity(x) || x == 0F) return x;
    float a = x < 0F ? -x : x;
    float scale = 1F;
    if (a < 1.17549435E-38F)
    {
        a = a * 16777216F;
        scale = 0.00390625F;
    }
    int bits = BitConverter.SingleToInt32Bits(a);
    float y = BitConverter.Int32BitsToSingle(bits / 3 + 709958130);
    y = (2F * y + a / (y * y)) * 0.33333334F;
    y = (2F * y + a / (y * y)) * 0.33333334F;
    y = (2F * y + a / (y * y)) * 0.33333334F;
    y = (2F * y + a / (y * y)) * 0.33333334F;
    y = y * scale;
    return x < 0F ? -y : y;
}
"#;

const FAST_SIGN: &str = r#"
static int FastSign({T} x) => x > 0{F} ? 1 : x < 0{F} ? -1 : x == 0{F} ? 0 : throw new System.ArithmeticException("Function does not accept floating point Not-a-Number values.");
"#;

#[cfg(test)]
mod tests {
  use super::*;
  use crate::optimizer::EvaluationMode;
  use crate::optimizer::numeric::testing::{rewrite_str, session};
  use crate::ast::TypeRef;
  use crate::value::{Number, Value};

  use approx::{assert_abs_diff_eq, assert_relative_eq};

  fn call(session: &Session, name: &str, args: &[f64]) -> Result<Option<Value>, crate::host::HostException> {
    let args = args.iter().map(|x| Value::Number(Number::Double(*x))).collect::<Vec<_>>();
    session.evaluator().call_method(name, &args)
  }

  fn value(session: &Session, name: &str, args: &[f64]) -> f64 {
    match call(session, name, args).unwrap() {
      Some(Value::Number(n)) => n.to_f64(),
      other => panic!("{name}{args:?} gave {other:?}"),
    }
  }

  fn loaded(name: &str) -> Session {
    let session = session(EvaluationMode::FastApprox, &[]);
    assert!(instantiate(&session, name, NumericType::Double), "{name} did not instantiate");
    session
  }

  fn samples(lo: f64, hi: f64) -> impl Iterator<Item = f64> {
    (0..=200).map(move |i| lo + (hi - lo) * (i as f64) / 200.0)
  }

  #[test]
  fn test_every_template_parses() {
    for name in TEMPLATES.keys() {
      for ty in [NumericType::Double, NumericType::Single] {
        let source = render(name, ty).unwrap();
        let helper = parse_helper(&source).unwrap_or_else(|e| panic!("{name} for {ty}: {e}"));
        assert_eq!(helper.name, *name);
        assert_eq!(helper.params[0].ty, TypeRef::Numeric(ty));
      }
    }
  }

  #[test]
  fn test_dependencies_register_first() {
    let session = session(EvaluationMode::FastApprox, &[]);
    assert!(instantiate(&session, "FastTanh", NumericType::Double));
    let names = session.helpers().definitions().map(|d| d.name.clone()).collect::<Vec<_>>();
    assert_eq!(names, vec!["FastExp", "FastSinh", "FastTanh"]);
    assert!(instantiate(&session, "FastTanh", NumericType::Single));
    assert_eq!(session.helpers().len(), 6);
  }

  #[test]
  fn test_trig_special_cases() {
    let session = loaded("FastSin");
    assert_eq!(value(&session, "FastSin", &[0.0]), 0.0);
    assert!(value(&session, "FastSin", &[-0.0]).is_sign_negative());
    assert!(value(&session, "FastSin", &[f64::NAN]).is_nan());
    assert!(value(&session, "FastSin", &[f64::INFINITY]).is_nan());
    let session = loaded("FastCos");
    assert_eq!(value(&session, "FastCos", &[0.0]), 1.0);
  }

  #[test]
  fn test_trig_bounds() {
    let session = loaded("FastSin");
    assert!(instantiate(&session, "FastCos", NumericType::Double));
    assert!(instantiate(&session, "FastTan", NumericType::Double));
    for x in samples(-10.0, 10.0) {
      assert_abs_diff_eq!(value(&session, "FastSin", &[x]), x.sin(), epsilon = 1e-7);
      assert_abs_diff_eq!(value(&session, "FastCos", &[x]), x.cos(), epsilon = 1e-7);
    }
    for x in samples(-1.4, 1.4) {
      assert_relative_eq!(value(&session, "FastTan", &[x]), x.tan(), max_relative = 1e-6);
    }
  }

  #[test]
  fn test_inverse_trig_bounds() {
    let session = loaded("FastAtan2");
    assert!(instantiate(&session, "FastAsin", NumericType::Double));
    assert!(instantiate(&session, "FastAcos", NumericType::Double));
    for x in samples(-20.0, 20.0) {
      assert_abs_diff_eq!(value(&session, "FastAtan", &[x]), x.atan(), epsilon = 1e-8);
    }
    for x in samples(-1.0, 1.0) {
      assert_abs_diff_eq!(value(&session, "FastAsin", &[x]), x.asin(), epsilon = 1e-8);
      assert_abs_diff_eq!(value(&session, "FastAcos", &[x]), x.acos(), epsilon = 1e-8);
    }
    for (y, x) in [(1.0, 2.0), (-1.0, 2.0), (1.0, -2.0), (-1.0, -2.0), (3.0, -0.5)] {
      assert_abs_diff_eq!(value(&session, "FastAtan2", &[y, x]), f64::atan2(y, x), epsilon = 1e-8);
    }
    assert_eq!(value(&session, "FastAtan2", &[0.0, -1.0]), std::f64::consts::PI);
    assert!(value(&session, "FastAsin", &[1.5]).is_nan());
  }

  #[test]
  fn test_exp_log_bounds() {
    let session = loaded("FastLog10");
    for name in ["FastExp", "FastExp2", "FastLog2"] {
      assert!(instantiate(&session, name, NumericType::Double));
    }
    for x in samples(-20.0, 20.0) {
      assert_relative_eq!(value(&session, "FastExp", &[x]), x.exp(), max_relative = 1e-9);
      assert_relative_eq!(value(&session, "FastExp2", &[x]), x.exp2(), max_relative = 1e-9);
    }
    for x in samples(0.01, 100.0) {
      assert_abs_diff_eq!(value(&session, "FastLog", &[x]), x.ln(), epsilon = 1e-9);
      assert_abs_diff_eq!(value(&session, "FastLog10", &[x]), x.log10(), epsilon = 1e-9);
    }
    assert_eq!(value(&session, "FastExp", &[0.0]), 1.0);
    assert_eq!(value(&session, "FastExp", &[f64::NEG_INFINITY]), 0.0);
    assert_eq!(value(&session, "FastExp", &[f64::INFINITY]), f64::INFINITY);
    assert_eq!(value(&session, "FastLog", &[1.0]), 0.0);
    assert_eq!(value(&session, "FastLog", &[0.0]), f64::NEG_INFINITY);
    assert!(value(&session, "FastLog", &[-1.0]).is_nan());
    assert_eq!(value(&session, "FastLog2", &[1024.0]), 10.0);
    assert_eq!(value(&session, "FastExp2", &[-3.0]), 0.125);
  }

  #[test]
  fn test_hyperbolic_bounds() {
    let session = loaded("FastTanh");
    for name in ["FastCosh", "FastAsinh", "FastAcosh", "FastAtanh"] {
      assert!(instantiate(&session, name, NumericType::Double));
    }
    for x in samples(-5.0, 5.0) {
      assert_relative_eq!(value(&session, "FastSinh", &[x]), x.sinh(), max_relative = 1e-9, epsilon = 1e-12);
      assert_relative_eq!(value(&session, "FastCosh", &[x]), x.cosh(), max_relative = 1e-9);
      assert_abs_diff_eq!(value(&session, "FastTanh", &[x]), x.tanh(), epsilon = 1e-9);
      assert_abs_diff_eq!(value(&session, "FastAsinh", &[x]), x.asinh(), epsilon = 1e-9);
    }
    for x in samples(1.0, 50.0) {
      assert_abs_diff_eq!(value(&session, "FastAcosh", &[x]), x.acosh(), epsilon = 1e-8);
    }
    for x in samples(-0.99, 0.99) {
      assert_abs_diff_eq!(value(&session, "FastAtanh", &[x]), x.atanh(), epsilon = 1e-9);
    }
    assert_eq!(value(&session, "FastTanh", &[f64::INFINITY]), 1.0);
    assert_eq!(value(&session, "FastAtanh", &[1.0]), f64::INFINITY);
    assert_eq!(value(&session, "FastCosh", &[0.0]), 1.0);
  }

  #[test]
  fn test_cbrt() {
    let session = loaded("FastCbrt");
    for x in [-27.0, -1e-310, 0.001, 5.0, 8.0, 1e300] {
      assert_relative_eq!(value(&session, "FastCbrt", &[x]), x.cbrt(), max_relative = 1e-12);
    }
    assert!(value(&session, "FastCbrt", &[-0.0]).is_sign_negative());
    let session = session_single("FastCbrt");
    let result = session.evaluator().call_method("FastCbrt", &[Value::Number(Number::Single(27.0))]).unwrap();
    match result {
      Some(Value::Number(Number::Single(y))) => assert_relative_eq!(y, 3.0f32, max_relative = 1e-5),
      other => panic!("unexpected {other:?}"),
    }
  }

  fn session_single(name: &str) -> Session {
    let session = session(EvaluationMode::FastApprox, &[]);
    assert!(instantiate(&session, name, NumericType::Single));
    session
  }

  #[test]
  fn test_sign_keeps_nan_fault() {
    let session = loaded("FastSign");
    let result = call(&session, "FastSign", &[-2.5]).unwrap();
    assert_eq!(result, Some(Value::Number(Number::Int32(-1))));
    let err = call(&session, "FastSign", &[f64::NAN]).unwrap_err();
    assert_eq!(err.type_name, "System.ArithmeticException");
  }

  #[test]
  fn test_rewrites_call_sites_once() {
    let double = TypeRef::Numeric(NumericType::Double);
    let session = session(EvaluationMode::FastApprox, &[("x", double.clone()), ("y", double)]);
    assert_eq!(rewrite_str(&session, "Math.Sin(x)").unwrap(), "FastSin(x)");
    assert_eq!(rewrite_str(&session, "Math.Sin(y)").unwrap(), "FastSin(y)");
    assert_eq!(session.helpers().len(), 1);
  }

  #[test]
  fn test_exact_mode_keeps_library_calls() {
    let double = TypeRef::Numeric(NumericType::Double);
    let session = session(EvaluationMode::Exact, &[("x", double)]);
    assert_eq!(rewrite_str(&session, "Math.Sin(x)").unwrap(), "double.Sin(x)");
    assert!(session.helpers().is_empty());
  }
}
