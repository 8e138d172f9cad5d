//! Arithmetic, bitwise, comparison and logical operators plus the math
//! library. All functions are total: bad input yields `Mlrval::Error`.

use crate::runtime::{infer::Number, value::Mlrval};
use rand::Rng;
use std::cmp::Ordering;

/// Applies the absent/void/error dispositions shared by the binary numeric
/// operators. `Ok` carries both operands as numbers; `Err` is the finished
/// result.
fn numeric_operands(a: &Mlrval, b: &Mlrval) -> Result<(Number, Number), Mlrval> {
    match (a, b) {
        (Mlrval::Error, _) | (_, Mlrval::Error) => Err(Mlrval::Error),
        (Mlrval::Absent, other) | (other, Mlrval::Absent) => Err(other.clone()),
        (Mlrval::Void, other) | (other, Mlrval::Void) => {
            if other.is_void() || other.is_numeric() {
                Err(Mlrval::Void)
            } else {
                Err(Mlrval::Error)
            }
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(Mlrval::Error),
        },
    }
}

fn numeric_operand(a: &Mlrval) -> Result<Number, Mlrval> {
    match a {
        Mlrval::Absent | Mlrval::Void | Mlrval::Error => Err(a.clone()),
        other => other.as_number().ok_or(Mlrval::Error),
    }
}

fn int_operands(a: &Mlrval, b: &Mlrval) -> Result<(i64, i64), Mlrval> {
    match numeric_operands(a, b)? {
        (Number::Int(x), Number::Int(y)) => Ok((x, y)),
        _ => Err(Mlrval::Error),
    }
}

/// Int op with float fallback on overflow.
fn with_overflow(
    a: &Mlrval,
    b: &Mlrval,
    checked: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Mlrval {
    match numeric_operands(a, b) {
        Err(done) => done,
        Ok((Number::Int(x), Number::Int(y))) => match checked(x, y) {
            Some(z) => Mlrval::Int(z),
            None => Mlrval::Float(float(x as f64, y as f64)),
        },
        Ok((x, y)) => Mlrval::Float(float(x.as_f64(), y.as_f64())),
    }
}

pub fn plus(a: &Mlrval, b: &Mlrval) -> Mlrval {
    with_overflow(a, b, i64::checked_add, |x, y| x + y)
}

pub fn minus(a: &Mlrval, b: &Mlrval) -> Mlrval {
    with_overflow(a, b, i64::checked_sub, |x, y| x - y)
}

pub fn times(a: &Mlrval, b: &Mlrval) -> Mlrval {
    with_overflow(a, b, i64::checked_mul, |x, y| x * y)
}

/// Exact int quotients stay int; everything else is float.
pub fn divide(a: &Mlrval, b: &Mlrval) -> Mlrval {
    match numeric_operands(a, b) {
        Err(done) => done,
        Ok((Number::Int(x), Number::Int(y))) if y != 0 && x.checked_rem(y) == Some(0) => {
            Mlrval::Int(x / y)
        }
        Ok((x, y)) => Mlrval::Float(x.as_f64() / y.as_f64()),
    }
}

pub fn int_divide(a: &Mlrval, b: &Mlrval) -> Mlrval {
    match numeric_operands(a, b) {
        Err(done) => done,
        Ok((Number::Int(x), Number::Int(y))) if y != 0 => match x.checked_div(y) {
            Some(q) if x % y != 0 && (x < 0) != (y < 0) => Mlrval::Int(q - 1),
            Some(q) => Mlrval::Int(q),
            None => Mlrval::Float((x as f64 / y as f64).floor()),
        },
        Ok((x, y)) => Mlrval::Float((x.as_f64() / y.as_f64()).floor()),
    }
}

/// The result takes the sign of the divisor.
pub fn modulus(a: &Mlrval, b: &Mlrval) -> Mlrval {
    match numeric_operands(a, b) {
        Err(done) => done,
        Ok((Number::Int(_), Number::Int(0))) => Mlrval::Error,
        Ok((Number::Int(x), Number::Int(y))) => {
            let m = x.wrapping_rem(y);
            if m != 0 && (m < 0) != (y < 0) {
                Mlrval::Int(m + y)
            } else {
                Mlrval::Int(m)
            }
        }
        Ok((x, y)) => {
            let (x, y) = (x.as_f64(), y.as_f64());
            Mlrval::Float(x - y * (x / y).floor())
        }
    }
}

pub fn pow(a: &Mlrval, b: &Mlrval) -> Mlrval {
    match numeric_operands(a, b) {
        Err(done) => done,
        Ok((Number::Int(x), Number::Int(y))) if y >= 0 => u32::try_from(y)
            .ok()
            .and_then(|y| x.checked_pow(y))
            .map(Mlrval::Int)
            .unwrap_or_else(|| Mlrval::Float((x as f64).powf(y as f64))),
        Ok((x, y)) => Mlrval::Float(x.as_f64().powf(y.as_f64())),
    }
}

pub fn negate(a: &Mlrval) -> Mlrval {
    match numeric_operand(a) {
        Err(done) => done,
        Ok(Number::Int(i)) => i
            .checked_neg()
            .map(Mlrval::Int)
            .unwrap_or(Mlrval::Float(-(i as f64))),
        Ok(Number::Float(f)) => Mlrval::Float(-f),
    }
}

pub fn positive(a: &Mlrval) -> Mlrval {
    match numeric_operand(a) {
        Err(done) => done,
        Ok(number) => number.into(),
    }
}

pub fn bitwise_not(a: &Mlrval) -> Mlrval {
    match numeric_operand(a) {
        Err(done) => done,
        Ok(Number::Int(i)) => Mlrval::Int(!i),
        Ok(Number::Float(_)) => Mlrval::Error,
    }
}

fn bitwise(a: &Mlrval, b: &Mlrval, op: fn(i64, i64) -> i64) -> Mlrval {
    match int_operands(a, b) {
        Ok((x, y)) => Mlrval::Int(op(x, y)),
        Err(done) => done,
    }
}

pub fn bitwise_and(a: &Mlrval, b: &Mlrval) -> Mlrval {
    bitwise(a, b, |x, y| x & y)
}

pub fn bitwise_or(a: &Mlrval, b: &Mlrval) -> Mlrval {
    bitwise(a, b, |x, y| x | y)
}

pub fn bitwise_xor(a: &Mlrval, b: &Mlrval) -> Mlrval {
    bitwise(a, b, |x, y| x ^ y)
}

pub fn shift_left(a: &Mlrval, b: &Mlrval) -> Mlrval {
    bitwise(a, b, |x, y| x.wrapping_shl(y as u32))
}

pub fn shift_right(a: &Mlrval, b: &Mlrval) -> Mlrval {
    bitwise(a, b, |x, y| x.wrapping_shr(y as u32))
}

pub fn shift_right_unsigned(a: &Mlrval, b: &Mlrval) -> Mlrval {
    bitwise(a, b, |x, y| (x as u64).wrapping_shr(y as u32) as i64)
}

/// String concatenation; absent contributes nothing.
pub fn dot(a: &Mlrval, b: &Mlrval) -> Mlrval {
    match (a, b) {
        (Mlrval::Error, _) | (_, Mlrval::Error) => Mlrval::Error,
        (Mlrval::Absent, other) | (other, Mlrval::Absent) => other.clone(),
        _ => Mlrval::from_string(format!("{a}{b}")),
    }
}

/// Int-preserving `.+`: int results wrap instead of going float.
pub fn dot_plus(a: &Mlrval, b: &Mlrval) -> Mlrval {
    wrapping(a, b, i64::wrapping_add, |x, y| x + y)
}

pub fn dot_minus(a: &Mlrval, b: &Mlrval) -> Mlrval {
    wrapping(a, b, i64::wrapping_sub, |x, y| x - y)
}

pub fn dot_times(a: &Mlrval, b: &Mlrval) -> Mlrval {
    wrapping(a, b, i64::wrapping_mul, |x, y| x * y)
}

/// Truncating int quotient; division by zero goes float.
pub fn dot_divide(a: &Mlrval, b: &Mlrval) -> Mlrval {
    match numeric_operands(a, b) {
        Err(done) => done,
        Ok((Number::Int(x), Number::Int(y))) if y != 0 => Mlrval::Int(x.wrapping_div(y)),
        Ok((x, y)) => Mlrval::Float(x.as_f64() / y.as_f64()),
    }
}

pub fn dot_int_divide(a: &Mlrval, b: &Mlrval) -> Mlrval {
    match numeric_operands(a, b) {
        Err(done) => done,
        Ok((Number::Int(x), Number::Int(y))) if y != 0 => {
            let q = x.wrapping_div(y);
            if x.wrapping_rem(y) != 0 && (x < 0) != (y < 0) {
                Mlrval::Int(q.wrapping_sub(1))
            } else {
                Mlrval::Int(q)
            }
        }
        Ok((x, y)) => Mlrval::Float((x.as_f64() / y.as_f64()).floor()),
    }
}

pub fn dot_negate(a: &Mlrval) -> Mlrval {
    match numeric_operand(a) {
        Err(done) => done,
        Ok(Number::Int(i)) => Mlrval::Int(i.wrapping_neg()),
        Ok(Number::Float(f)) => Mlrval::Float(-f),
    }
}

fn wrapping(a: &Mlrval, b: &Mlrval, int: fn(i64, i64) -> i64, float: fn(f64, f64) -> f64) -> Mlrval {
    match numeric_operands(a, b) {
        Err(done) => done,
        Ok((Number::Int(x), Number::Int(y))) => Mlrval::Int(int(x, y)),
        Ok((x, y)) => Mlrval::Float(float(x.as_f64(), y.as_f64())),
    }
}

fn compare(a: &Mlrval, b: &Mlrval) -> Result<Option<Ordering>, Mlrval> {
    match (a, b) {
        (Mlrval::Error, _) | (_, Mlrval::Error) => Err(Mlrval::Error),
        (Mlrval::Absent, _) | (_, Mlrval::Absent) => Err(Mlrval::Absent),
        _ => Ok(match (a.as_number(), b.as_number()) {
            (Some(Number::Int(x)), Some(Number::Int(y))) => Some(x.cmp(&y)),
            (Some(x), Some(y)) => x.as_f64().partial_cmp(&y.as_f64()),
            _ => Some(a.to_string().cmp(&b.to_string())),
        }),
    }
}

fn comparison(a: &Mlrval, b: &Mlrval, test: fn(Ordering) -> bool) -> Mlrval {
    match compare(a, b) {
        Err(done) => done,
        Ok(ordering) => Mlrval::Boolean(ordering.is_some_and(test)),
    }
}

pub fn equals(a: &Mlrval, b: &Mlrval) -> Mlrval {
    comparison(a, b, Ordering::is_eq)
}

pub fn not_equals(a: &Mlrval, b: &Mlrval) -> Mlrval {
    match compare(a, b) {
        Err(done) => done,
        Ok(ordering) => Mlrval::Boolean(ordering != Some(Ordering::Equal)),
    }
}

pub fn less_than(a: &Mlrval, b: &Mlrval) -> Mlrval {
    comparison(a, b, Ordering::is_lt)
}

pub fn less_than_or_equals(a: &Mlrval, b: &Mlrval) -> Mlrval {
    comparison(a, b, Ordering::is_le)
}

pub fn greater_than(a: &Mlrval, b: &Mlrval) -> Mlrval {
    comparison(a, b, Ordering::is_gt)
}

pub fn greater_than_or_equals(a: &Mlrval, b: &Mlrval) -> Mlrval {
    comparison(a, b, Ordering::is_ge)
}

pub fn logical_not(a: &Mlrval) -> Mlrval {
    match a {
        Mlrval::Absent | Mlrval::Error => a.clone(),
        other => other
            .as_boolean()
            .map(|b| Mlrval::Boolean(!b))
            .unwrap_or(Mlrval::Error),
    }
}

/// Boolean view of one `&&`/`||`/`^^` operand: `Ok(None)` for absent.
pub fn logical_operand(a: &Mlrval) -> Result<Option<bool>, Mlrval> {
    match a {
        Mlrval::Absent => Ok(None),
        Mlrval::Error => Err(Mlrval::Error),
        other => other.as_boolean().map(Some).ok_or(Mlrval::Error),
    }
}

pub fn logical_xor(a: &Mlrval, b: &Mlrval) -> Mlrval {
    match (logical_operand(a), logical_operand(b)) {
        (Err(done), _) | (_, Err(done)) => done,
        (Ok(Some(x)), Ok(Some(y))) => Mlrval::Boolean(x ^ y),
        (Ok(Some(x)), Ok(None)) | (Ok(None), Ok(Some(x))) => Mlrval::Boolean(x),
        (Ok(None), Ok(None)) => Mlrval::Absent,
    }
}

/// Ordering used by `min`/`max` across types: booleans, then void, then
/// numbers, then strings.
fn rank(value: &Mlrval) -> u8 {
    match value {
        Mlrval::Boolean(_) => 0,
        Mlrval::Void => 1,
        v if v.is_numeric() => 2,
        _ => 3,
    }
}

fn extreme(args: &[Mlrval], want: Ordering) -> Mlrval {
    let mut best: Option<&Mlrval> = None;
    for arg in args {
        match arg {
            Mlrval::Error => return Mlrval::Error,
            Mlrval::Absent => continue,
            _ => {}
        }
        let Some(current) = best else {
            best = Some(arg);
            continue;
        };
        let ordering = rank(arg).cmp(&rank(current)).then_with(|| match (arg, current) {
            (Mlrval::Boolean(x), Mlrval::Boolean(y)) => x.cmp(y),
            _ => match (arg.as_number(), current.as_number()) {
                (Some(Number::Int(x)), Some(Number::Int(y))) => x.cmp(&y),
                (Some(x), Some(y)) => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
                _ => arg.to_string().cmp(&current.to_string()),
            },
        });
        if ordering == want {
            best = Some(arg);
        }
    }
    best.cloned().unwrap_or(Mlrval::Absent)
}

pub fn min(args: &[Mlrval]) -> Mlrval {
    extreme(args, Ordering::Less)
}

pub fn max(args: &[Mlrval]) -> Mlrval {
    extreme(args, Ordering::Greater)
}

fn float_unary(a: &Mlrval, f: fn(f64) -> f64) -> Mlrval {
    match numeric_operand(a) {
        Err(done) => done,
        Ok(number) => Mlrval::Float(f(number.as_f64())),
    }
}

/// Int input stays int; floats go through `f`.
fn int_preserving(a: &Mlrval, f: fn(f64) -> f64) -> Mlrval {
    match numeric_operand(a) {
        Err(done) => done,
        Ok(Number::Int(i)) => Mlrval::Int(i),
        Ok(Number::Float(x)) => Mlrval::Float(f(x)),
    }
}

pub fn abs(a: &Mlrval) -> Mlrval {
    match numeric_operand(a) {
        Err(done) => done,
        Ok(Number::Int(i)) => i
            .checked_abs()
            .map(Mlrval::Int)
            .unwrap_or(Mlrval::Float((i as f64).abs())),
        Ok(Number::Float(f)) => Mlrval::Float(f.abs()),
    }
}

pub fn ceiling(a: &Mlrval) -> Mlrval {
    int_preserving(a, f64::ceil)
}

pub fn floor(a: &Mlrval) -> Mlrval {
    int_preserving(a, f64::floor)
}

pub fn round(a: &Mlrval) -> Mlrval {
    int_preserving(a, f64::round)
}

pub fn sgn(a: &Mlrval) -> Mlrval {
    match numeric_operand(a) {
        Err(done) => done,
        Ok(Number::Int(i)) => Mlrval::Int(i.signum()),
        Ok(Number::Float(f)) if f.is_nan() => Mlrval::Float(f),
        Ok(Number::Float(f)) if f == 0.0 => Mlrval::Float(0.0),
        Ok(Number::Float(f)) => Mlrval::Float(f.signum()),
    }
}

/// Rounds `a` to the nearest multiple of `m`.
pub fn roundm(a: &Mlrval, m: &Mlrval) -> Mlrval {
    match numeric_operands(a, m) {
        Err(done) => done,
        Ok((Number::Int(_), Number::Int(0))) => Mlrval::Error,
        Ok((Number::Int(x), Number::Int(y))) => {
            Mlrval::Int(((x as f64 / y as f64).round() as i64).saturating_mul(y))
        }
        Ok((x, y)) => {
            let (x, y) = (x.as_f64(), y.as_f64());
            Mlrval::Float((x / y).round() * y)
        }
    }
}

pub fn atan2(y: &Mlrval, x: &Mlrval) -> Mlrval {
    match numeric_operands(y, x) {
        Err(done) => done,
        Ok((y, x)) => Mlrval::Float(y.as_f64().atan2(x.as_f64())),
    }
}

pub fn exp(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::exp)
}

pub fn expm1(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::exp_m1)
}

pub fn log(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::ln)
}

pub fn log10(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::log10)
}

pub fn log1p(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::ln_1p)
}

pub fn sqrt(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::sqrt)
}

pub fn cbrt(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::cbrt)
}

pub fn sin(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::sin)
}

pub fn cos(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::cos)
}

pub fn tan(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::tan)
}

pub fn asin(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::asin)
}

pub fn acos(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::acos)
}

pub fn atan(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::atan)
}

pub fn sinh(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::sinh)
}

pub fn cosh(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::cosh)
}

pub fn tanh(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::tanh)
}

pub fn asinh(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::asinh)
}

pub fn acosh(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::acosh)
}

pub fn atanh(a: &Mlrval) -> Mlrval {
    float_unary(a, f64::atanh)
}

pub fn erf(a: &Mlrval) -> Mlrval {
    float_unary(a, libm::erf)
}

pub fn erfc(a: &Mlrval) -> Mlrval {
    float_unary(a, libm::erfc)
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * libm::erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal cumulative distribution function.
pub fn qnorm(a: &Mlrval) -> Mlrval {
    float_unary(a, normal_cdf)
}

const INVQNORM_TOLERANCE: f64 = 1e-9;
const INVQNORM_MAX_ITERATIONS: usize = 30;

/// Newton's method on `normal_cdf`, starting from a linear guess. Inputs
/// outside (0, 1) give 0.
fn inverse_normal_cdf(x: f64) -> f64 {
    if x <= 0.0 || x >= 1.0 {
        return 0.0;
    }
    let slope = (2.0 * std::f64::consts::PI).sqrt();
    let mut y = x - 0.5;
    for _ in 0..INVQNORM_MAX_ITERATIONS {
        let error = x - normal_cdf(y);
        if error.abs() < INVQNORM_TOLERANCE {
            break;
        }
        y += slope * (y * y / 2.0).exp() * error;
    }
    y
}

pub fn invqnorm(a: &Mlrval) -> Mlrval {
    float_unary(a, inverse_normal_cdf)
}

/// `1 / (1 + exp(-m*x - b))`.
pub fn logifit(x: &Mlrval, m: &Mlrval, b: &Mlrval) -> Mlrval {
    for arg in [x, m, b] {
        if let Err(done) = numeric_operand(arg) {
            return done;
        }
    }
    match (x.as_number(), m.as_number(), b.as_number()) {
        (Some(x), Some(m), Some(b)) => {
            Mlrval::Float(1.0 / (1.0 + (-m.as_f64() * x.as_f64() - b.as_f64()).exp()))
        }
        _ => Mlrval::Error,
    }
}

pub fn bitcount(a: &Mlrval) -> Mlrval {
    match numeric_operand(a) {
        Err(done) => done,
        Ok(Number::Int(i)) => Mlrval::Int(i64::from(i.count_ones())),
        Ok(Number::Float(_)) => Mlrval::Error,
    }
}

/// Shared argument handling for `madd` and friends: error and absent pass
/// through, everything else must be int with a positive modulus.
fn modular(a: &Mlrval, b: &Mlrval, m: &Mlrval, op: fn(i128, i128, i128) -> i128) -> Mlrval {
    let mut ints = [0i64; 3];
    for (slot, arg) in ints.iter_mut().zip([a, b, m]) {
        match arg {
            Mlrval::Error | Mlrval::Absent => return arg.clone(),
            _ => match arg.as_number() {
                Some(Number::Int(i)) => *slot = i,
                _ => return Mlrval::Error,
            },
        }
    }
    let [x, y, modulus] = ints.map(i128::from);
    if modulus <= 0 {
        return Mlrval::Error;
    }
    let result = op(x, y, modulus).rem_euclid(modulus);
    i64::try_from(result).map(Mlrval::Int).unwrap_or(Mlrval::Error)
}

pub fn madd(a: &Mlrval, b: &Mlrval, m: &Mlrval) -> Mlrval {
    modular(a, b, m, |x, y, _| x + y)
}

pub fn msub(a: &Mlrval, b: &Mlrval, m: &Mlrval) -> Mlrval {
    modular(a, b, m, |x, y, _| x - y)
}

pub fn mmul(a: &Mlrval, b: &Mlrval, m: &Mlrval) -> Mlrval {
    modular(a, b, m, |x, y, m| x.rem_euclid(m) * y.rem_euclid(m))
}

/// Square-and-multiply; negative exponents are an error.
pub fn mexp(a: &Mlrval, e: &Mlrval, m: &Mlrval) -> Mlrval {
    if matches!(e.as_number(), Some(Number::Int(i)) if i < 0) {
        return Mlrval::Error;
    }
    modular(a, e, m, |base, exponent, m| {
        let mut base = base.rem_euclid(m);
        let mut exponent = exponent;
        let mut result = 1 % m;
        while exponent > 0 {
            if exponent & 1 == 1 {
                result = result * base % m;
            }
            base = base * base % m;
            exponent >>= 1;
        }
        result
    })
}

pub fn urand(_: &[Mlrval]) -> Mlrval {
    Mlrval::Float(rand::thread_rng().gen::<f64>())
}

pub fn urand32(_: &[Mlrval]) -> Mlrval {
    Mlrval::Int(i64::from(rand::thread_rng().gen::<u32>()))
}

/// Uniform int in `[lo, hi]`; the bounds may come in either order.
pub fn urandint(lo: &Mlrval, hi: &Mlrval) -> Mlrval {
    match int_operands(lo, hi) {
        Err(done) => done,
        Ok((lo, hi)) => Mlrval::Int(rand::thread_rng().gen_range(lo.min(hi)..=lo.max(hi))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Mlrval {
        Mlrval::String(text.into())
    }

    #[test]
    fn absent_is_the_identity_and_error_wins() {
        assert_eq!(plus(&Mlrval::Absent, &Mlrval::Int(3)), Mlrval::Int(3));
        assert_eq!(times(&Mlrval::Int(3), &Mlrval::Absent), Mlrval::Int(3));
        assert_eq!(plus(&Mlrval::Absent, &Mlrval::Absent), Mlrval::Absent);
        assert_eq!(plus(&Mlrval::Error, &Mlrval::Absent), Mlrval::Error);
        assert_eq!(minus(&Mlrval::Void, &Mlrval::Int(1)), Mlrval::Void);
        assert_eq!(plus(&s("abc"), &Mlrval::Int(1)), Mlrval::Error);
        assert_eq!(plus(&Mlrval::Boolean(true), &Mlrval::Int(1)), Mlrval::Error);
    }

    #[test]
    fn numeric_strings_and_overflow() {
        assert_eq!(plus(&s("3"), &Mlrval::Int(4)), Mlrval::Int(7));
        assert_eq!(plus(&Mlrval::Int(1), &Mlrval::Float(0.5)), Mlrval::Float(1.5));
        assert_eq!(
            plus(&Mlrval::Int(i64::MAX), &Mlrval::Int(1)),
            Mlrval::Float(i64::MAX as f64 + 1.0)
        );
        assert!(matches!(pow(&Mlrval::Int(2), &Mlrval::Int(64)), Mlrval::Float(_)));
        assert_eq!(pow(&Mlrval::Int(2), &Mlrval::Int(10)), Mlrval::Int(1024));
    }

    #[test]
    fn division_family() {
        assert_eq!(divide(&Mlrval::Int(6), &Mlrval::Int(2)), Mlrval::Int(3));
        assert_eq!(divide(&Mlrval::Int(7), &Mlrval::Int(2)), Mlrval::Float(3.5));
        assert_eq!(int_divide(&Mlrval::Int(-7), &Mlrval::Int(2)), Mlrval::Int(-4));
        assert_eq!(int_divide(&Mlrval::Int(7), &Mlrval::Int(2)), Mlrval::Int(3));
        assert_eq!(modulus(&Mlrval::Int(-7), &Mlrval::Int(5)), Mlrval::Int(3));
        assert_eq!(modulus(&Mlrval::Int(7), &Mlrval::Int(-5)), Mlrval::Int(-3));
        assert_eq!(modulus(&Mlrval::Int(7), &Mlrval::Int(0)), Mlrval::Error);
    }

    #[test]
    fn bitwise_operators_are_int_only() {
        assert_eq!(bitwise_and(&Mlrval::Int(6), &Mlrval::Int(3)), Mlrval::Int(2));
        assert_eq!(shift_left(&Mlrval::Int(1), &Mlrval::Int(4)), Mlrval::Int(16));
        assert_eq!(shift_right(&Mlrval::Int(-16), &Mlrval::Int(2)), Mlrval::Int(-4));
        assert_eq!(
            shift_right_unsigned(&Mlrval::Int(-1), &Mlrval::Int(60)),
            Mlrval::Int(15)
        );
        assert_eq!(bitwise_or(&Mlrval::Float(1.5), &Mlrval::Int(1)), Mlrval::Error);
        assert_eq!(bitwise_not(&Mlrval::Int(0)), Mlrval::Int(-1));
    }

    #[test]
    fn comparisons_are_numeric_or_lexical() {
        assert_eq!(less_than(&Mlrval::Int(9), &Mlrval::Int(10)), Mlrval::Boolean(true));
        assert_eq!(less_than(&s("9"), &s("10")), Mlrval::Boolean(true));
        assert_eq!(less_than(&s("abc"), &s("abd")), Mlrval::Boolean(true));
        assert_eq!(equals(&Mlrval::Int(1), &Mlrval::Float(1.0)), Mlrval::Boolean(true));
        assert_eq!(equals(&Mlrval::Absent, &Mlrval::Int(1)), Mlrval::Absent);
        assert_eq!(not_equals(&s("a"), &s("b")), Mlrval::Boolean(true));
    }

    #[test]
    fn dot_treats_absent_as_empty() {
        assert_eq!(dot(&s("a"), &Mlrval::Int(1)), s("a1"));
        assert_eq!(dot(&Mlrval::Absent, &s("b")), s("b"));
        assert_eq!(dot(&Mlrval::Void, &Mlrval::Void), Mlrval::Void);
    }

    #[test]
    fn logical_operators() {
        assert_eq!(logical_not(&s("true")), Mlrval::Boolean(false));
        assert_eq!(logical_not(&Mlrval::Int(1)), Mlrval::Error);
        assert_eq!(
            logical_xor(&Mlrval::Boolean(true), &Mlrval::Absent),
            Mlrval::Boolean(true)
        );
        assert_eq!(
            logical_xor(&Mlrval::Boolean(true), &Mlrval::Boolean(true)),
            Mlrval::Boolean(false)
        );
    }

    #[test]
    fn min_and_max_rank_across_types() {
        let args = [Mlrval::Int(3), Mlrval::Float(4.5), Mlrval::Absent, Mlrval::Int(-1)];
        assert_eq!(max(&args), Mlrval::Float(4.5));
        assert_eq!(min(&args), Mlrval::Int(-1));
        assert_eq!(max(&[Mlrval::Int(3), s("abc")]), s("abc"));
        assert_eq!(min(&[Mlrval::Int(3), Mlrval::Boolean(true)]), Mlrval::Boolean(true));
        assert_eq!(max(&[]), Mlrval::Absent);
    }

    #[test]
    fn math_functions() {
        assert_eq!(abs(&Mlrval::Int(-3)), Mlrval::Int(3));
        assert_eq!(floor(&Mlrval::Float(2.7)), Mlrval::Float(2.0));
        assert_eq!(round(&Mlrval::Int(5)), Mlrval::Int(5));
        assert_eq!(roundm(&Mlrval::Int(7), &Mlrval::Int(5)), Mlrval::Int(5));
        assert_eq!(sgn(&Mlrval::Float(-0.5)), Mlrval::Float(-1.0));
        assert_eq!(sqrt(&Mlrval::Int(16)), Mlrval::Float(4.0));
        assert_eq!(exp(&Mlrval::Absent), Mlrval::Absent);
        assert_eq!(log(&s("x")), Mlrval::Error);
    }

    #[test]
    fn dot_operators_stay_int() {
        assert_eq!(dot_plus(&Mlrval::Int(1), &Mlrval::Int(3)), Mlrval::Int(4));
        assert_eq!(dot_plus(&Mlrval::Int(i64::MAX), &Mlrval::Int(1)), Mlrval::Int(i64::MIN));
        assert_eq!(dot_times(&Mlrval::Int(i64::MAX), &Mlrval::Int(2)), Mlrval::Int(-2));
        assert_eq!(dot_minus(&Mlrval::Int(1), &Mlrval::Float(0.5)), Mlrval::Float(0.5));
        assert_eq!(dot_divide(&Mlrval::Int(7), &Mlrval::Int(2)), Mlrval::Int(3));
        assert_eq!(dot_divide(&Mlrval::Int(-7), &Mlrval::Int(2)), Mlrval::Int(-3));
        assert_eq!(dot_int_divide(&Mlrval::Int(-7), &Mlrval::Int(2)), Mlrval::Int(-4));
        assert_eq!(dot_divide(&Mlrval::Int(1), &Mlrval::Int(0)), Mlrval::Float(f64::INFINITY));
        assert_eq!(dot_negate(&Mlrval::Int(i64::MIN)), Mlrval::Int(i64::MIN));
        assert_eq!(dot_plus(&Mlrval::Absent, &Mlrval::Int(2)), Mlrval::Int(2));
        assert_eq!(dot_plus(&s("x"), &Mlrval::Int(2)), Mlrval::Error);
    }

    #[test]
    fn most_negative_int_modulo_minus_one_is_int_zero() {
        assert_eq!(modulus(&Mlrval::Int(i64::MIN), &Mlrval::Int(-1)), Mlrval::Int(0));
    }

    #[test]
    fn normal_distribution_functions() {
        let Mlrval::Float(half) = qnorm(&Mlrval::Int(0)) else {
            panic!("qnorm should be float");
        };
        assert!((half - 0.5).abs() < 1e-12);
        let Mlrval::Float(p) = qnorm(&Mlrval::Float(1.0)) else {
            panic!("qnorm should be float");
        };
        assert!((p - 0.841344746).abs() < 1e-6);
        let Mlrval::Float(y) = invqnorm(&Mlrval::Float(p)) else {
            panic!("invqnorm should be float");
        };
        assert!((y - 1.0).abs() < 1e-6);
        assert_eq!(invqnorm(&Mlrval::Int(2)), Mlrval::Float(0.0));
        assert_eq!(erf(&Mlrval::Int(0)), Mlrval::Float(0.0));
        assert_eq!(erfc(&Mlrval::Int(0)), Mlrval::Float(1.0));
        assert_eq!(logifit(&Mlrval::Int(0), &Mlrval::Int(1), &Mlrval::Int(0)), Mlrval::Float(0.5));
        assert_eq!(asinh(&Mlrval::Int(0)), Mlrval::Float(0.0));
        assert_eq!(atanh(&Mlrval::Absent), Mlrval::Absent);
    }

    #[test]
    fn bitcount_counts_set_bits() {
        assert_eq!(bitcount(&Mlrval::Int(255)), Mlrval::Int(8));
        assert_eq!(bitcount(&Mlrval::Int(-1)), Mlrval::Int(64));
        assert_eq!(bitcount(&Mlrval::Float(1.5)), Mlrval::Error);
        assert_eq!(bitcount(&Mlrval::Void), Mlrval::Void);
    }

    #[test]
    fn modular_arithmetic() {
        let m = Mlrval::Int(7);
        assert_eq!(madd(&Mlrval::Int(5), &Mlrval::Int(3), &m), Mlrval::Int(1));
        assert_eq!(msub(&Mlrval::Int(5), &Mlrval::Int(6), &m), Mlrval::Int(6));
        assert_eq!(mmul(&Mlrval::Int(3), &Mlrval::Int(4), &m), Mlrval::Int(5));
        assert_eq!(mexp(&Mlrval::Int(2), &Mlrval::Int(10), &m), Mlrval::Int(2));
        assert_eq!(
            mmul(&Mlrval::Int(i64::MAX), &Mlrval::Int(i64::MAX), &Mlrval::Int(1_000_000_007)),
            Mlrval::Int(((i64::MAX as i128 * i64::MAX as i128) % 1_000_000_007) as i64)
        );
        assert_eq!(mexp(&Mlrval::Int(2), &Mlrval::Int(-1), &m), Mlrval::Error);
        assert_eq!(madd(&Mlrval::Float(1.5), &Mlrval::Int(1), &m), Mlrval::Error);
        assert_eq!(madd(&Mlrval::Int(1), &Mlrval::Int(1), &Mlrval::Int(0)), Mlrval::Error);
        assert_eq!(madd(&Mlrval::Absent, &Mlrval::Int(1), &m), Mlrval::Absent);
    }

    #[test]
    fn random_functions_stay_in_range() {
        for _ in 0..100 {
            let Mlrval::Float(u) = urand(&[]) else {
                panic!("urand should be float");
            };
            assert!((0.0..1.0).contains(&u));
            let Mlrval::Int(i) = urandint(&Mlrval::Int(5), &Mlrval::Int(3)) else {
                panic!("urandint should be int");
            };
            assert!((3..=5).contains(&i));
            let Mlrval::Int(w) = urand32(&[]) else {
                panic!("urand32 should be int");
            };
            assert!((0..=u32::MAX as i64).contains(&w));
        }
        assert_eq!(urandint(&Mlrval::Float(1.5), &Mlrval::Int(3)), Mlrval::Error);
    }
}
