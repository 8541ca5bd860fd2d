//! Arithmetic, comparison, bitwise, and concatenation dispatch
//!
//! Coercion rules: `+ - * // %` stay integral when both operands are
//! integers and go through floats otherwise; `/` and `^` always produce
//! floats; floor division and modulo follow floor semantics in both
//! domains, and the integer forms error on a zero divisor. Bitwise ops
//! take integers, accepting floats with an exact integral value.
//! Type mismatches surface as [`RtError::Type`] naming the operation.

use rill_code::{BinOp, UnOp};

use crate::error::{RtError, RtResult};
use crate::value::Value;

fn as_float(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

/// Integer view for bitwise ops: floats coerce only when exactly integral
fn as_int(v: &Value, op: &str) -> RtResult<i64> {
    match v {
        Value::Int(n) => Ok(*n),
        Value::Float(x) if x.fract() == 0.0 && *x >= i64::MIN as f64 && *x <= i64::MAX as f64 => {
            Ok(*x as i64)
        }
        Value::Float(_) => Err(RtError::type_error(format!(
            "{op}: float has no exact integer representation"
        ))),
        other => Err(RtError::type_error(format!(
            "{op}: expected number, got {}",
            other.type_name()
        ))),
    }
}

fn type_mismatch(op: &str, a: &Value, b: &Value) -> RtError {
    RtError::type_error(format!(
        "{op}: cannot operate on {} and {}",
        a.type_name(),
        b.type_name()
    ))
}

/// Evaluate a binary operation
pub fn bin(op: BinOp, a: &Value, b: &Value) -> RtResult<Value> {
    match op {
        BinOp::Add => num_op(op, a, b, i64::wrapping_add, |x, y| x + y),
        BinOp::Sub => num_op(op, a, b, i64::wrapping_sub, |x, y| x - y),
        BinOp::Mul => num_op(op, a, b, i64::wrapping_mul, |x, y| x * y),

        BinOp::Div => match (as_float(a), as_float(b)) {
            (Some(x), Some(y)) => Ok(Value::Float(x / y)),
            _ => Err(type_mismatch(op.name(), a, b)),
        },

        BinOp::Pow => match (as_float(a), as_float(b)) {
            (Some(x), Some(y)) => Ok(Value::Float(x.powf(y))),
            _ => Err(type_mismatch(op.name(), a, b)),
        },

        BinOp::FloorDiv => match (a, b) {
            (Value::Int(x), Value::Int(y)) => {
                if *y == 0 {
                    return Err(RtError::value_error("attempt to divide by zero"));
                }
                Ok(Value::Int(floor_div(*x, *y)))
            }
            _ => match (as_float(a), as_float(b)) {
                (Some(x), Some(y)) => Ok(Value::Float((x / y).floor())),
                _ => Err(type_mismatch(op.name(), a, b)),
            },
        },

        BinOp::Mod => match (a, b) {
            (Value::Int(x), Value::Int(y)) => {
                if *y == 0 {
                    return Err(RtError::value_error("attempt to take a remainder with zero"));
                }
                Ok(Value::Int(floor_mod(*x, *y)))
            }
            _ => match (as_float(a), as_float(b)) {
                (Some(x), Some(y)) => Ok(Value::Float(x - (x / y).floor() * y)),
                _ => Err(type_mismatch(op.name(), a, b)),
            },
        },

        BinOp::BitAnd => Ok(Value::Int(as_int(a, "band")? & as_int(b, "band")?)),
        BinOp::BitOr => Ok(Value::Int(as_int(a, "bor")? | as_int(b, "bor")?)),
        BinOp::BitXor => Ok(Value::Int(as_int(a, "bxor")? ^ as_int(b, "bxor")?)),
        BinOp::Shl => Ok(Value::Int(shift(as_int(a, "shl")?, as_int(b, "shl")?))),
        BinOp::Shr => Ok(Value::Int(shift(
            as_int(a, "shr")?,
            as_int(b, "shr")?.wrapping_neg(),
        ))),

        BinOp::Eq => Ok(Value::Bool(a.rill_eq(b))),
        BinOp::Lt => ordered(op, a, b, |o| o == std::cmp::Ordering::Less),
        BinOp::Le => ordered(op, a, b, |o| o != std::cmp::Ordering::Greater),

        BinOp::Concat => {
            let mut s = concat_part(a).ok_or_else(|| type_mismatch("concat", a, b))?;
            s.push_str(&concat_part(b).ok_or_else(|| type_mismatch("concat", a, b))?);
            Ok(Value::str(s))
        }
    }
}

fn num_op(
    op: BinOp,
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> RtResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(int_op(*x, *y))),
        _ => match (as_float(a), as_float(b)) {
            (Some(x), Some(y)) => Ok(Value::Float(float_op(x, y))),
            _ => Err(type_mismatch(op.name(), a, b)),
        },
    }
}

/// Quotient rounded toward negative infinity. Wrapping, so
/// `i64::MIN // -1` yields `i64::MIN` instead of overflowing.
fn floor_div(x: i64, y: i64) -> i64 {
    let q = x.wrapping_div(y);
    if x.wrapping_rem(y) != 0 && (x < 0) != (y < 0) {
        q - 1
    } else {
        q
    }
}

/// Remainder with the divisor's sign. Wrapping, so `i64::MIN % -1`
/// yields 0 instead of overflowing.
fn floor_mod(x: i64, y: i64) -> i64 {
    let r = x.wrapping_rem(y);
    if r != 0 && (r < 0) != (y < 0) {
        r + y
    } else {
        r
    }
}

/// Left shift by `n` bits; negative `n` shifts right (logical). Shifts
/// of 64 or more bits produce zero.
fn shift(x: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((x as u64) << n) as i64
    } else {
        ((x as u64) >> -n) as i64
    }
}

fn ordered(
    op: BinOp,
    a: &Value,
    b: &Value,
    accept: fn(std::cmp::Ordering) -> bool,
) -> RtResult<Value> {
    let ord = match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.as_ref().cmp(y.as_ref()),
        _ => match (as_float(a), as_float(b)) {
            (Some(x), Some(y)) => x
                .partial_cmp(&y)
                .ok_or_else(|| RtError::value_error(format!("{}: unordered values", op.name())))?,
            _ => return Err(type_mismatch(op.name(), a, b)),
        },
    };
    Ok(Value::Bool(accept(ord)))
}

fn concat_part(v: &Value) -> Option<String> {
    match v {
        Value::Str(s) => Some(s.to_string()),
        Value::Int(n) => Some(n.to_string()),
        Value::Float(x) => Some(x.to_string()),
        _ => None,
    }
}

/// Evaluate a value-producing unary operation.
///
/// The non-value sub-ops (identity moves, continuation wrapping, upvalue
/// filling) are executed directly by the continuation loop and never
/// reach this dispatch.
pub fn un(op: UnOp, v: &Value) -> RtResult<Value> {
    match op {
        UnOp::Neg => match v {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(RtError::type_error(format!(
                "neg: expected number, got {}",
                other.type_name()
            ))),
        },
        UnOp::Not => Ok(Value::Bool(!v.truth())),
        UnOp::Truth => Ok(Value::Bool(v.truth())),
        UnOp::BitNot => Ok(Value::Int(!as_int(v, "bnot")?)),
        UnOp::Len => match v {
            Value::Str(s) => Ok(Value::Int(s.len() as i64)),
            Value::Table(t) => Ok(Value::Int(t.len())),
            other => Err(RtError::type_error(format!(
                "len: expected string or table, got {}",
                other.type_name()
            ))),
        },
        UnOp::Id | UnOp::Cont | UnOp::FillUpvalue => Err(RtError::internal(format!(
            "unary op {} is not a value operation",
            op.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    #[test]
    fn test_int_arithmetic_stays_integral() {
        assert!(bin(BinOp::Add, &int(2), &int(3)).unwrap().rill_eq(&int(5)));
        assert!(
            bin(BinOp::Mul, &int(-4), &int(3))
                .unwrap()
                .rill_eq(&int(-12))
        );
    }

    #[test]
    fn test_mixed_arithmetic_floats() {
        let v = bin(BinOp::Add, &int(2), &Value::Float(0.5)).unwrap();
        assert!(v.rill_eq(&Value::Float(2.5)));
    }

    #[test]
    fn test_div_is_always_float() {
        let v = bin(BinOp::Div, &int(7), &int(2)).unwrap();
        assert!(v.rill_eq(&Value::Float(3.5)));
        // Float division by zero is inf, not an error.
        let v = bin(BinOp::Div, &int(1), &int(0)).unwrap();
        assert!(matches!(v, Value::Float(x) if x.is_infinite()));
    }

    #[test]
    fn test_floor_division_and_mod() {
        assert!(
            bin(BinOp::FloorDiv, &int(-7), &int(2))
                .unwrap()
                .rill_eq(&int(-4))
        );
        assert!(bin(BinOp::Mod, &int(-7), &int(2)).unwrap().rill_eq(&int(1)));
        assert!(bin(BinOp::Mod, &int(7), &int(-2)).unwrap().rill_eq(&int(-1)));
        // Integer zero divisors are errors.
        assert!(bin(BinOp::FloorDiv, &int(1), &int(0)).is_err());
        assert!(bin(BinOp::Mod, &int(1), &int(0)).is_err());
    }

    #[test]
    fn test_bitwise_coerces_exact_floats_only() {
        assert!(
            bin(BinOp::BitAnd, &int(6), &Value::Float(3.0))
                .unwrap()
                .rill_eq(&int(2))
        );
        assert!(bin(BinOp::BitAnd, &int(6), &Value::Float(3.5)).is_err());
    }

    #[test]
    fn test_shifts() {
        assert!(bin(BinOp::Shl, &int(1), &int(4)).unwrap().rill_eq(&int(16)));
        assert!(bin(BinOp::Shr, &int(-1), &int(60)).unwrap().rill_eq(&int(15)));
        assert!(bin(BinOp::Shl, &int(1), &int(64)).unwrap().rill_eq(&int(0)));
        // Negative shift counts reverse direction.
        assert!(bin(BinOp::Shr, &int(16), &int(-2)).unwrap().rill_eq(&int(64)));
        // A shift count of i64::MIN wraps on negation and still lands
        // in the out-of-range bucket.
        assert!(
            bin(BinOp::Shr, &int(1), &int(i64::MIN))
                .unwrap()
                .rill_eq(&int(0))
        );
    }

    #[test]
    fn test_floor_division_min_by_negative_one() {
        // The one quotient that overflows i64: it wraps back to MIN,
        // and the matching remainder is zero. Neither may abort.
        assert!(
            bin(BinOp::FloorDiv, &int(i64::MIN), &int(-1))
                .unwrap()
                .rill_eq(&int(i64::MIN))
        );
        assert!(
            bin(BinOp::Mod, &int(i64::MIN), &int(-1))
                .unwrap()
                .rill_eq(&int(0))
        );
    }

    #[test]
    fn test_comparisons() {
        assert!(
            bin(BinOp::Lt, &int(1), &Value::Float(1.5))
                .unwrap()
                .rill_eq(&Value::Bool(true))
        );
        assert!(
            bin(BinOp::Le, &Value::str("abc"), &Value::str("abd"))
                .unwrap()
                .rill_eq(&Value::Bool(true))
        );
        // Mixed number/string ordering is a type error.
        assert!(bin(BinOp::Lt, &int(1), &Value::str("2")).is_err());
    }

    #[test]
    fn test_concat_strings_and_numbers() {
        let v = bin(BinOp::Concat, &Value::str("n = "), &int(4)).unwrap();
        assert!(v.rill_eq(&Value::str("n = 4")));
        assert!(bin(BinOp::Concat, &Value::str("x"), &Value::Nil).is_err());
    }

    #[test]
    fn test_unary_ops() {
        assert!(un(UnOp::Neg, &int(5)).unwrap().rill_eq(&int(-5)));
        assert!(
            un(UnOp::Not, &Value::Nil)
                .unwrap()
                .rill_eq(&Value::Bool(true))
        );
        assert!(un(UnOp::Len, &Value::str("abc")).unwrap().rill_eq(&int(3)));
        assert!(un(UnOp::BitNot, &int(0)).unwrap().rill_eq(&int(-1)));
        assert!(un(UnOp::Neg, &Value::str("x")).is_err());
    }
}
