//! Arithmetic, comparison, and equality semantics for `Value`.
//!
//! Widening rule throughout: `I32` op `I32` stays `I32`; any other numeric
//! combination widens both operands to `F32`. Anything involving a
//! non-numeric operand in an arithmetic/ordering position is a fatal type
//! error.

use super::RuntimeError;
use crate::value::Value;

fn as_f32(value: Value) -> Option<f32> {
    match value {
        Value::I32(i) => Some(i as f32),
        Value::F32(f) => Some(f),
        _ => None,
    }
}

fn numeric_binop(
    lhs: Value,
    rhs: Value,
    op: &'static str,
    int_op: fn(i32, i32) -> i32,
    float_op: fn(f32, f32) -> f32,
) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::I32(a), Value::I32(b)) => Ok(Value::I32(int_op(a, b))),
        (a, b) => {
            let (Some(a), Some(b)) = (as_f32(a), as_f32(b)) else {
                let bad = if as_f32(a).is_none() { a } else { b };
                return Err(RuntimeError::TypeError {
                    op,
                    type_name: bad.type_name(),
                });
            };
            Ok(Value::F32(float_op(a, b)))
        }
    }
}

pub fn add(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    numeric_binop(lhs, rhs, "add", i32::wrapping_add, |a, b| a + b)
}

pub fn sub(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    numeric_binop(lhs, rhs, "sub", i32::wrapping_sub, |a, b| a - b)
}

pub fn mul(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    numeric_binop(lhs, rhs, "mul", i32::wrapping_mul, |a, b| a * b)
}

pub fn div(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    if let (Value::I32(_), Value::I32(0)) = (lhs, rhs) {
        return Err(RuntimeError::DivisionByZero);
    }
    numeric_binop(lhs, rhs, "div", i32::wrapping_div, |a, b| a / b)
}

/// Integer modulo only. The source leaves a non-`I32` operand or a zero
/// divisor unchecked (undefined behavior in C); there is no undefined
/// behavior available in safe Rust, so both become a catchable fatal
/// error here instead of a process-level panic.
pub fn rem(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::I32(_), Value::I32(0)) => Err(RuntimeError::DivisionByZero),
        (Value::I32(a), Value::I32(b)) => Ok(Value::I32(a.wrapping_rem(b))),
        (Value::I32(_), other) => Err(RuntimeError::TypeError {
            op: "mod",
            type_name: other.type_name(),
        }),
        (other, _) => Err(RuntimeError::TypeError {
            op: "mod",
            type_name: other.type_name(),
        }),
    }
}

pub fn neg(value: Value) -> Result<Value, RuntimeError> {
    match value {
        Value::I32(i) => Ok(Value::I32(i.wrapping_neg())),
        Value::F32(f) => Ok(Value::F32(-f)),
        other => Err(RuntimeError::TypeError {
            op: "neg",
            type_name: other.type_name(),
        }),
    }
}

fn compare(lhs: Value, rhs: Value, op: &'static str) -> Result<std::cmp::Ordering, RuntimeError> {
    match (lhs, rhs) {
        (Value::I32(a), Value::I32(b)) => Ok(a.cmp(&b)),
        (a, b) => {
            let (Some(a), Some(b)) = (as_f32(a), as_f32(b)) else {
                let bad = if as_f32(a).is_none() { a } else { b };
                return Err(RuntimeError::TypeError {
                    op,
                    type_name: bad.type_name(),
                });
            };
            a.partial_cmp(&b).ok_or(RuntimeError::TypeError {
                op,
                type_name: "f32 (NaN)",
            })
        }
    }
}

pub fn lt(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(compare(lhs, rhs, "lt")? == std::cmp::Ordering::Less))
}

pub fn le(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(compare(lhs, rhs, "le")? != std::cmp::Ordering::Greater))
}

pub fn gt(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(compare(lhs, rhs, "gt")? == std::cmp::Ordering::Greater))
}

pub fn ge(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(compare(lhs, rhs, "ge")? != std::cmp::Ordering::Less))
}

/// Structural equality: numeric/bool/none compare by value (no implicit
/// int/float equality across tags); heap references compare by identity.
/// Never fails — mismatched tags are simply unequal.
pub fn values_equal(lhs: Value, rhs: Value) -> bool {
    match (lhs, rhs) {
        (Value::I32(a), Value::I32(b)) => a == b,
        (Value::F32(a), Value::F32(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::None, Value::None) => true,
        (Value::Array(a), Value::Array(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Closure(a), Value::Closure(b)) => a == b,
        (Value::Native(a), Value::Native(b)) => a == b,
        (Value::Iter(a), Value::Iter(b)) => a == b,
        _ => false,
    }
}

pub fn eq(lhs: Value, rhs: Value) -> Value {
    Value::Bool(values_equal(lhs, rhs))
}

pub fn ne(lhs: Value, rhs: Value) -> Value {
    Value::Bool(!values_equal(lhs, rhs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_ops_stay_int() {
        assert!(matches!(add(Value::I32(2), Value::I32(3)).unwrap(), Value::I32(5)));
    }

    #[test]
    fn mixed_numeric_widens_to_float() {
        assert!(matches!(add(Value::I32(2), Value::F32(0.5)).unwrap(), Value::F32(x) if x == 2.5));
    }

    #[test]
    fn no_implicit_int_float_equality() {
        assert!(!values_equal(Value::I32(1), Value::F32(1.0)));
    }

    #[test]
    fn mod_by_zero_is_a_catchable_error_not_a_panic() {
        assert!(matches!(rem(Value::I32(1), Value::I32(0)), Err(RuntimeError::DivisionByZero)));
    }

    #[test]
    fn div_by_zero_is_a_catchable_error_not_a_panic() {
        assert!(matches!(div(Value::I32(1), Value::I32(0)), Err(RuntimeError::DivisionByZero)));
    }

    #[test]
    fn float_div_by_zero_produces_infinity() {
        assert!(matches!(div(Value::F32(1.0), Value::F32(0.0)).unwrap(), Value::F32(x) if x.is_infinite()));
    }
}
