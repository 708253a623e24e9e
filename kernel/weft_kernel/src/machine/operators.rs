//! Arithmetic, comparison and logical operators.
//!
//! Operands arrive resolved (no top-level cells). Equality goes through
//! entailment and can still suspend on a cell nested inside a record.

use std::cmp::Ordering;

use crate::errors::{KernelError, Signal};
use crate::instr::BinaryOp;
use crate::value::{Entailable, Value};

#[inline]
fn checked_arith(result: Option<i64>, op_name: &'static str) -> Result<Value, Signal> {
    result
        .map(Value::Int)
        .ok_or_else(|| KernelError::Overflow(op_name).into())
}

#[inline]
fn checked_div(
    divisor: i64,
    op: impl FnOnce() -> Option<i64>,
    op_name: &'static str,
) -> Result<Value, Signal> {
    if divisor == 0 {
        Err(KernelError::DivisionByZero.into())
    } else {
        checked_arith(op(), op_name)
    }
}

fn ordering_result(op: BinaryOp, ordering: Option<Ordering>) -> Option<Value> {
    let ordering = ordering?;
    let holds = match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => return None,
    };
    Some(Value::Bool(holds))
}

/// Evaluate a binary operation.
pub(super) fn evaluate_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Signal> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left.entails(right)?)),
        BinaryOp::Ne => return Ok(Value::Bool(!left.entails(right)?)),
        _ => {}
    }
    let mismatch = || -> Signal {
        KernelError::TypeMismatch {
            op: op.symbol(),
            found: format!("{} and {}", left.type_name(), right.type_name()),
        }
        .into()
    };
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => eval_int_binary(op, *a, *b).ok_or_else(mismatch)?,
        (Value::Float(a), Value::Float(b)) => eval_float_binary(op, *a, *b).ok_or_else(mismatch),
        (Value::Str(a), Value::Str(b)) => match op {
            BinaryOp::Add => Ok(Value::Str(format!("{a}{b}").into())),
            _ => ordering_result(op, Some(a.cmp(b))).ok_or_else(mismatch),
        },
        (Value::Char(a), Value::Char(b)) => {
            ordering_result(op, Some(a.cmp(b))).ok_or_else(mismatch)
        }
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinaryOp::And => Ok(Value::Bool(*a && *b)),
            BinaryOp::Or => Ok(Value::Bool(*a || *b)),
            _ => Err(mismatch()),
        },
        _ => Err(mismatch()),
    }
}

fn eval_int_binary(op: BinaryOp, a: i64, b: i64) -> Option<Result<Value, Signal>> {
    Some(match op {
        BinaryOp::Add => checked_arith(a.checked_add(b), "addition"),
        BinaryOp::Sub => checked_arith(a.checked_sub(b), "subtraction"),
        BinaryOp::Mul => checked_arith(a.checked_mul(b), "multiplication"),
        BinaryOp::Div => checked_div(b, || a.checked_div(b), "division"),
        BinaryOp::Mod => checked_div(b, || a.checked_rem(b), "remainder"),
        _ => return ordering_result(op, Some(a.cmp(&b))).map(Ok),
    })
}

fn eval_float_binary(op: BinaryOp, a: f64, b: f64) -> Option<Value> {
    match op {
        BinaryOp::Add => Some(Value::Float(a + b)),
        BinaryOp::Sub => Some(Value::Float(a - b)),
        BinaryOp::Mul => Some(Value::Float(a * b)),
        BinaryOp::Div => Some(Value::Float(a / b)),
        BinaryOp::Mod => Some(Value::Float(a % b)),
        _ => ordering_result(op, a.partial_cmp(&b)),
    }
}

pub(super) fn evaluate_negate(arg: &Value) -> Result<Value, Signal> {
    match arg {
        Value::Int(n) => checked_arith(n.checked_neg(), "negation"),
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(KernelError::type_mismatch("-", other).into()),
    }
}

pub(super) fn evaluate_not(arg: &Value) -> Result<Value, Signal> {
    match arg {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        other => Err(KernelError::NotBoolean(other.to_string()).into()),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn int_arithmetic() {
        assert_eq!(
            evaluate_binary(BinaryOp::Add, &Value::Int(2), &Value::Int(3)).unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            evaluate_binary(BinaryOp::Mod, &Value::Int(7), &Value::Int(4)).unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn overflow_and_zero_division() {
        assert!(matches!(
            evaluate_binary(BinaryOp::Add, &Value::Int(i64::MAX), &Value::Int(1)),
            Err(Signal::Error(KernelError::Overflow("addition")))
        ));
        assert!(matches!(
            evaluate_binary(BinaryOp::Div, &Value::Int(1), &Value::Int(0)),
            Err(Signal::Error(KernelError::DivisionByZero))
        ));
    }

    #[test]
    fn comparisons() {
        assert_eq!(
            evaluate_binary(BinaryOp::Le, &Value::Int(3), &Value::Int(3)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            evaluate_binary(BinaryOp::Gt, &Value::str("b"), &Value::str("a")).unwrap(),
            Value::Bool(true)
        );
        assert!(
            evaluate_binary(BinaryOp::Lt, &Value::Float(f64::NAN), &Value::Float(1.0)).is_err()
        );
    }

    #[test]
    fn string_concat() {
        assert_eq!(
            evaluate_binary(BinaryOp::Add, &Value::str("we"), &Value::str("ft")).unwrap(),
            Value::str("weft")
        );
    }

    #[test]
    fn mixed_types_mismatch() {
        assert!(matches!(
            evaluate_binary(BinaryOp::Add, &Value::Int(1), &Value::Float(1.0)),
            Err(Signal::Error(KernelError::TypeMismatch { op: "+", .. }))
        ));
    }

    #[test]
    fn not_requires_boolean() {
        assert!(matches!(
            evaluate_not(&Value::Int(0)),
            Err(Signal::Error(KernelError::NotBoolean(_)))
        ));
    }
}
