//! Arithmetic and ordering on values.
//!
//! Numbers fall into three families: int, uint and float. A float on either
//! side promotes the other side to float. Mixed int and uint converts the
//! right operand to the left operand's family, failing if it does not fit.
//! Integer arithmetic is checked; overflow and division by zero are errors.

use std::cmp::Ordering;

use crate::ast::{AdditiveOp, MultiplicativeOp, NumericComparativeOp};
use crate::error::{RuntimeError, RuntimeReason};
use crate::value::Value;

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Uint(u64),
    Float(f64),
}

fn num(value: &Value) -> Option<Num> {
    match value {
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Uint(u) => Some(Num::Uint(*u)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

fn invalid(left: &Value, op: &str, right: &Value) -> RuntimeError {
    RuntimeError::new(
        RuntimeReason::InvalidOperation,
        format!(
            "invalid operation: {} {op} {}",
            left.type_name(),
            right.type_name()
        ),
    )
}

fn overflow(op: ArithOp) -> RuntimeError {
    RuntimeError::new(
        RuntimeReason::InvalidOperation,
        format!("integer overflow in {}", op.symbol()),
    )
}

/// Binary `+` and `-`.
pub fn additive(op: AdditiveOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (op, left) {
        (AdditiveOp::Add, Value::String(s)) => Ok(Value::String(format!("{s}{right}"))),
        (AdditiveOp::Add, Value::Bytes(b)) => Ok(Value::String(format!(
            "{}{right}",
            String::from_utf8_lossy(b)
        ))),
        (AdditiveOp::Add, _) => arithmetic(ArithOp::Add, left, right),
        (AdditiveOp::Sub, _) => arithmetic(ArithOp::Sub, left, right),
    }
}

/// `*`, `/` and `%`.
pub fn multiplicative(
    op: MultiplicativeOp,
    left: &Value,
    right: &Value,
) -> Result<Value, RuntimeError> {
    let op = match op {
        MultiplicativeOp::Mul => ArithOp::Mul,
        MultiplicativeOp::Div => ArithOp::Div,
        MultiplicativeOp::Mod => ArithOp::Mod,
    };
    arithmetic(op, left, right)
}

/// Unary `+x` and `-x`.
pub fn unary(op: AdditiveOp, operand: &Value) -> Result<Value, RuntimeError> {
    let bad = || {
        RuntimeError::new(
            RuntimeReason::InvalidOperation,
            format!("invalid operation: {op}{}", operand.type_name()),
        )
    };
    let n = num(operand).ok_or_else(bad)?;
    match (op, n) {
        (AdditiveOp::Add, _) => Ok(operand.clone()),
        (AdditiveOp::Sub, Num::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| overflow(ArithOp::Sub)),
        (AdditiveOp::Sub, Num::Uint(u)) => i64::try_from(u)
            .ok()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(|| overflow(ArithOp::Sub)),
        (AdditiveOp::Sub, Num::Float(f)) => Ok(Value::Float(-f)),
    }
}

fn arithmetic(op: ArithOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let (Some(l), Some(r)) = (num(left), num(right)) else {
        return Err(invalid(left, op.symbol(), right));
    };

    // An integer modulo a float floors the float first.
    let r = match (op, l, r) {
        (ArithOp::Mod, Num::Int(_), Num::Float(f)) => Num::Int(float_to_i64(f.floor(), op)?),
        (ArithOp::Mod, Num::Uint(_), Num::Float(f)) => Num::Uint(float_to_u64(f.floor(), op)?),
        _ => r,
    };

    match (l, r) {
        (Num::Float(_), _) | (_, Num::Float(_)) => {
            Ok(Value::Float(float_op(op, as_f64(l), as_f64(r))))
        }
        (Num::Int(a), Num::Int(b)) => int_op(op, a, b).map(Value::Int),
        (Num::Int(a), Num::Uint(b)) => {
            let b = i64::try_from(b).map_err(|_| out_of_range(b, "int"))?;
            int_op(op, a, b).map(Value::Int)
        }
        (Num::Uint(a), Num::Uint(b)) => uint_op(op, a, b).map(Value::Uint),
        (Num::Uint(a), Num::Int(b)) => {
            let b = u64::try_from(b).map_err(|_| out_of_range(b, "uint"))?;
            uint_op(op, a, b).map(Value::Uint)
        }
    }
}

fn out_of_range(value: impl std::fmt::Display, family: &str) -> RuntimeError {
    RuntimeError::new(
        RuntimeReason::InvalidOperation,
        format!("value {value} out of range for {family}"),
    )
}

fn float_to_i64(f: f64, op: ArithOp) -> Result<i64, RuntimeError> {
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Ok(f as i64)
    } else {
        Err(overflow(op))
    }
}

fn float_to_u64(f: f64, op: ArithOp) -> Result<u64, RuntimeError> {
    if !f.is_finite() {
        Err(overflow(op))
    } else if f >= 0.0 && f < u64::MAX as f64 {
        Ok(f as u64)
    } else {
        Err(out_of_range(f, "uint"))
    }
}

fn as_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Uint(u) => u as f64,
        Num::Float(f) => f,
    }
}

fn float_op(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Mod => a % b,
    }
}

fn division_by_zero() -> RuntimeError {
    RuntimeError::new(RuntimeReason::DivisionByZero, "integer divide by zero")
}

fn int_op(op: ArithOp, a: i64, b: i64) -> Result<i64, RuntimeError> {
    if b == 0 && matches!(op, ArithOp::Div | ArithOp::Mod) {
        return Err(division_by_zero());
    }
    let result = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => a.checked_div(b),
        ArithOp::Mod => a.checked_rem(b),
    };
    result.ok_or_else(|| overflow(op))
}

fn uint_op(op: ArithOp, a: u64, b: u64) -> Result<u64, RuntimeError> {
    if b == 0 && matches!(op, ArithOp::Div | ArithOp::Mod) {
        return Err(division_by_zero());
    }
    let result = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => a.checked_div(b),
        ArithOp::Mod => a.checked_rem(b),
    };
    result.ok_or_else(|| overflow(op))
}

/// `>`, `>=`, `<`, `<=` on numbers or strings.
pub fn compare(
    op: NumericComparativeOp,
    left: &Value,
    right: &Value,
) -> Result<bool, RuntimeError> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (num(left), num(right)) {
            (Some(a), Some(b)) => order(a, b),
            _ => {
                return Err(RuntimeError::new(
                    RuntimeReason::InvalidOperation,
                    format!(
                        "cannot compare {} and {}",
                        left.type_name(),
                        right.type_name()
                    ),
                ))
            }
        },
    };
    // NaN compares false against everything.
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        NumericComparativeOp::Gt => ordering == Ordering::Greater,
        NumericComparativeOp::Ge => ordering != Ordering::Less,
        NumericComparativeOp::Lt => ordering == Ordering::Less,
        NumericComparativeOp::Le => ordering != Ordering::Greater,
    })
}

fn order(a: Num, b: Num) -> Option<Ordering> {
    match (a, b) {
        (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
        (Num::Uint(a), Num::Uint(b)) => Some(a.cmp(&b)),
        (Num::Int(a), Num::Uint(b)) => Some(i128::from(a).cmp(&i128::from(b))),
        (Num::Uint(a), Num::Int(b)) => Some(i128::from(a).cmp(&i128::from(b))),
        _ => as_f64(a).partial_cmp(&as_f64(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn float_promotion() {
        let v = multiplicative(MultiplicativeOp::Mul, &Value::Int(4), &Value::Float(1.25)).unwrap();
        assert!(matches!(v, Value::Float(f) if f == 5.0));
    }

    #[test]
    fn integer_division_truncates() {
        let v = multiplicative(MultiplicativeOp::Div, &Value::Int(5), &Value::Int(2)).unwrap();
        assert!(matches!(v, Value::Int(2)));
    }

    #[rstest]
    #[case(MultiplicativeOp::Div)]
    #[case(MultiplicativeOp::Mod)]
    fn integer_zero_divisor_fails(#[case] op: MultiplicativeOp) {
        let err = multiplicative(op, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.reason, RuntimeReason::DivisionByZero);
    }

    #[test]
    fn int_mod_floors_float_divisor() {
        let v = multiplicative(MultiplicativeOp::Mod, &Value::Int(7), &Value::Float(2.9)).unwrap();
        assert!(matches!(v, Value::Int(1)));
    }

    #[test]
    fn string_concatenation() {
        let v = additive(AdditiveOp::Add, &Value::from("n="), &Value::Int(3)).unwrap();
        assert_eq!(v, Value::from("n=3"));
        let err = additive(AdditiveOp::Sub, &Value::from("a"), &Value::from("b")).unwrap_err();
        assert_eq!(err.reason, RuntimeReason::InvalidOperation);
    }

    #[test]
    fn mixed_families_convert_right_operand() {
        let v = additive(AdditiveOp::Add, &Value::Uint(2), &Value::Int(3)).unwrap();
        assert!(matches!(v, Value::Uint(5)));
        assert!(additive(AdditiveOp::Add, &Value::Uint(2), &Value::Int(-3)).is_err());
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(additive(AdditiveOp::Add, &Value::Int(i64::MAX), &Value::Int(1)).is_err());
        assert!(unary(AdditiveOp::Sub, &Value::Int(i64::MIN)).is_err());
    }

    #[rstest]
    #[case(Value::Int(-1), Value::Uint(0), NumericComparativeOp::Lt, true)]
    #[case(Value::Float(2.5), Value::Int(2), NumericComparativeOp::Gt, true)]
    #[case(Value::from("abc"), Value::from("abd"), NumericComparativeOp::Le, true)]
    #[case(Value::Float(f64::NAN), Value::Int(0), NumericComparativeOp::Ge, false)]
    fn comparisons(
        #[case] left: Value,
        #[case] right: Value,
        #[case] op: NumericComparativeOp,
        #[case] expected: bool,
    ) {
        assert_eq!(compare(op, &left, &right).unwrap(), expected);
    }

    #[test]
    fn comparing_unrelated_kinds_fails() {
        assert!(compare(NumericComparativeOp::Lt, &Value::Int(1), &Value::from("1")).is_err());
    }
}
