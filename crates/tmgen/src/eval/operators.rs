//! operator implementations for resolved operands
//!
//! Integer arithmetic that overflows continues as decimal. Division of two integers stays an
//! integer only when there is no remainder.
use super::EvalError;
use crate::ast::{BinaryOperator, UnaryOperator};
use crate::value::Value;
use std::cmp::Ordering;

pub fn unary(operator: UnaryOperator, operand: Value) -> Result<Value, EvalError> {
    match (operator, operand) {
        (UnaryOperator::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (UnaryOperator::Neg, Value::Integer(int)) => Ok(int
            .checked_neg()
            .map_or(Value::Decimal(-(int as f64)), Value::Integer)),
        (UnaryOperator::Neg, Value::Decimal(dec)) => Ok(Value::Decimal(-dec)),
        (operator, operand) => Err(EvalError::UnaryTypeMismatch {
            operator: operator.as_str(),
            operand: operand.type_name(),
        }),
    }
}

pub fn binary(operator: BinaryOperator, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    use BinaryOperator as Op;

    match operator {
        Op::Eq => Ok(Value::Boolean(lhs.loosely_equals(&rhs))),
        Op::NotEq => Ok(Value::Boolean(!lhs.loosely_equals(&rhs))),
        Op::And | Op::Or => match (&lhs, &rhs) {
            (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(if operator == Op::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(mismatch(operator, &lhs, &rhs)),
        },
        Op::Less | Op::LessEq | Op::Greater | Op::GreaterEq => {
            let ordering = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => return Err(mismatch(operator, &lhs, &rhs)),
            };

            let result = match operator {
                Op::Less => ordering == Some(Ordering::Less),
                Op::LessEq => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                Op::Greater => ordering == Some(Ordering::Greater),
                _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            };
            Ok(Value::Boolean(result))
        }
        Op::Plus | Op::Minus | Op::Mul | Op::Div | Op::Mod => arithmetic(operator, lhs, rhs),
    }
}

fn arithmetic(operator: BinaryOperator, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    use BinaryOperator as Op;

    if let (Value::Integer(a), Value::Integer(b)) = (&lhs, &rhs) {
        let (a, b) = (*a, *b);
        let checked = match operator {
            Op::Plus => a.checked_add(b),
            Op::Minus => a.checked_sub(b),
            Op::Mul => a.checked_mul(b),
            Op::Div if b == 0 => return Err(EvalError::DivisionByZero),
            Op::Div => a.checked_rem(b).filter(|rem| *rem == 0).and(a.checked_div(b)),
            Op::Mod if b == 0 => return Err(EvalError::DivisionByZero),
            Op::Mod => a.checked_rem(b),
            _ => unreachable!("not an arithmetic operator"),
        };

        if let Some(int) = checked {
            return Ok(Value::Integer(int));
        }
    }

    let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err(mismatch(operator, &lhs, &rhs));
    };

    let result = match operator {
        Op::Plus => a + b,
        Op::Minus => a - b,
        Op::Mul => a * b,
        Op::Div | Op::Mod if b == 0.0 => return Err(EvalError::DivisionByZero),
        Op::Div => a / b,
        Op::Mod => a % b,
        _ => unreachable!("not an arithmetic operator"),
    };
    Ok(Value::Decimal(result))
}

fn mismatch(operator: BinaryOperator, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::BinaryTypeMismatch {
        operator: operator.as_str(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
}
