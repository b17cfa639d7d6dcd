//! Host-side constant folding.
//!
//! Subtrees made only of constants are evaluated once before compilation.
//! Calls flagged as SQL functions are left to the server, as is anything
//! whose host result could differ from PostgreSQL's (NULL propagation,
//! overflow, division by zero, collation-dependent ordering).

use std::cmp::Ordering;

use rust_decimal::Decimal;

use super::dsl::names;
use super::node::{BinaryOp, Call, Expr, UnaryOp};
use crate::types::{PgValue, Typed, ValueType};

/// Folds every constant subtree of `expr`.
pub(crate) fn fold(expr: &Expr) -> Expr {
    match expr {
        Expr::Unary { op, operand } => {
            let operand = fold(operand);
            if let Expr::Constant(value) = &operand {
                if let Some(folded) = eval_unary(op, value) {
                    return Expr::Constant(folded);
                }
            }
            Expr::unary(op.clone(), operand)
        }
        Expr::Binary { op, left, right } => {
            let (left, right) = (fold(left), fold(right));
            if let (Expr::Constant(l), Expr::Constant(r)) = (&left, &right) {
                if let Some(folded) = eval_binary(*op, l, r) {
                    return Expr::Constant(folded);
                }
            }
            Expr::binary(*op, left, right)
        }
        Expr::Call(call) => {
            let folded = Call {
                name: call.name.clone(),
                receiver: call.receiver.as_ref().map(|r| Box::new(fold(r))),
                args: call.args.iter().map(fold).collect(),
                sql_function: call.sql_function,
            };
            if !folded.sql_function {
                if let Some(value) = eval_call(&folded) {
                    return Expr::Constant(value);
                }
            }
            Expr::Call(folded)
        }
        other => other.clone(),
    }
}

fn typed(value: PgValue, ty: ValueType) -> Typed {
    Typed { value, ty }
}

fn boolean(b: bool) -> Typed {
    typed(PgValue::Bool(b), ValueType::Boolean)
}

fn eval_unary(op: &UnaryOp, operand: &Typed) -> Option<Typed> {
    match (op, &operand.value) {
        (UnaryOp::Not, PgValue::Bool(b)) => Some(boolean(!b)),
        (UnaryOp::ArrayLength, PgValue::Array(items)) => i32::try_from(items.len())
            .ok()
            .map(|n| typed(PgValue::Int(n), ValueType::Integer)),
        _ => None,
    }
}

fn integer(value: &PgValue) -> Option<i64> {
    match value {
        PgValue::Int(n) => Some(i64::from(*n)),
        PgValue::BigInt(n) => Some(*n),
        _ => None,
    }
}

fn float(value: &PgValue) -> Option<f64> {
    match value {
        PgValue::Float(f) => Some(f64::from(*f)),
        PgValue::Double(f) => Some(*f),
        _ => integer(value).map(|n| n as f64),
    }
}

fn decimal(value: &PgValue) -> Option<Decimal> {
    match value {
        PgValue::Decimal(d) => Some(*d),
        _ => integer(value).map(Decimal::from),
    }
}

fn compare(op: BinaryOp, ordering: Ordering) -> Option<Typed> {
    let result = match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Lte => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Gte => ordering != Ordering::Less,
        _ => return None,
    };
    Some(boolean(result))
}

fn eval_binary(op: BinaryOp, left: &Typed, right: &Typed) -> Option<Typed> {
    let (l, r) = (&left.value, &right.value);
    if l.is_null() || r.is_null() {
        return None;
    }
    match (l, r) {
        (PgValue::Bool(a), PgValue::Bool(b)) => match op {
            BinaryOp::And => Some(boolean(*a && *b)),
            BinaryOp::Or => Some(boolean(*a || *b)),
            BinaryOp::Eq => Some(boolean(a == b)),
            BinaryOp::NotEq => Some(boolean(a != b)),
            _ => None,
        },
        (PgValue::Int(_) | PgValue::BigInt(_), PgValue::Int(_) | PgValue::BigInt(_)) => {
            let (a, b) = (integer(l)?, integer(r)?);
            if op.is_comparison() {
                return compare(op, a.cmp(&b));
            }
            let result = match op {
                BinaryOp::Add => a.checked_add(b)?,
                BinaryOp::Sub => a.checked_sub(b)?,
                BinaryOp::Mul => a.checked_mul(b)?,
                BinaryOp::Div => a.checked_div(b)?,
                _ => return None,
            };
            if matches!((l, r), (PgValue::Int(_), PgValue::Int(_))) {
                let narrow = i32::try_from(result).ok()?;
                Some(typed(PgValue::Int(narrow), ValueType::Integer))
            } else {
                Some(typed(PgValue::BigInt(result), ValueType::Integer64))
            }
        }
        (PgValue::Decimal(_), _) | (_, PgValue::Decimal(_)) => {
            let (a, b) = (decimal(l)?, decimal(r)?);
            if op.is_comparison() {
                return compare(op, a.cmp(&b));
            }
            // Division is left to the server.
            let result = match op {
                BinaryOp::Add => a.checked_add(b)?,
                BinaryOp::Sub => a.checked_sub(b)?,
                BinaryOp::Mul => a.checked_mul(b)?,
                _ => return None,
            };
            Some(typed(PgValue::Decimal(result), ValueType::Decimal))
        }
        (
            PgValue::Float(_) | PgValue::Double(_),
            PgValue::Float(_) | PgValue::Double(_) | PgValue::Int(_) | PgValue::BigInt(_),
        )
        | (PgValue::Int(_) | PgValue::BigInt(_), PgValue::Float(_) | PgValue::Double(_)) => {
            let (a, b) = (float(l)?, float(r)?);
            if op.is_comparison() {
                return compare(op, a.partial_cmp(&b)?);
            }
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div if b != 0.0 => a / b,
                _ => return None,
            };
            result
                .is_finite()
                .then(|| typed(PgValue::Double(result), ValueType::Double))
        }
        (PgValue::Text(a), PgValue::Text(b)) => match op {
            BinaryOp::Add => Some(typed(PgValue::Text(format!("{a}{b}")), ValueType::String)),
            BinaryOp::Eq => Some(boolean(a == b)),
            BinaryOp::NotEq => Some(boolean(a != b)),
            _ => None,
        },
        _ if left.ty == right.ty && !left.ty.is_json() => match op {
            BinaryOp::Eq => Some(boolean(l == r)),
            BinaryOp::NotEq => Some(boolean(l != r)),
            _ => None,
        },
        _ => None,
    }
}

fn text(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Constant(Typed {
            value: PgValue::Text(s),
            ..
        }) => Some(s),
        _ => None,
    }
}

fn eval_call(call: &Call) -> Option<Typed> {
    let receiver = call.receiver.as_deref()?;
    let subject = text(receiver)?;
    match (&*call.name, call.args.as_slice()) {
        (names::TO_UPPER, []) => Some(typed(
            PgValue::Text(subject.to_uppercase()),
            ValueType::String,
        )),
        (names::TO_LOWER, []) => Some(typed(
            PgValue::Text(subject.to_lowercase()),
            ValueType::String,
        )),
        (names::LENGTH, []) => i32::try_from(subject.chars().count())
            .ok()
            .map(|n| typed(PgValue::Int(n), ValueType::Integer)),
        (names::STARTS_WITH, [arg]) => Some(boolean(subject.starts_with(text(arg)?))),
        (names::ENDS_WITH, [arg]) => Some(boolean(subject.ends_with(text(arg)?))),
        (names::CONTAINS, [arg]) => Some(boolean(subject.contains(text(arg)?))),
        _ => None,
    }
}
