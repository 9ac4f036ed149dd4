//! Operators and item access.

use super::ast::{BinOp, CmpOp};
use super::error::{ErrorKind, EvalError};
use super::value::{Value, py_cmp, py_eq};

enum Num {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numbers(left: &Value, right: &Value) -> Option<Num> {
    let as_int = |v: &Value| match v {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    };
    let as_float = |v: &Value| match v {
        Value::Float(f) => Some(*f),
        other => as_int(other).map(|i| i as f64),
    };
    match (as_int(left), as_int(right)) {
        (Some(a), Some(b)) => Some(Num::Ints(a, b)),
        _ => Some(Num::Floats(as_float(left)?, as_float(right)?)),
    }
}

fn overflow() -> EvalError {
    EvalError::new(ErrorKind::Runtime, "integer overflow".to_string())
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> EvalError {
    EvalError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn repeat(items: &[Value], times: i64) -> Vec<Value> {
    let times = usize::try_from(times).unwrap_or(0);
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    out
}

pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{a}{b}"))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List(a.iter().chain(b).cloned().collect()));
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            return Ok(Value::Tuple(a.iter().chain(b).cloned().collect()));
        }
        (BinOp::Sub, Value::Set(a), Value::Set(b)) => {
            return Ok(Value::Set(
                a.iter()
                    .filter(|x| !b.iter().any(|y| py_eq(x, y)))
                    .cloned()
                    .collect(),
            ));
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            return Ok(Value::Str(s.repeat(usize::try_from(*n).unwrap_or(0))));
        }
        (BinOp::Mul, Value::List(items), Value::Int(n))
        | (BinOp::Mul, Value::Int(n), Value::List(items)) => {
            return Ok(Value::List(repeat(items, *n)));
        }
        (BinOp::Mul, Value::Tuple(items), Value::Int(n))
        | (BinOp::Mul, Value::Int(n), Value::Tuple(items)) => {
            return Ok(Value::Tuple(repeat(items, *n)));
        }
        _ => {}
    }

    let Some(nums) = numbers(left, right) else {
        return Err(unsupported(op, left, right));
    };
    match nums {
        Num::Ints(a, b) => int_op(op, a, b),
        Num::Floats(a, b) => float_op(op, a, b),
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value, EvalError> {
    let zero = || {
        EvalError::new(
            ErrorKind::ZeroDivision,
            "integer division or modulo by zero".to_string(),
        )
    };
    let value = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => return float_op(op, a as f64, b as f64),
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero());
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero());
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
        }
        BinOp::Pow => {
            if b < 0 {
                return float_op(op, a as f64, b as f64);
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Value::Int(value))
}

fn float_op(op: BinOp, a: f64, b: f64) -> Result<Value, EvalError> {
    let zero = |what: &str| EvalError::new(ErrorKind::ZeroDivision, what.to_string());
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(zero("division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(zero("float modulo"));
            }
            a - b * (a / b).floor()
        }
        BinOp::Pow => a.powf(b),
    };
    Ok(Value::Float(value))
}

pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    use std::cmp::Ordering;
    Ok(match op {
        CmpOp::Eq => py_eq(left, right),
        CmpOp::NotEq => !py_eq(left, right),
        CmpOp::Lt => py_cmp(left, right)? == Ordering::Less,
        CmpOp::LtE => py_cmp(left, right)? != Ordering::Greater,
        CmpOp::Gt => py_cmp(left, right)? == Ordering::Greater,
        CmpOp::GtE => py_cmp(left, right)? != Ordering::Less,
        CmpOp::In => right.contains(left)?,
        CmpOp::NotIn => !right.contains(left)?,
        CmpOp::Is => left.type_name() == right.type_name() && py_eq(left, right),
        CmpOp::IsNot => !(left.type_name() == right.type_name() && py_eq(left, right)),
    })
}

fn index_of(len: usize, key: &Value, what: &str) -> Result<usize, EvalError> {
    let Some(i) = key.as_int() else {
        return Err(EvalError::type_error(format!(
            "{what} indices must be integers or slices, not {}",
            key.type_name()
        )));
    };
    let len = i64::try_from(len).map_err(|_| overflow())?;
    let idx = if i < 0 { i + len } else { i };
    if idx < 0 || idx >= len {
        return Err(EvalError::new(
            ErrorKind::Index,
            format!("{what} index out of range"),
        ));
    }
    usize::try_from(idx).map_err(|_| overflow())
}

pub fn get_item(container: &Value, key: &Value) -> Result<Value, EvalError> {
    match container {
        Value::List(items) => Ok(items[index_of(items.len(), key, "list")?].clone()),
        Value::Tuple(items) => Ok(items[index_of(items.len(), key, "tuple")?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = index_of(chars.len(), key, "string")?;
            Ok(Value::Str(chars[idx].to_string()))
        }
        Value::Dict(pairs) => pairs
            .iter()
            .find(|(k, _)| py_eq(k, key))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| EvalError::new(ErrorKind::Key, key.repr())),
        Value::Match(m) => {
            let idx = index_of(m.groups.len(), key, "group")?;
            Ok(m.groups[idx].clone().map_or(Value::None, Value::Str))
        }
        other => Err(EvalError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn slice_bound(value: Option<Value>) -> Result<Option<i64>, EvalError> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(v) => v.as_int().map(Some).ok_or_else(|| {
            EvalError::type_error(
                "slice indices must be integers or None or have an __index__ method",
            )
        }),
    }
}

/// Positions selected by `[lower:upper:step]` on a sequence of `len` items.
fn slice_positions(len: usize, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let mut out = Vec::new();
    if step > 0 {
        let clamp = |x: i64| {
            let x = if x < 0 { (x + len).max(0) } else { x };
            x.min(len)
        };
        let mut i = lower.map_or(0, clamp);
        let stop = upper.map_or(len, clamp);
        while i < stop {
            out.extend(usize::try_from(i).ok());
            i += step;
        }
    } else {
        let clamp = |x: i64| {
            let x = if x < 0 { (x + len).max(-1) } else { x };
            x.min(len - 1)
        };
        let mut i = lower.map_or(len - 1, clamp);
        let stop = upper.map_or(-1, clamp);
        while i > stop {
            out.extend(usize::try_from(i).ok());
            i += step;
        }
    }
    out
}

pub fn slice(
    container: &Value,
    lower: Option<Value>,
    upper: Option<Value>,
    step: Option<Value>,
) -> Result<Value, EvalError> {
    let lower = slice_bound(lower)?;
    let upper = slice_bound(upper)?;
    let step = slice_bound(step)?.unwrap_or(1);
    if step == 0 {
        return Err(EvalError::value_error("slice step cannot be zero"));
    }
    match container {
        Value::List(items) => Ok(Value::List(
            slice_positions(items.len(), lower, upper, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect(),
        )),
        Value::Tuple(items) => Ok(Value::Tuple(
            slice_positions(items.len(), lower, upper, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect(),
        )),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(
                slice_positions(chars.len(), lower, upper, step)
                    .into_iter()
                    .map(|i| chars[i])
                    .collect(),
            ))
        }
        other => Err(EvalError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Mutable reference to an existing element.
pub fn item_mut<'v>(container: &'v mut Value, key: &Value) -> Result<&'v mut Value, EvalError> {
    match container {
        Value::List(items) => {
            let idx = index_of(items.len(), key, "list")?;
            Ok(&mut items[idx])
        }
        Value::Dict(pairs) => pairs
            .iter_mut()
            .find(|(k, _)| py_eq(k, key))
            .map(|(_, v)| v)
            .ok_or_else(|| EvalError::new(ErrorKind::Key, key.repr())),
        other => Err(EvalError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `container[key] = value`, inserting new dict keys.
pub fn set_item(container: &mut Value, key: Value, value: Value) -> Result<(), EvalError> {
    match container {
        Value::List(items) => {
            let idx = index_of(items.len(), &key, "list assignment")?;
            items[idx] = value;
            Ok(())
        }
        Value::Dict(pairs) => {
            dict_insert(pairs, key, value);
            Ok(())
        }
        other => Err(EvalError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

pub fn dict_insert(pairs: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    if let Some(slot) = pairs.iter_mut().find(|(k, _)| py_eq(k, &key)) {
        slot.1 = value;
    } else {
        pairs.push((key, value));
    }
}

pub fn set_insert(items: &mut Vec<Value>, value: Value) {
    if !items.iter().any(|x| py_eq(x, &value)) {
        items.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(
            binary(BinOp::FloorDiv, &Value::Int(-7), &Value::Int(2)).expect("div"),
            Value::Int(-4)
        );
        assert_eq!(
            binary(BinOp::Mod, &Value::Int(-7), &Value::Int(2)).expect("mod"),
            Value::Int(1)
        );
    }

    #[test]
    fn true_division_by_zero_raises() {
        let err = binary(BinOp::Div, &Value::Int(1), &Value::Int(0)).expect_err("zero");
        assert_eq!(err.kind, ErrorKind::ZeroDivision);
    }

    #[test]
    fn slices_handle_negative_steps() {
        let list = Value::List((0..5).map(Value::Int).collect());
        let rev = slice(&list, None, None, Some(Value::Int(-1))).expect("slice");
        assert_eq!(rev, Value::List((0..5).rev().map(Value::Int).collect()));
        let tail = slice(&list, Some(Value::Int(-2)), None, None).expect("slice");
        assert_eq!(tail, Value::List(vec![Value::Int(3), Value::Int(4)]));
    }

    #[test]
    fn missing_dict_key_is_key_error() {
        let err = get_item(&Value::Dict(Vec::new()), &Value::Str("a".into())).expect_err("key");
        assert_eq!(err.to_string(), "KeyError: 'a'");
    }
}
