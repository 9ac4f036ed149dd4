//! Runtime values of the fragment language.

use std::cmp::Ordering;
use std::fmt::Write as _;

use super::error::{ErrorKind, EvalError};

/// Captured regex match, detached from the haystack it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchData {
    /// Group texts; index 0 is the whole match. Unmatched optional groups are `None`.
    pub groups: Vec<Option<String>>,
    /// Byte offsets of group 0 converted to char offsets.
    pub start: usize,
    pub end: usize,
}

/// A fragment-language value.
///
/// Containers own their elements. Mutation is only visible through the
/// binding that names the container, which is how the interpreter keeps
/// in-place list and dict updates without shared references.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Insertion-ordered key/value pairs.
    Dict(Vec<(Value, Value)>),
    /// Insertion-ordered unique members.
    Set(Vec<Value>),
    Match(MatchData),
    /// A registered callable referenced by name (builtin or primitive).
    Builtin(String),
    /// An imported module (only `re`).
    Module(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        py_eq(self, other)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Match(_) => "re.Match",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Module(_) => "module",
        }
    }

    /// Data values survive into the namespace; callables and modules do not.
    pub fn is_data(&self) -> bool {
        !matches!(self, Value::Builtin(_) | Value::Module(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => !items.is_empty(),
            Value::Dict(pairs) => !pairs.is_empty(),
            Value::Match(_) | Value::Builtin(_) | Value::Module(_) => true,
        }
    }

    /// `str(value)`.
    pub fn to_display(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.repr(),
        }
    }

    /// `repr(value)`.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => quote_str(s),
            Value::List(items) => format!("[{}]", join_repr(items)),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Value::Tuple(items) => format!("({})", join_repr(items)),
            Value::Set(items) if items.is_empty() => "set()".to_string(),
            Value::Set(items) => format!("{{{}}}", join_repr(items)),
            Value::Dict(pairs) => {
                let body = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{body}}}")
            }
            Value::Match(m) => format!(
                "<re.Match object; span=({}, {}), match={}>",
                m.start,
                m.end,
                quote_str(m.groups.first().cloned().flatten().as_deref().unwrap_or(""))
            ),
            Value::Builtin(name) => format!("<built-in function {name}>"),
            Value::Module(name) => format!("<module '{name}'>"),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Materialize an iterable into its elements.
    pub fn iterate(&self) -> Result<Vec<Value>, EvalError> {
        match self {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items.clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Dict(pairs) => Ok(pairs.iter().map(|(k, _)| k.clone()).collect()),
            other => Err(EvalError::new(
                ErrorKind::Type,
                format!("'{}' object is not iterable", other.type_name()),
            )),
        }
    }

    /// Membership test backing `in` / `not in`.
    pub fn contains(&self, needle: &Value) -> Result<bool, EvalError> {
        match self {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                Ok(items.iter().any(|item| py_eq(item, needle)))
            }
            Value::Dict(pairs) => Ok(pairs.iter().any(|(k, _)| py_eq(k, needle))),
            Value::Str(hay) => match needle {
                Value::Str(n) => Ok(hay.contains(n.as_str())),
                other => Err(EvalError::new(
                    ErrorKind::Type,
                    format!(
                        "'in <string>' requires string as left operand, not {}",
                        other.type_name()
                    ),
                )),
            },
            other => Err(EvalError::new(
                ErrorKind::Type,
                format!("argument of type '{}' is not iterable", other.type_name()),
            )),
        }
    }
}

/// Equality with numeric promotion (`1 == 1.0 == True`).
pub fn py_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| py_eq(x, y))
        }
        (Value::Set(a), Value::Set(b)) => {
            a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| py_eq(x, y)))
        }
        (Value::Dict(a), Value::Dict(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| {
                    b.iter()
                        .any(|(k2, v2)| py_eq(k, k2) && py_eq(v, v2))
                })
        }
        (Value::Match(a), Value::Match(b)) => a == b,
        (Value::Builtin(a), Value::Builtin(b)) | (Value::Module(a), Value::Module(b)) => a == b,
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

/// Ordering for `<`, `sorted`, `min`, `max`.
pub fn py_cmp(left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b) {
                let ord = py_cmp(x, y)?;
                if ord != Ordering::Equal {
                    return Ok(ord);
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                EvalError::new(ErrorKind::Value, "cannot order NaN values".to_string())
            }),
            _ => Err(EvalError::new(
                ErrorKind::Type,
                format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ),
            )),
        },
    }
}

pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f.fract() == 0.0 && f.abs() < 1e16 {
        return format!("{f:.1}");
    }
    format!("{f}")
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_matches_python_conventions() {
        assert_eq!(Value::Float(1.0).repr(), "1.0");
        assert_eq!(Value::Float(0.25).repr(), "0.25");
        assert_eq!(Value::Str("it's".into()).repr(), "\"it's\"");
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).repr(), "(1,)");
        assert_eq!(
            Value::Dict(vec![(Value::Str("a".into()), Value::None)]).repr(),
            "{'a': None}"
        );
        assert_eq!(Value::Set(Vec::new()).repr(), "set()");
    }

    #[test]
    fn numeric_equality_promotes() {
        assert!(py_eq(&Value::Int(1), &Value::Float(1.0)));
        assert!(py_eq(&Value::Bool(true), &Value::Int(1)));
        assert!(!py_eq(&Value::Str("1".into()), &Value::Int(1)));
    }

    #[test]
    fn ordering_rejects_mixed_types() {
        let err = py_cmp(&Value::Str("a".into()), &Value::Int(1)).expect_err("mixed");
        assert_eq!(err.kind, ErrorKind::Type);
    }
}
