//! Builtin functions and the `re` module.

use regex::{Captures, Regex};

use super::ast::BinOp;
use super::error::{ErrorKind, EvalError};
use super::methods::{Args, pair_of, sorted};
use super::ops::{binary, dict_insert, set_insert};
use super::value::{MatchData, Value, py_cmp};

/// Callables every fragment can reach without binding them.
pub const BUILTINS: &[&str] = &[
    "print", "len", "range", "str", "int", "float", "bool", "list", "dict", "tuple", "set",
    "sorted", "reversed", "enumerate", "zip", "min", "max", "sum", "abs", "any", "all", "round",
    "repr",
];

/// Upper bound on `range()` materialization.
const MAX_RANGE_LEN: i64 = 1_000_000;

const RE_IGNORECASE: i64 = 2;
const RE_MULTILINE: i64 = 8;
const RE_DOTALL: i64 = 16;

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

fn int_value(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Call a pure builtin. `print` is handled by the interpreter, which owns the output.
pub fn call_builtin(
    name: &str,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
) -> Result<Value, EvalError> {
    let args = Args::new(name, positional, keywords);
    match name {
        "len" => {
            args.check(1, 1)?;
            let len = match args.get(0) {
                Some(Value::Str(s)) => s.chars().count(),
                Some(Value::List(items) | Value::Tuple(items) | Value::Set(items)) => items.len(),
                Some(Value::Dict(pairs)) => pairs.len(),
                Some(other) => {
                    return Err(EvalError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
                None => 0,
            };
            Ok(int_value(len))
        }
        "range" => range(&args),
        "str" => {
            args.check(0, 1)?;
            Ok(Value::Str(
                args.get(0).map(Value::to_display).unwrap_or_default(),
            ))
        }
        "repr" => {
            args.check(1, 1)?;
            Ok(Value::Str(args.get(0).map(Value::repr).unwrap_or_default()))
        }
        "int" => to_int(&args),
        "float" => to_float(&args),
        "bool" => {
            args.check(0, 1)?;
            Ok(Value::Bool(args.get(0).is_some_and(Value::truthy)))
        }
        "list" | "tuple" | "set" => {
            args.check(0, 1)?;
            let items = match args.get(0) {
                Some(v) => v.iterate()?,
                None => Vec::new(),
            };
            Ok(match name {
                "list" => Value::List(items),
                "tuple" => Value::Tuple(items),
                _ => {
                    let mut unique = Vec::with_capacity(items.len());
                    for item in items {
                        set_insert(&mut unique, item);
                    }
                    Value::Set(unique)
                }
            })
        }
        "dict" => {
            args.check(0, 1)?;
            let mut pairs = Vec::new();
            match args.get(0) {
                None => {}
                Some(Value::Dict(existing)) => pairs.clone_from(existing),
                Some(other) => {
                    for item in other.iterate()? {
                        let (k, v) = pair_of(&item)?;
                        dict_insert(&mut pairs, k, v);
                    }
                }
            }
            for (k, v) in args.keywords() {
                dict_insert(&mut pairs, Value::Str(k.clone()), v.clone());
            }
            Ok(Value::Dict(pairs))
        }
        "sorted" => {
            args.check(1, 1)?;
            args.reject_keywords(&["reverse", "key"])?;
            let items = args.get(0).map(Value::iterate).transpose()?.unwrap_or_default();
            Ok(Value::List(sorted(items, &args)?))
        }
        "reversed" => {
            args.check(1, 1)?;
            let mut items = args.get(0).map(Value::iterate).transpose()?.unwrap_or_default();
            items.reverse();
            Ok(Value::List(items))
        }
        "enumerate" => {
            args.check(1, 2)?;
            let start = args.int_at(1, "start")?.unwrap_or(0);
            let items = args.get(0).map(Value::iterate).transpose()?.unwrap_or_default();
            Ok(Value::List(
                items
                    .into_iter()
                    .zip(start..)
                    .map(|(item, i)| Value::Tuple(vec![Value::Int(i), item]))
                    .collect(),
            ))
        }
        "zip" => {
            let columns = args
                .positional()
                .iter()
                .map(Value::iterate)
                .collect::<Result<Vec<_>, _>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::List(
                (0..len)
                    .map(|i| Value::Tuple(columns.iter().map(|col| col[i].clone()).collect()))
                    .collect(),
            ))
        }
        "min" | "max" => extremum(name, &args),
        "sum" => {
            args.check(1, 2)?;
            let mut total = args.arg(1, "start").cloned().unwrap_or(Value::Int(0));
            for item in args.get(0).map(Value::iterate).transpose()?.unwrap_or_default() {
                total = binary(BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        "abs" => {
            args.check(1, 1)?;
            match args.get(0) {
                Some(Value::Int(i)) => i.checked_abs().map(Value::Int).ok_or_else(|| {
                    EvalError::new(ErrorKind::Runtime, "integer overflow".to_string())
                }),
                Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
                Some(Value::Float(f)) => Ok(Value::Float(f.abs())),
                Some(other) => Err(EvalError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
                None => Ok(Value::None),
            }
        }
        "any" | "all" => {
            args.check(1, 1)?;
            let items = args.get(0).map(Value::iterate).transpose()?.unwrap_or_default();
            Ok(Value::Bool(if name == "any" {
                items.iter().any(Value::truthy)
            } else {
                items.iter().all(Value::truthy)
            }))
        }
        "round" => round(&args),
        other => Err(EvalError::unbound_name(other)),
    }
}

fn range(args: &Args) -> Result<Value, EvalError> {
    args.check(1, 3)?;
    let bound = |idx: usize| -> Result<i64, EvalError> {
        args.int_at(idx, "")?.ok_or_else(|| {
            EvalError::type_error("'NoneType' object cannot be interpreted as an integer")
        })
    };
    let (start, stop, step) = match args.len() {
        1 => (0, bound(0)?, 1),
        2 => (bound(0)?, bound(1)?, 1),
        _ => (bound(0)?, bound(1)?, bound(2)?),
    };
    if step == 0 {
        return Err(EvalError::value_error("range() arg 3 must not be zero"));
    }
    let overflow = || EvalError::new(ErrorKind::Runtime, "integer overflow".to_string());
    let span = if step > 0 {
        stop.checked_sub(start)
    } else {
        start.checked_sub(stop)
    }
    .ok_or_else(overflow)?;
    let len = if span <= 0 {
        0
    } else {
        (span - 1) / step.checked_abs().ok_or_else(overflow)? + 1
    };
    if len > MAX_RANGE_LEN {
        return Err(EvalError::new(
            ErrorKind::Runtime,
            format!("range of {len} elements exceeds the limit of {MAX_RANGE_LEN}"),
        ));
    }
    Ok(Value::List(
        (0..len).map(|i| Value::Int(start + i * step)).collect(),
    ))
}

fn to_int(args: &Args) -> Result<Value, EvalError> {
    args.check(0, 2)?;
    let base = args.int_at(1, "base")?;
    match args.get(0) {
        None => Ok(Value::Int(0)),
        Some(Value::Int(i)) => Ok(Value::Int(*i)),
        Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        Some(Value::Float(f)) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Some(Value::Float(_)) => Err(EvalError::value_error(
            "cannot convert float infinity or NaN to integer",
        )),
        Some(Value::Str(s)) => {
            let radix = u32::try_from(base.unwrap_or(10)).unwrap_or(0);
            if !(2..=36).contains(&radix) {
                return Err(EvalError::value_error("int() base must be >= 2 and <= 36"));
            }
            let cleaned = s.trim().replace('_', "");
            i64::from_str_radix(&cleaned, radix)
                .map(Value::Int)
                .map_err(|_| {
                    EvalError::value_error(format!(
                        "invalid literal for int() with base {radix}: {}",
                        Value::Str(s.clone()).repr()
                    ))
                })
        }
        Some(other) => Err(EvalError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(args: &Args) -> Result<Value, EvalError> {
    args.check(0, 1)?;
    match args.get(0) {
        None => Ok(Value::Float(0.0)),
        Some(Value::Float(f)) => Ok(Value::Float(*f)),
        Some(Value::Int(i)) => Ok(Value::Float(*i as f64)),
        Some(Value::Bool(b)) => Ok(Value::Float(f64::from(u8::from(*b)))),
        Some(Value::Str(s)) => {
            let t = s.trim().to_ascii_lowercase();
            let parsed = match t.as_str() {
                "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                "nan" => Some(f64::NAN),
                other => other.parse::<f64>().ok(),
            };
            parsed.map(Value::Float).ok_or_else(|| {
                EvalError::value_error(format!(
                    "could not convert string to float: {}",
                    Value::Str(s.clone()).repr()
                ))
            })
        }
        Some(other) => Err(EvalError::type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn extremum(name: &str, args: &Args) -> Result<Value, EvalError> {
    if args.keyword("key").is_some() {
        return Err(EvalError::type_error("key functions are not supported"));
    }
    let items = match args.positional() {
        [single] => single.iterate()?,
        many => many.to_vec(),
    };
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => {
                let ord = py_cmp(&item, &current)?;
                let better = if name == "min" { ord.is_lt() } else { ord.is_gt() };
                if better { item } else { current }
            }
        });
    }
    match best {
        Some(v) => Ok(v),
        None => args.keyword("default").cloned().ok_or_else(|| {
            EvalError::value_error(format!("{name}() arg is an empty sequence"))
        }),
    }
}

/// Round half to even, as Python does.
fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        r
    }
}

fn round(args: &Args) -> Result<Value, EvalError> {
    args.check(1, 2)?;
    let digits = args.int_at(1, "ndigits")?;
    let value = args.get(0).cloned().unwrap_or(Value::None);
    match (value, digits) {
        (Value::Int(i), _) => Ok(Value::Int(i)),
        (Value::Float(f), None) => Ok(Value::Int(round_half_even(f) as i64)),
        (Value::Float(f), Some(n)) => {
            let scale = 10f64.powi(i32::try_from(n).unwrap_or(0));
            Ok(Value::Float(round_half_even(f * scale) / scale))
        }
        (other, _) => Err(EvalError::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn re_error(message: String) -> EvalError {
    EvalError::new(ErrorKind::Other("re.error".to_string()), message)
}

#[derive(Clone, Copy)]
enum Anchor {
    Search,
    Start,
    Full,
}

fn compile(pattern: &str, flags: i64, anchor: Anchor) -> Result<Regex, EvalError> {
    let mut prefix = String::new();
    if flags & RE_IGNORECASE != 0 {
        prefix.push('i');
    }
    if flags & RE_MULTILINE != 0 {
        prefix.push('m');
    }
    if flags & RE_DOTALL != 0 {
        prefix.push('s');
    }
    let body = match anchor {
        Anchor::Search => pattern.to_string(),
        Anchor::Start => format!(r"\A(?:{pattern})"),
        Anchor::Full => format!(r"\A(?:{pattern})\z"),
    };
    let full = if prefix.is_empty() {
        body
    } else {
        format!("(?{prefix}){body}")
    };
    Regex::new(&full).map_err(|err| re_error(err.to_string()))
}

fn char_offset(hay: &str, byte: usize) -> usize {
    hay[..byte].chars().count()
}

fn match_data(hay: &str, caps: &Captures<'_>) -> Value {
    let (start, end) = caps
        .get(0)
        .map_or((0, 0), |m| (char_offset(hay, m.start()), char_offset(hay, m.end())));
    Value::Match(MatchData {
        groups: caps
            .iter()
            .map(|g| g.map(|m| m.as_str().to_string()))
            .collect(),
        start,
        end,
    })
}

/// Python replacement syntax (`\1`, `\g<name>`) to the regex crate's (`${1}`, `${name}`).
fn translate_replacement(repl: &str) -> String {
    let mut out = String::with_capacity(repl.len());
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut num = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        num.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("${{{num}}}"));
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let name: String = chars.by_ref().take_while(|c| *c != '>').collect();
                        out.push_str(&format!("${{{name}}}"));
                    } else {
                        out.push_str("\\g");
                    }
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                _ => out.push('\\'),
            },
            c => out.push(c),
        }
    }
    out
}

/// Attributes of the `re` module that are not functions.
pub fn re_attribute(attr: &str) -> Option<Value> {
    match attr {
        "I" | "IGNORECASE" => Some(Value::Int(RE_IGNORECASE)),
        "M" | "MULTILINE" => Some(Value::Int(RE_MULTILINE)),
        "S" | "DOTALL" => Some(Value::Int(RE_DOTALL)),
        _ => None,
    }
}

/// Call `re.<func>(...)`.
pub fn call_re(
    func: &str,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
) -> Result<Value, EvalError> {
    let args = Args::new(func, positional, keywords);
    let pattern = args
        .str_at(0, "pattern")?
        .ok_or_else(|| EvalError::type_error(format!("{func}() missing required argument 'pattern'")))?
        .to_string();
    let text_at = |idx: usize| -> Result<String, EvalError> {
        args.str_at(idx, "string")?
            .map(str::to_string)
            .ok_or_else(|| EvalError::type_error(format!("{func}() missing required argument 'string'")))
    };
    match func {
        "search" | "match" | "fullmatch" => {
            args.check(2, 3)?;
            let hay = text_at(1)?;
            let anchor = match func {
                "search" => Anchor::Search,
                "match" => Anchor::Start,
                _ => Anchor::Full,
            };
            let flags = args.int_at(2, "flags")?.unwrap_or(0);
            let re = compile(&pattern, flags, anchor)?;
            Ok(re
                .captures(&hay)
                .map_or(Value::None, |caps| match_data(&hay, &caps)))
        }
        "findall" => {
            args.check(2, 3)?;
            let hay = text_at(1)?;
            let flags = args.int_at(2, "flags")?.unwrap_or(0);
            let re = compile(&pattern, flags, Anchor::Search)?;
            let groups = re.captures_len() - 1;
            let group_text =
                |caps: &Captures<'_>, i: usize| caps.get(i).map_or("", |m| m.as_str()).to_string();
            Ok(Value::List(
                re.captures_iter(&hay)
                    .map(|caps| match groups {
                        0 => Value::Str(group_text(&caps, 0)),
                        1 => Value::Str(group_text(&caps, 1)),
                        n => Value::Tuple(
                            (1..=n).map(|i| Value::Str(group_text(&caps, i))).collect(),
                        ),
                    })
                    .collect(),
            ))
        }
        "sub" => {
            args.check(3, 5)?;
            let repl = args
                .str_at(1, "repl")?
                .map(translate_replacement)
                .ok_or_else(|| EvalError::type_error("sub() repl must be a string"))?;
            let hay = text_at(2)?;
            let count = args.int_at(3, "count")?.unwrap_or(0);
            let flags = args.int_at(4, "flags")?.unwrap_or(0);
            let re = compile(&pattern, flags, Anchor::Search)?;
            let out = if count > 0 {
                re.replacen(&hay, usize::try_from(count).unwrap_or(0), repl.as_str())
            } else {
                re.replace_all(&hay, repl.as_str())
            };
            Ok(Value::Str(out.into_owned()))
        }
        "split" => {
            args.check(2, 4)?;
            let hay = text_at(1)?;
            let maxsplit = args.int_at(2, "maxsplit")?.unwrap_or(0);
            let flags = args.int_at(3, "flags")?.unwrap_or(0);
            let re = compile(&pattern, flags, Anchor::Search)?;
            let parts: Vec<Value> = if maxsplit > 0 {
                re.splitn(&hay, usize::try_from(maxsplit).unwrap_or(0) + 1)
                    .map(|p| Value::Str(p.to_string()))
                    .collect()
            } else {
                re.split(&hay).map(|p| Value::Str(p.to_string())).collect()
            };
            Ok(Value::List(parts))
        }
        other => Err(EvalError::new(
            ErrorKind::Attribute,
            format!("module 're' has no attribute '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    #[test]
    fn range_matches_python_lengths() {
        let out = call_builtin("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)], Vec::new())
            .expect("range");
        assert_eq!(
            out,
            Value::List(vec![Value::Int(5), Value::Int(3), Value::Int(1)])
        );
        let empty = call_builtin("range", vec![Value::Int(0)], Vec::new()).expect("range");
        assert_eq!(empty, Value::List(Vec::new()));
    }

    #[test]
    fn int_parse_failure_is_value_error() {
        let err = call_builtin("int", vec![s("abc")], Vec::new()).expect_err("bad int");
        assert_eq!(
            err.to_string(),
            "ValueError: invalid literal for int() with base 10: 'abc'"
        );
    }

    #[test]
    fn round_uses_bankers_rounding() {
        let out = call_builtin("round", vec![Value::Float(2.5)], Vec::new()).expect("round");
        assert_eq!(out, Value::Int(2));
    }

    #[test]
    fn max_of_empty_sequence_raises() {
        let err = call_builtin("max", vec![Value::List(Vec::new())], Vec::new()).expect_err("empty");
        assert_eq!(err.kind, ErrorKind::Value);
    }

    #[test]
    fn re_search_returns_groups() {
        let m = call_re("search", vec![s(r"(\w+) (\d+)"), s("go to desk 1")], Vec::new())
            .expect("search");
        let Value::Match(data) = m else {
            panic!("expected match");
        };
        assert_eq!(data.groups[1].as_deref(), Some("desk"));
        assert_eq!((data.start, data.end), (6, 12));
    }

    #[test]
    fn re_match_is_anchored_at_start() {
        let out = call_re("match", vec![s("desk"), s("go to desk")], Vec::new()).expect("match");
        assert_eq!(out, Value::None);
    }

    #[test]
    fn re_findall_shapes_follow_group_count() {
        let out = call_re("findall", vec![s(r"(\w+) (\d)"), s("desk 1, shelf 2")], Vec::new())
            .expect("findall");
        assert_eq!(
            out,
            Value::List(vec![
                Value::Tuple(vec![s("desk"), s("1")]),
                Value::Tuple(vec![s("shelf"), s("2")]),
            ])
        );
    }

    #[test]
    fn re_sub_translates_backreferences() {
        let out = call_re("sub", vec![s(r"(\d+)"), s(r"<\1>"), s("desk 12")], Vec::new())
            .expect("sub");
        assert_eq!(out, s("desk <12>"));
    }
}
