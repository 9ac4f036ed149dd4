//! Methods on built-in value types, plus format-spec rendering.

use std::cmp::Ordering;

use super::error::{ErrorKind, EvalError};
use super::ops::{dict_insert, set_insert};
use super::value::{MatchData, Value, format_float, py_cmp, py_eq};

/// Methods that change their receiver; the interpreter writes the receiver back.
pub fn is_mutating(method: &str) -> bool {
    matches!(
        method,
        "append"
            | "extend"
            | "insert"
            | "pop"
            | "popitem"
            | "remove"
            | "sort"
            | "reverse"
            | "clear"
            | "update"
            | "setdefault"
            | "add"
            | "discard"
    )
}

/// Evaluated call arguments with arity and type helpers.
pub(crate) struct Args {
    method: String,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl Args {
    pub(crate) fn new(method: &str, positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            method: method.to_string(),
            positional,
            keywords,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.positional.len()
    }

    pub(crate) fn check(&self, min: usize, max: usize) -> Result<(), EvalError> {
        let given = self.positional.len();
        if given < min {
            return Err(EvalError::type_error(format!(
                "{}() takes at least {min} argument{} ({given} given)",
                self.method,
                if min == 1 { "" } else { "s" }
            )));
        }
        if given > max {
            return Err(EvalError::type_error(format!(
                "{}() takes at most {max} argument{} ({given} given)",
                self.method,
                if max == 1 { "" } else { "s" }
            )));
        }
        Ok(())
    }

    pub(crate) fn get(&self, idx: usize) -> Option<&Value> {
        self.positional.get(idx)
    }

    /// Positional argument `idx`, or keyword `name`.
    pub(crate) fn arg(&self, idx: usize, name: &str) -> Option<&Value> {
        self.positional.get(idx).or_else(|| self.keyword(name))
    }

    pub(crate) fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub(crate) fn keywords(&self) -> &[(String, Value)] {
        &self.keywords
    }

    pub(crate) fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub(crate) fn reject_keywords(&self, allowed: &[&str]) -> Result<(), EvalError> {
        match self
            .keywords
            .iter()
            .find(|(k, _)| !allowed.contains(&k.as_str()))
        {
            Some((k, _)) => Err(EvalError::type_error(format!(
                "{}() got an unexpected keyword argument '{k}'",
                self.method
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn into_positional(self) -> Vec<Value> {
        self.positional
    }

    pub(crate) fn str_at(&self, idx: usize, name: &str) -> Result<Option<&str>, EvalError> {
        match self.arg(idx, name) {
            None | Some(Value::None) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(EvalError::type_error(format!(
                "{}() argument must be str, not {}",
                self.method,
                other.type_name()
            ))),
        }
    }

    pub(crate) fn int_at(&self, idx: usize, name: &str) -> Result<Option<i64>, EvalError> {
        match self.arg(idx, name) {
            None | Some(Value::None) => Ok(None),
            Some(v) => v.as_int().map(Some).ok_or_else(|| {
                EvalError::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            }),
        }
    }
}

fn no_attribute(type_name: &str, method: &str) -> EvalError {
    EvalError::new(
        ErrorKind::Attribute,
        format!("'{type_name}' object has no attribute '{method}'"),
    )
}

/// Call `receiver.method(args)`, mutating the receiver in place where the method does.
pub fn call_method(
    receiver: &mut Value,
    method: &str,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
) -> Result<Value, EvalError> {
    let args = Args::new(method, positional, keywords);
    match receiver {
        Value::Str(s) => str_method(s, method, &args),
        Value::List(items) => list_method(items, method, args),
        Value::Dict(pairs) => dict_method(pairs, method, &args),
        Value::Set(items) => set_method(items, method, &args),
        Value::Tuple(items) => match method {
            "index" | "count" => sequence_search(items, method, &args),
            _ => Err(no_attribute("tuple", method)),
        },
        Value::Match(m) => match_method(m, method, &args),
        other => Err(no_attribute(other.type_name(), method)),
    }
}

fn char_index(s: &str, byte: usize) -> i64 {
    i64::try_from(s[..byte].chars().count()).unwrap_or(i64::MAX)
}

fn count_value(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn prefix_arg(args: &Args) -> Result<Vec<String>, EvalError> {
    match args.get(0) {
        Some(Value::Str(p)) => Ok(vec![p.clone()]),
        Some(Value::Tuple(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    EvalError::type_error("tuple for startswith must only contain str")
                })
            })
            .collect(),
        _ => Err(EvalError::type_error(format!(
            "{}() argument must be str or a tuple of str",
            args.method
        ))),
    }
}

fn split_whitespace_n(s: &str, maxsplit: Option<usize>) -> Vec<Value> {
    let mut out = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit.is_some_and(|m| out.len() >= m) {
            out.push(Value::Str(rest.to_string()));
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        out.push(Value::Str(rest[..end].to_string()));
        rest = rest[end..].trim_start();
    }
    out
}

fn str_method(s: &str, method: &str, args: &Args) -> Result<Value, EvalError> {
    let text = |v: String| -> Result<Value, EvalError> { Ok(Value::Str(v)) };
    match method {
        "lower" => text(s.to_lowercase()),
        "upper" => text(s.to_uppercase()),
        "strip" | "lstrip" | "rstrip" => {
            args.check(0, 1)?;
            let chars: Option<Vec<char>> = args.str_at(0, "chars")?.map(|c| c.chars().collect());
            let pat = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            text(match method {
                "strip" => s.trim_matches(pat).to_string(),
                "lstrip" => s.trim_start_matches(pat).to_string(),
                _ => s.trim_end_matches(pat).to_string(),
            })
        }
        "split" => {
            args.check(0, 2)?;
            args.reject_keywords(&["sep", "maxsplit"])?;
            let sep = args.str_at(0, "sep")?;
            let maxsplit = args
                .int_at(1, "maxsplit")?
                .and_then(|m| usize::try_from(m).ok());
            let parts: Vec<Value> = match sep {
                None => split_whitespace_n(s, maxsplit),
                Some("") => return Err(EvalError::value_error("empty separator")),
                Some(sep) => match maxsplit {
                    Some(m) => s
                        .splitn(m + 1, sep)
                        .map(|p| Value::Str(p.to_string()))
                        .collect(),
                    None => s.split(sep).map(|p| Value::Str(p.to_string())).collect(),
                },
            };
            Ok(Value::List(parts))
        }
        "splitlines" => Ok(Value::List(
            s.lines().map(|l| Value::Str(l.to_string())).collect(),
        )),
        "startswith" | "endswith" => {
            args.check(1, 1)?;
            let prefixes = prefix_arg(args)?;
            let hit = prefixes.iter().any(|p| {
                if method == "startswith" {
                    s.starts_with(p.as_str())
                } else {
                    s.ends_with(p.as_str())
                }
            });
            Ok(Value::Bool(hit))
        }
        "replace" => {
            args.check(2, 3)?;
            let old = args.str_at(0, "old")?.unwrap_or_default();
            let new = args.str_at(1, "new")?.unwrap_or_default();
            match args.int_at(2, "count")? {
                Some(count) if count >= 0 => {
                    text(s.replacen(old, new, usize::try_from(count).unwrap_or(0)))
                }
                _ => text(s.replace(old, new)),
            }
        }
        "find" | "rfind" | "index" => {
            args.check(1, 1)?;
            let sub = args.str_at(0, "sub")?.unwrap_or_default();
            let found = if method == "rfind" {
                s.rfind(sub)
            } else {
                s.find(sub)
            };
            match found {
                Some(byte) => Ok(Value::Int(char_index(s, byte))),
                None if method == "index" => Err(EvalError::value_error("substring not found")),
                None => Ok(Value::Int(-1)),
            }
        }
        "count" => {
            args.check(1, 1)?;
            let sub = args.str_at(0, "sub")?.unwrap_or_default();
            let n = if sub.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(sub).count()
            };
            Ok(count_value(n))
        }
        "join" => {
            args.check(1, 1)?;
            let items = args
                .get(0)
                .map(Value::iterate)
                .transpose()?
                .unwrap_or_default();
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.as_str()),
                    other => {
                        return Err(EvalError::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )));
                    }
                }
            }
            text(parts.join(s))
        }
        "isdigit" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
        )),
        "isalpha" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(char::is_alphabetic),
        )),
        "isalnum" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(char::is_alphanumeric),
        )),
        "isspace" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(char::is_whitespace),
        )),
        "title" => {
            let mut out = String::with_capacity(s.len());
            let mut boundary = true;
            for c in s.chars() {
                if boundary {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                boundary = !c.is_alphabetic();
            }
            text(out)
        }
        "capitalize" => {
            let mut chars = s.chars();
            text(match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            })
        }
        "format" => text(format_template(s, args)?),
        _ => Err(no_attribute("str", method)),
    }
}

/// `"{} {name} {0}".format(...)`.
fn format_template(template: &str, args: &Args) -> Result<String, EvalError> {
    let mut out = String::new();
    let mut auto = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                for f in chars.by_ref() {
                    if f == '}' {
                        break;
                    }
                    field.push(f);
                }
                let (name, spec) = match field.split_once(':') {
                    Some((n, s)) => (n.to_string(), Some(s.to_string())),
                    None => (field, None),
                };
                let value = if name.is_empty() {
                    auto += 1;
                    args.get(auto - 1)
                } else if let Ok(idx) = name.parse::<usize>() {
                    args.get(idx)
                } else {
                    args.keyword(&name)
                };
                let value = value.ok_or_else(|| {
                    EvalError::new(
                        ErrorKind::Index,
                        "Replacement index out of range for positional args tuple".to_string(),
                    )
                })?;
                out.push_str(&format_value(value, spec.as_deref())?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn sort_values(items: &mut [Value]) -> Result<(), EvalError> {
    let mut failure = None;
    items.sort_by(|a, b| match py_cmp(a, b) {
        Ok(ord) => ord,
        Err(err) => {
            failure.get_or_insert(err);
            Ordering::Equal
        }
    });
    failure.map_or(Ok(()), Err)
}

/// Sort honoring `reverse=`; `key=` needs a callable and is refused.
pub(crate) fn sorted(mut items: Vec<Value>, args: &Args) -> Result<Vec<Value>, EvalError> {
    if args.keyword("key").is_some() {
        return Err(EvalError::type_error("key functions are not supported"));
    }
    sort_values(&mut items)?;
    if args.keyword("reverse").is_some_and(Value::truthy) {
        items.reverse();
    }
    Ok(items)
}

fn sequence_search(items: &[Value], method: &str, args: &Args) -> Result<Value, EvalError> {
    args.check(1, 1)?;
    let needle = args.get(0).cloned().unwrap_or(Value::None);
    if method == "count" {
        return Ok(count_value(items.iter().filter(|x| py_eq(x, &needle)).count()));
    }
    items
        .iter()
        .position(|x| py_eq(x, &needle))
        .map(count_value)
        .ok_or_else(|| EvalError::value_error(format!("{} is not in list", needle.repr())))
}

fn list_method(items: &mut Vec<Value>, method: &str, args: Args) -> Result<Value, EvalError> {
    match method {
        "append" => {
            args.check(1, 1)?;
            items.extend(args.into_positional());
            Ok(Value::None)
        }
        "extend" => {
            args.check(1, 1)?;
            if let Some(other) = args.get(0) {
                items.extend(other.iterate()?);
            }
            Ok(Value::None)
        }
        "insert" => {
            args.check(2, 2)?;
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let at = args.int_at(0, "index")?.unwrap_or(0);
            let at = if at < 0 { (at + len).max(0) } else { at.min(len) };
            let value = args.get(1).cloned().unwrap_or(Value::None);
            items.insert(usize::try_from(at).unwrap_or(0), value);
            Ok(Value::None)
        }
        "pop" => {
            args.check(0, 1)?;
            if items.is_empty() {
                return Err(EvalError::new(
                    ErrorKind::Index,
                    "pop from empty list".to_string(),
                ));
            }
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let at = args.int_at(0, "index")?.unwrap_or(-1);
            let idx = if at < 0 { at + len } else { at };
            if idx < 0 || idx >= len {
                return Err(EvalError::new(
                    ErrorKind::Index,
                    "pop index out of range".to_string(),
                ));
            }
            Ok(items.remove(usize::try_from(idx).unwrap_or(0)))
        }
        "remove" => {
            args.check(1, 1)?;
            let needle = args.get(0).cloned().unwrap_or(Value::None);
            match items.iter().position(|x| py_eq(x, &needle)) {
                Some(idx) => {
                    items.remove(idx);
                    Ok(Value::None)
                }
                None => Err(EvalError::value_error("list.remove(x): x not in list")),
            }
        }
        "index" | "count" => sequence_search(items, method, &args),
        "sort" => {
            args.check(0, 0)?;
            args.reject_keywords(&["reverse", "key"])?;
            *items = sorted(items.clone(), &args)?;
            Ok(Value::None)
        }
        "reverse" => {
            items.reverse();
            Ok(Value::None)
        }
        "copy" => Ok(Value::List(items.clone())),
        "clear" => {
            items.clear();
            Ok(Value::None)
        }
        _ => Err(no_attribute("list", method)),
    }
}

fn key_error(key: &Value) -> EvalError {
    EvalError::new(ErrorKind::Key, key.repr())
}

fn position_of(pairs: &[(Value, Value)], key: &Value) -> Option<usize> {
    pairs.iter().position(|(k, _)| py_eq(k, key))
}

fn dict_method(
    pairs: &mut Vec<(Value, Value)>,
    method: &str,
    args: &Args,
) -> Result<Value, EvalError> {
    match method {
        "get" => {
            args.check(1, 2)?;
            let key = args.get(0).cloned().unwrap_or(Value::None);
            Ok(match position_of(pairs, &key) {
                Some(idx) => pairs[idx].1.clone(),
                None => args.get(1).cloned().unwrap_or(Value::None),
            })
        }
        "keys" => Ok(Value::List(pairs.iter().map(|(k, _)| k.clone()).collect())),
        "values" => Ok(Value::List(pairs.iter().map(|(_, v)| v.clone()).collect())),
        "items" => Ok(Value::List(
            pairs
                .iter()
                .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        "pop" => {
            args.check(1, 2)?;
            let key = args.get(0).cloned().unwrap_or(Value::None);
            match position_of(pairs, &key) {
                Some(idx) => Ok(pairs.remove(idx).1),
                None => args.get(1).cloned().ok_or_else(|| key_error(&key)),
            }
        }
        "popitem" => pairs
            .pop()
            .map(|(k, v)| Value::Tuple(vec![k, v]))
            .ok_or_else(|| {
                EvalError::new(
                    ErrorKind::Key,
                    "'popitem(): dictionary is empty'".to_string(),
                )
            }),
        "setdefault" => {
            args.check(1, 2)?;
            let key = args.get(0).cloned().unwrap_or(Value::None);
            match position_of(pairs, &key) {
                Some(idx) => Ok(pairs[idx].1.clone()),
                None => {
                    let default = args.get(1).cloned().unwrap_or(Value::None);
                    pairs.push((key, default.clone()));
                    Ok(default)
                }
            }
        }
        "update" => {
            args.check(0, 1)?;
            match args.get(0) {
                None => {}
                Some(Value::Dict(other)) => {
                    for (k, v) in other {
                        dict_insert(pairs, k.clone(), v.clone());
                    }
                }
                Some(other) => {
                    for item in other.iterate()? {
                        let (k, v) = pair_of(&item)?;
                        dict_insert(pairs, k, v);
                    }
                }
            }
            for (k, v) in args.keywords() {
                dict_insert(pairs, Value::Str(k.clone()), v.clone());
            }
            Ok(Value::None)
        }
        "copy" => Ok(Value::Dict(pairs.clone())),
        "clear" => {
            pairs.clear();
            Ok(Value::None)
        }
        _ => Err(no_attribute("dict", method)),
    }
}

/// Unpack a two-element sequence into a key/value pair.
pub(crate) fn pair_of(item: &Value) -> Result<(Value, Value), EvalError> {
    let parts = item.iterate()?;
    match <[Value; 2]>::try_from(parts) {
        Ok([k, v]) => Ok((k, v)),
        Err(parts) => Err(EvalError::value_error(format!(
            "dictionary update sequence element has length {}; 2 is required",
            parts.len()
        ))),
    }
}

fn set_operands(args: &Args) -> Result<Vec<Value>, EvalError> {
    let mut all = Vec::new();
    for arg in args.positional() {
        all.extend(arg.iterate()?);
    }
    Ok(all)
}

fn set_method(items: &mut Vec<Value>, method: &str, args: &Args) -> Result<Value, EvalError> {
    let member = args.get(0).cloned().unwrap_or(Value::None);
    match method {
        "add" => {
            args.check(1, 1)?;
            set_insert(items, member);
            Ok(Value::None)
        }
        "discard" | "remove" => {
            args.check(1, 1)?;
            match items.iter().position(|x| py_eq(x, &member)) {
                Some(idx) => {
                    items.remove(idx);
                    Ok(Value::None)
                }
                None if method == "remove" => Err(key_error(&member)),
                None => Ok(Value::None),
            }
        }
        "update" => {
            for value in set_operands(args)? {
                set_insert(items, value);
            }
            Ok(Value::None)
        }
        "union" => {
            let mut out = items.clone();
            for value in set_operands(args)? {
                set_insert(&mut out, value);
            }
            Ok(Value::Set(out))
        }
        "intersection" | "difference" => {
            let other = set_operands(args)?;
            let keep = method == "intersection";
            Ok(Value::Set(
                items
                    .iter()
                    .filter(|x| other.iter().any(|y| py_eq(x, y)) == keep)
                    .cloned()
                    .collect(),
            ))
        }
        "issubset" => {
            let other = set_operands(args)?;
            Ok(Value::Bool(
                items.iter().all(|x| other.iter().any(|y| py_eq(x, y))),
            ))
        }
        "pop" => {
            if items.is_empty() {
                return Err(EvalError::new(
                    ErrorKind::Key,
                    "'pop from an empty set'".to_string(),
                ));
            }
            Ok(items.remove(0))
        }
        "copy" => Ok(Value::Set(items.clone())),
        "clear" => {
            items.clear();
            Ok(Value::None)
        }
        _ => Err(no_attribute("set", method)),
    }
}

fn match_group(m: &MatchData, idx: &Value) -> Result<Value, EvalError> {
    let i = idx
        .as_int()
        .and_then(|i| usize::try_from(i).ok())
        .filter(|i| *i < m.groups.len())
        .ok_or_else(|| EvalError::new(ErrorKind::Index, "no such group".to_string()))?;
    Ok(m.groups[i].clone().map_or(Value::None, Value::Str))
}

fn match_method(m: &MatchData, method: &str, args: &Args) -> Result<Value, EvalError> {
    match method {
        "group" => match args.positional() {
            [] => match_group(m, &Value::Int(0)),
            [idx] => match_group(m, idx),
            many => Ok(Value::Tuple(
                many.iter()
                    .map(|idx| match_group(m, idx))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
        },
        "groups" => Ok(Value::Tuple(
            m.groups
                .iter()
                .skip(1)
                .map(|g| g.clone().map_or(Value::None, Value::Str))
                .collect(),
        )),
        "start" => Ok(count_value(m.start)),
        "end" => Ok(count_value(m.end)),
        "span" => Ok(Value::Tuple(vec![count_value(m.start), count_value(m.end)])),
        _ => Err(no_attribute("re.Match", method)),
    }
}

/// Widths and precisions beyond this are rejected rather than rendered.
const MAX_FORMAT_DIGITS: usize = 1 << 20;

fn push_digit(acc: usize, digit: u32) -> Result<usize, EvalError> {
    acc.checked_mul(10)
        .and_then(|acc| acc.checked_add(digit as usize))
        .filter(|&n| n <= MAX_FORMAT_DIGITS)
        .ok_or_else(|| EvalError::value_error("Too many decimal digits in format string"))
}

/// Render a value with a format spec (`{value:>8.2f}`).
pub fn format_value(value: &Value, spec: Option<&str>) -> Result<String, EvalError> {
    let Some(spec) = spec.filter(|s| !s.is_empty()) else {
        return Ok(value.to_display());
    };
    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;
    let mut fill = ' ';
    let mut align = None;
    if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
        fill = chars[0];
        align = Some(chars[1]);
        i = 2;
    } else if matches!(chars.first(), Some('<' | '>' | '^')) {
        align = chars.first().copied();
        i = 1;
    }
    let plus = chars.get(i) == Some(&'+');
    if plus {
        i += 1;
    }
    let zero = chars.get(i) == Some(&'0');
    if zero {
        i += 1;
    }
    let mut width = 0usize;
    while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
        width = push_digit(width, d)?;
        i += 1;
    }
    let thousands = chars.get(i) == Some(&',');
    if thousands {
        i += 1;
    }
    let mut precision = None;
    if chars.get(i) == Some(&'.') {
        i += 1;
        let mut p = 0usize;
        while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
            p = push_digit(p, d)?;
            i += 1;
        }
        precision = Some(p);
    }
    let kind = chars.get(i).copied();
    if i + usize::from(kind.is_some()) != chars.len() {
        return Err(EvalError::value_error(format!(
            "Invalid format specifier '{spec}'"
        )));
    }

    let numeric = matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_));
    let float_kind = matches!(kind, Some('f' | 'F' | '%'))
        || (kind.is_none() && precision.is_some() && matches!(value, Value::Float(_)));
    let mut body = if float_kind {
        let f = match value {
            Value::Float(f) => *f,
            other => other.as_int().map(|i| i as f64).ok_or_else(|| {
                EvalError::value_error(format!(
                    "Unknown format code for object of type '{}'",
                    other.type_name()
                ))
            })?,
        };
        let p = precision.unwrap_or(6);
        if kind == Some('%') {
            format!("{:.*}%", p, f * 100.0)
        } else {
            format!("{f:.p$}")
        }
    } else {
        match (kind, value) {
            (Some('d'), v) => v.as_int().map(|n| n.to_string()).ok_or_else(|| {
                EvalError::value_error(format!(
                    "Unknown format code 'd' for object of type '{}'",
                    v.type_name()
                ))
            })?,
            (Some('s') | None, Value::Str(s)) => match precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.clone(),
            },
            (None, Value::Float(f)) => format_float(*f),
            (None | Some('s'), v) => v.to_display(),
            (Some(other), v) => {
                return Err(EvalError::value_error(format!(
                    "Unknown format code '{other}' for object of type '{}'",
                    v.type_name()
                )));
            }
        }
    };
    if thousands {
        body = group_thousands(&body);
    }
    if plus && numeric && !body.starts_with('-') {
        body.insert(0, '+');
    }
    let len = body.chars().count();
    if len >= width {
        return Ok(body);
    }
    let pad = width - len;
    if zero && align.is_none() && numeric {
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+')) => (c.to_string(), body[1..].to_string()),
            _ => (String::new(), body.clone()),
        };
        return Ok(format!("{sign}{}{digits}", "0".repeat(pad)));
    }
    let fill_str = |n: usize| fill.to_string().repeat(n);
    Ok(match align.unwrap_or(if numeric { '>' } else { '<' }) {
        '>' => format!("{}{body}", fill_str(pad)),
        '^' => format!("{}{body}{}", fill_str(pad / 2), fill_str(pad - pad / 2)),
        _ => format!("{body}{}", fill_str(pad)),
    })
}

fn group_thousands(body: &str) -> String {
    let (sign, rest) = body.strip_prefix('-').map_or(("", body), |r| ("-", r));
    let (int_part, frac) = rest
        .split_once('.')
        .map_or((rest, None), |(a, b)| (a, Some(b)));
    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }
    match frac {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}
