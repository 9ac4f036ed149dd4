//! Variables a stub call depends on, rendered for the expansion prompt.

use crate::fragment::ast::{Expr, Stmt, StmtKind, UnaryOp};
use crate::fragment::{Namespace, ParseError, Value, parse_program};

/// Deepest nesting level whose containers still get element labels.
const MAX_LABEL_DEPTH: usize = 2;
/// Entries sampled when labelling a container.
const LABEL_SAMPLE: usize = 5;

/// Names the stub call in `code` passes to its callee.
///
/// Looks at the first call held by a top-level assignment or expression
/// statement, falling back to the first call anywhere. Positional arguments and
/// keyword values that are plain names are collected; keyword values that are
/// literals are bound into `namespace` under the keyword's name.
pub fn discover_variables(code: &str, namespace: &mut Namespace) -> Result<Vec<String>, ParseError> {
    let program = parse_program(code)?;
    let Some(call) = first_call(&program) else {
        return Ok(Vec::new());
    };
    let Expr::Call { args, kwargs, .. } = call else {
        return Ok(Vec::new());
    };

    let mut names: Vec<String> = Vec::new();
    for arg in args {
        if let Expr::Name(name) = arg {
            push_unique(&mut names, name);
        }
    }
    for (keyword, value) in kwargs {
        if let Some(literal) = literal_value(value) {
            namespace.insert(keyword.clone(), literal);
            push_unique(&mut names, keyword);
        } else if let Expr::Name(name) = value {
            push_unique(&mut names, name);
        }
    }
    Ok(names)
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

fn first_call(program: &[Stmt]) -> Option<&Expr> {
    for stmt in program {
        let candidate = match &stmt.kind {
            StmtKind::Assign { value, .. } => value,
            StmtKind::Expr(expr) => expr,
            _ => continue,
        };
        if matches!(candidate, Expr::Call { .. }) {
            return Some(candidate);
        }
    }

    let mut found: Option<&Expr> = None;
    for stmt in program {
        stmt.walk(&mut |s| {
            for expr in s.own_exprs() {
                expr.walk(&mut |e| {
                    if found.is_none() && matches!(e, Expr::Call { .. }) {
                        found = Some(e);
                    }
                });
            }
        });
        if found.is_some() {
            break;
        }
    }
    found
}

/// Value of a literal expression (constants and containers of constants).
/// `None` literals count as absent.
fn literal_value(expr: &Expr) -> Option<Value> {
    let value = literal_inner(expr)?;
    (value != Value::None).then_some(value)
}

fn literal_inner(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Const(value) => Some(value.clone()),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match literal_inner(operand)? {
            Value::Int(i) => i.checked_neg().map(Value::Int),
            Value::Float(f) => Some(Value::Float(-f)),
            _ => None,
        },
        Expr::List(items) => items.iter().map(literal_inner).collect::<Option<_>>().map(Value::List),
        Expr::Tuple(items) => items.iter().map(literal_inner).collect::<Option<_>>().map(Value::Tuple),
        Expr::Set(items) => items.iter().map(literal_inner).collect::<Option<_>>().map(Value::Set),
        Expr::Dict(pairs) => pairs
            .iter()
            .map(|(k, v)| Some((literal_inner(k)?, literal_inner(v)?)))
            .collect::<Option<_>>()
            .map(Value::Dict),
        _ => None,
    }
}

/// `- name (type): value` per variable; unbound names render as `None`.
pub fn render_variables(names: &[String], namespace: &Namespace) -> String {
    names
        .iter()
        .map(|name| {
            let value = namespace.get(name).cloned().unwrap_or(Value::None);
            format!("- {name} ({}): {}", type_label(&value), value.to_display())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Type label such as `list[str]` or `dict[str, int]`.
pub fn type_label(value: &Value) -> String {
    label_at(value, 0)
}

fn label_at(value: &Value, depth: usize) -> String {
    let bare = value.type_name().to_string();
    if depth > MAX_LABEL_DEPTH {
        return bare;
    }
    match value {
        Value::List(items) | Value::Set(items) => {
            let labels: Vec<String> = items
                .iter()
                .take(LABEL_SAMPLE)
                .map(|item| label_at(item, depth + 1))
                .collect();
            match uniform(&labels) {
                Some(label) => format!("{bare}[{label}]"),
                None => bare,
            }
        }
        Value::Tuple(items) => {
            if items.is_empty() {
                return bare;
            }
            let labels: Vec<String> = items
                .iter()
                .take(LABEL_SAMPLE)
                .map(|item| label_at(item, depth + 1))
                .collect();
            match uniform(&labels) {
                Some(label) => format!("tuple[{label}]"),
                None => format!("tuple[{}]", labels.join(", ")),
            }
        }
        Value::Dict(pairs) => {
            let sample = &pairs[..pairs.len().min(LABEL_SAMPLE)];
            let keys: Vec<String> = sample.iter().map(|(k, _)| label_at(k, depth + 1)).collect();
            let values: Vec<String> = sample.iter().map(|(_, v)| label_at(v, depth + 1)).collect();
            match (uniform(&keys), uniform(&values)) {
                (Some(k), Some(v)) => format!("dict[{k}, {v}]"),
                _ => bare,
            }
        }
        _ => bare,
    }
}

/// The shared label when every entry agrees; `None` for empty or mixed input.
fn uniform(labels: &[String]) -> Option<&str> {
    let first = labels.first()?;
    labels
        .iter()
        .all(|label| label == first)
        .then_some(first.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::Str(s.to_string())).collect())
    }

    #[test]
    fn collects_positional_names_from_first_call() {
        let mut ns = Namespace::new();
        ns.insert("obj", Value::Str("apple".to_string()));
        ns.insert("locations", strs(&["cabinet 1", "table 1"]));
        let names = discover_variables("found = find_and_take(obj, locations)\nput(found)", &mut ns)
            .expect("discover");
        assert_eq!(names, vec!["obj", "locations"]);
        assert_eq!(
            render_variables(&names, &ns),
            "- obj (str): apple\n- locations (list[str]): ['cabinet 1', 'table 1']"
        );
    }

    #[test]
    fn literal_keywords_are_bound() {
        let mut ns = Namespace::new();
        let names = discover_variables("clean(target, place='sinkbasin 1', times=2)", &mut ns)
            .expect("discover");
        assert_eq!(names, vec!["target", "place", "times"]);
        assert_eq!(ns.get("place"), Some(&Value::Str("sinkbasin 1".to_string())));
        assert_eq!(ns.get("times"), Some(&Value::Int(2)));
        assert!(render_variables(&names, &ns).starts_with("- target (NoneType): None"));
    }

    #[test]
    fn falls_back_to_nested_call() {
        let mut ns = Namespace::new();
        let names = discover_variables("for x in items:\n    handle(x, budget)", &mut ns)
            .expect("discover");
        assert_eq!(names, vec!["x", "budget"]);
    }

    #[test]
    fn code_without_calls_has_no_variables() {
        let mut ns = Namespace::new();
        assert!(discover_variables("x = 1", &mut ns).expect("discover").is_empty());
    }

    #[test]
    fn labels_follow_element_types() {
        assert_eq!(type_label(&Value::Int(1)), "int");
        assert_eq!(type_label(&Value::None), "NoneType");
        assert_eq!(type_label(&strs(&["a", "b"])), "list[str]");
        assert_eq!(
            type_label(&Value::List(vec![Value::Int(1), Value::Str("a".into())])),
            "list"
        );
        assert_eq!(type_label(&Value::List(Vec::new())), "list");
        assert_eq!(
            type_label(&Value::Tuple(vec![Value::Str("a".into()), Value::Int(1)])),
            "tuple[str, int]"
        );
        assert_eq!(
            type_label(&Value::Dict(vec![(Value::Str("k".into()), Value::Float(1.5))])),
            "dict[str, float]"
        );
    }

    #[test]
    fn labels_stop_below_the_third_level() {
        let nested = Value::List(vec![Value::List(vec![strs(&["deep"])])]);
        assert_eq!(type_label(&nested), "list[list[list[str]]]");
        let deeper = Value::List(vec![nested]);
        assert_eq!(type_label(&deeper), "list[list[list[list]]]");
    }

    #[test]
    fn tuples_and_dicts_sample_their_first_entries() {
        let mut items: Vec<Value> = (0..5).map(Value::Int).collect();
        items.push(Value::Str("tail".into()));
        assert_eq!(type_label(&Value::Tuple(items)), "tuple[int]");

        let mut mixed: Vec<Value> = vec![Value::Str("a".into())];
        mixed.extend((0..6).map(Value::Int));
        assert_eq!(
            type_label(&Value::Tuple(mixed)),
            "tuple[str, int, int, int, int]"
        );

        let mut pairs: Vec<(Value, Value)> = (0..5)
            .map(|i| (Value::Str(format!("k{i}")), Value::Int(i)))
            .collect();
        pairs.push((Value::Int(9), Value::None));
        assert_eq!(type_label(&Value::Dict(pairs)), "dict[str, int]");
    }
}
