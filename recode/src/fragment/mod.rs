//! The fragment language: a small Python-like subset that expanded code is written in.
//!
//! Fragments are parsed by [`parse_program`] and run by an [`Evaluator`] against a
//! persistent [`Namespace`]. The only effectful call is the environment primitive,
//! injected as a [`Primitive`]. Evaluation never panics on bad input: every failure
//! is reported through [`Outcome`].

pub mod ast;
mod builtins;
pub mod error;
mod interp;
pub mod lexer;
mod methods;
mod ops;
pub mod parser;
pub mod value;

use std::collections::BTreeMap;

use tracing::debug;

pub use ast::contains_definition;
pub use error::{ErrorKind, EvalError, ParseError, ParseErrorKind};
pub use methods::format_value;
pub use parser::{parse_expression, parse_program};
pub use value::Value;

use interp::Interpreter;

/// Module name that fragments may import and use without importing.
const REGEX_MODULE: &str = "re";

/// Variables that persist across fragment evaluations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace {
    vars: BTreeMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Failure reported by the environment primitive, surfaced to the fragment as an
/// exception of the given kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PrimitiveError {
    pub kind: String,
    pub message: String,
}

impl PrimitiveError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// The single effectful callable available to fragments.
pub trait Primitive {
    fn perform(&mut self, action: &str) -> Result<String, PrimitiveError>;
}

impl<F> Primitive for F
where
    F: FnMut(&str) -> Result<String, PrimitiveError>,
{
    fn perform(&mut self, action: &str) -> Result<String, PrimitiveError> {
        self(action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Evaluation stopped at a call to a function nobody has defined yet.
    Stub {
        name: String,
    },
    Error {
        message: String,
    },
}

impl Outcome {
    /// Text shown to the model and stored on the node; empty on success.
    pub fn error_text(&self) -> String {
        match self {
            Outcome::Success => String::new(),
            Outcome::Stub { name } => format!("NeedExpansion: `{name}` needs to be expanded."),
            Outcome::Error { message } => message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub outcome: Outcome,
    /// Non-empty printed lines, trimmed, in order.
    pub output: Vec<String>,
    /// Actions passed to the primitive, in order.
    pub actions: Vec<String>,
}

impl Evaluation {
    pub fn success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn error_text(&self) -> String {
        self.outcome.error_text()
    }
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    primitive_name: String,
    max_loop_iterations: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new("run", 10_000)
    }
}

impl Evaluator {
    pub fn new(primitive_name: impl Into<String>, max_loop_iterations: usize) -> Self {
        Self {
            primitive_name: primitive_name.into(),
            max_loop_iterations,
        }
    }

    pub fn primitive_name(&self) -> &str {
        &self.primitive_name
    }

    /// Names that resolve without being bound: builtins, the primitive, and `re`.
    pub fn is_registered(&self, name: &str) -> bool {
        name == self.primitive_name || name == REGEX_MODULE || builtins::is_builtin(name)
    }

    /// Run `code` against `namespace`. New variables are written back only when the
    /// whole fragment succeeds; a failed fragment leaves the namespace untouched.
    pub fn evaluate(
        &self,
        code: &str,
        namespace: &mut Namespace,
        primitive: &mut dyn Primitive,
    ) -> Evaluation {
        let program = match parse_program(code) {
            Ok(program) => program,
            Err(err) => {
                return Evaluation {
                    outcome: Outcome::Error {
                        message: EvalError::from(err).to_string(),
                    },
                    output: Vec::new(),
                    actions: Vec::new(),
                };
            }
        };

        let mut interpreter = Interpreter::new(
            namespace.vars.clone(),
            &self.primitive_name,
            primitive,
            self.max_loop_iterations,
        );
        let result = interpreter.run(&program);
        let (scope, raw_output, actions) = interpreter.into_parts();

        let outcome = match result {
            Ok(()) => {
                for (name, value) in scope {
                    if name.starts_with('_') || self.is_registered(&name) || !value.is_data() {
                        continue;
                    }
                    namespace.vars.insert(name, value);
                }
                Outcome::Success
            }
            Err(err) => classify(code, err),
        };
        let output = raw_output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        debug!(outcome = ?outcome, actions = actions.len(), "fragment evaluated");
        Evaluation {
            outcome,
            output,
            actions,
        }
    }
}

fn classify(code: &str, err: EvalError) -> Outcome {
    if let Some(name) = &err.unbound {
        if appears_called(code, name) {
            return Outcome::Stub { name: name.clone() };
        }
    }
    Outcome::Error {
        message: err.to_string(),
    }
}

/// Whether `name(` occurs as a bare call, not as a method or a longer identifier.
fn appears_called(code: &str, name: &str) -> bool {
    let needle = format!("{name}(");
    code.match_indices(&needle).any(|(idx, _)| {
        code[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_' || c == '.'))
    })
}
