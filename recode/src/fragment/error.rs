//! Error types for the fragment language.

use std::fmt;

use thiserror::Error;

/// Exception kind raised while evaluating a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Name,
    Type,
    Value,
    Key,
    Index,
    Attribute,
    ZeroDivision,
    Assertion,
    Runtime,
    Syntax,
    ModuleNotFound,
    /// Raised by the environment behind the primitive (`StepLimitError`, ...)
    /// or by a user `raise` of an unknown kind.
    Other(String),
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::Name => "NameError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Value => "ValueError",
            ErrorKind::Key => "KeyError",
            ErrorKind::Index => "IndexError",
            ErrorKind::Attribute => "AttributeError",
            ErrorKind::ZeroDivision => "ZeroDivisionError",
            ErrorKind::Assertion => "AssertionError",
            ErrorKind::Runtime => "RuntimeError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::ModuleNotFound => "ModuleNotFoundError",
            ErrorKind::Other(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "NameError" => ErrorKind::Name,
            "TypeError" => ErrorKind::Type,
            "ValueError" => ErrorKind::Value,
            "KeyError" => ErrorKind::Key,
            "IndexError" => ErrorKind::Index,
            "AttributeError" => ErrorKind::Attribute,
            "ZeroDivisionError" => ErrorKind::ZeroDivision,
            "AssertionError" => ErrorKind::Assertion,
            "RuntimeError" => ErrorKind::Runtime,
            "SyntaxError" => ErrorKind::Syntax,
            "ModuleNotFoundError" => ErrorKind::ModuleNotFound,
            other => ErrorKind::Other(other.to_string()),
        }
    }

    /// Whether an `except <handler>` clause catches this kind.
    pub fn caught_by(&self, handler: &str) -> bool {
        match handler {
            "Exception" | "BaseException" => true,
            "LookupError" => matches!(self, ErrorKind::Key | ErrorKind::Index),
            "ArithmeticError" => matches!(self, ErrorKind::ZeroDivision),
            "ImportError" => matches!(self, ErrorKind::ModuleNotFound),
            other => self.as_str() == other,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime exception raised by a fragment.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct EvalError {
    pub kind: ErrorKind,
    pub message: String,
    /// The identifier that failed to resolve, for `NameError`s raised by lookup.
    pub unbound: Option<String>,
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            unbound: None,
        }
    }

    pub fn unbound_name(name: &str) -> Self {
        Self {
            kind: ErrorKind::Name,
            message: format!("name '{name}' is not defined"),
            unbound: Some(name.to_string()),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message.into())
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message.into())
    }
}

/// Whether a parse failure can be fixed by appending more source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The source ended in the middle of a statement.
    Incomplete,
    /// The source can never parse, whatever follows.
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line})")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub line: usize,
}

impl ParseError {
    pub fn invalid(message: impl Into<String>, line: usize) -> Self {
        Self {
            kind: ParseErrorKind::Invalid,
            message: message.into(),
            line,
        }
    }

    pub fn incomplete(message: impl Into<String>, line: usize) -> Self {
        Self {
            kind: ParseErrorKind::Incomplete,
            message: message.into(),
            line,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        self.kind == ParseErrorKind::Incomplete
    }
}

impl From<ParseError> for EvalError {
    fn from(err: ParseError) -> Self {
        EvalError::new(ErrorKind::Syntax, err.to_string())
    }
}
