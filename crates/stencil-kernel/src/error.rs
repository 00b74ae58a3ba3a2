//! Error types for parsing, loading and rendering templates.

use std::fmt;

use thiserror::Error;

use crate::lexer::Pos;

/// Why a template failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseReason {
    /// The lexer produced an error token.
    Lexical,
    UnexpectedToken,
    UnexpectedEof,
    /// `extends`/`import` in the wrong place, or repeated.
    UnexpectedClause,
    InvalidAssignment,
    InvalidLiteral,
    DuplicateParameter,
    NestingTooDeep,
}

/// A template could not be parsed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("template: {template}:{}: {message}", .pos.line)]
pub struct ParseError {
    pub reason: ParseReason,
    pub template: String,
    pub message: String,
    pub pos: Pos,
}

/// Why a render failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeReason {
    UndefinedVariable,
    UndefinedBlock,
    /// Assignment to a name no enclosing scope declares.
    UndeclaredVariable,
    InvalidIndex,
    UnknownField,
    UnexportedField,
    NilDereference,
    InvalidOperation,
    DivisionByZero,
    InvalidArgumentCount,
    InvalidValue,
    NotCallable,
    /// The AST is used in a way the evaluator cannot honour, such as a safe
    /// writer in the middle of a pipeline.
    Structural,
    /// A user callable returned an error.
    Function,
    /// An included template could not be loaded.
    Include,
    Io,
    Panic,
    RecursionLimit,
}

impl RuntimeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeReason::UndefinedVariable => "undefined variable",
            RuntimeReason::UndefinedBlock => "undefined block",
            RuntimeReason::UndeclaredVariable => "undeclared variable",
            RuntimeReason::InvalidIndex => "invalid index",
            RuntimeReason::UnknownField => "unknown field",
            RuntimeReason::UnexportedField => "unexported field",
            RuntimeReason::NilDereference => "nil dereference",
            RuntimeReason::InvalidOperation => "invalid operation",
            RuntimeReason::DivisionByZero => "division by zero",
            RuntimeReason::InvalidArgumentCount => "invalid argument count",
            RuntimeReason::InvalidValue => "invalid value",
            RuntimeReason::NotCallable => "not callable",
            RuntimeReason::Structural => "structural error",
            RuntimeReason::Function => "function error",
            RuntimeReason::Include => "include error",
            RuntimeReason::Io => "io error",
            RuntimeReason::Panic => "panic",
            RuntimeReason::RecursionLimit => "recursion limit",
        }
    }
}

impl fmt::Display for RuntimeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A render failed.
///
/// Errors are created where the problem is detected, usually without a
/// location, and the evaluator stamps the template and position of the node
/// being evaluated as the error travels outward. The innermost location wins.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub reason: RuntimeReason,
    pub template: String,
    pub message: String,
    pub pos: Option<Pos>,
    /// Extra key/value context, e.g. the function that failed.
    pub details: Vec<(String, String)>,
}

impl RuntimeError {
    pub fn new(reason: RuntimeReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            template: String::new(),
            message: message.into(),
            pos: None,
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Attach a location unless one is already present.
    pub fn located(mut self, template: &str, pos: Pos) -> Self {
        if self.pos.is_none() {
            self.template = template.to_string();
            self.pos = Some(pos);
        }
        self
    }

    pub fn line(&self) -> Option<usize> {
        self.pos.map(|p| p.line)
    }

    /// `try` can intercept this error.
    pub fn is_catchable(&self) -> bool {
        self.reason != RuntimeReason::RecursionLimit
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.template.is_empty(), self.pos) {
            (false, Some(pos)) => {
                write!(f, "template: {}:{}: {}", self.template, pos.line, self.message)
            }
            (false, None) => write!(f, "template: {}: {}", self.template, self.message),
            (true, _) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Errors returned by [`Set`](crate::Set) operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("template {0} could not be found")]
    NotFound(String),

    #[error("reading template {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("template {0} extends or imports itself")]
    Cycle(String),

    #[error("invalid set configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn located_keeps_innermost_position() {
        let err = RuntimeError::new(RuntimeReason::UndefinedVariable, "boom")
            .located("/inner.jet", Pos::new(10, 3))
            .located("/outer.jet", Pos::new(0, 1));
        assert_eq!(err.template, "/inner.jet");
        assert_eq!(err.line(), Some(3));
        assert_eq!(err.to_string(), "template: /inner.jet:3: boom");
    }

    #[test]
    fn recursion_limit_is_not_catchable() {
        assert!(!RuntimeError::new(RuntimeReason::RecursionLimit, "deep").is_catchable());
        assert!(RuntimeError::new(RuntimeReason::Function, "oops").is_catchable());
    }

    #[test]
    fn parse_error_display() {
        let err = ParseError {
            reason: ParseReason::UnexpectedEof,
            template: "/page.jet".into(),
            message: "unexpected EOF".into(),
            pos: Pos::new(4, 2),
        };
        assert_eq!(err.to_string(), "template: /page.jet:2: unexpected EOF");
    }
}
