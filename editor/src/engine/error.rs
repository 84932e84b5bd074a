//! Interpreter exceptions.

use std::fmt;
use thiserror::Error;

/// Exception classes raised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    SyntaxError,
    NameError,
    KeyError,
    TypeError,
    ValueError,
    AttributeError,
    IndexError,
    BudgetExceeded,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionKind::SyntaxError => "SyntaxError",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::BudgetExceeded => "BudgetExceeded",
        };
        f.write_str(name)
    }
}

/// An exception raised while parsing or running a snippet.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: ExceptionKind,
    pub message: String,
    /// 1-based snippet line, when known.
    pub line: Option<usize>,
}

impl EngineError {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::SyntaxError, message)
    }

    pub fn name(name: &str) -> Self {
        Self::new(ExceptionKind::NameError, format!("name '{}' is not defined", name))
    }

    pub fn key(key: impl fmt::Display) -> Self {
        Self::new(ExceptionKind::KeyError, format!("'{}'", key))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ValueError, message)
    }

    pub fn attribute(owner: &str, attr: &str) -> Self {
        Self::new(
            ExceptionKind::AttributeError,
            format!("'{}' object has no attribute '{}'", owner, attr),
        )
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::IndexError, message)
    }

    pub fn budget(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::BudgetExceeded, message)
    }

    /// Full report in traceback form, as shown in diagnostics.
    pub fn traceback(&self) -> String {
        let frame = match self.line {
            Some(line) => format!("  File \"<snippet>\", line {}, in <module>", line),
            None => "  File \"<snippet>\", in <module>".to_string(),
        };
        format!("Traceback (most recent call last):\n{}\n{}", frame, self)
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
