//! Error Types
//!
//! One error enum for the whole pipeline, carrying the kinds enumerated by
//! the engine's error-handling design: parse, planning, type, constraint,
//! misuse, unsupported, internal and io. Every variant is constructed with
//! enough context to produce a stable code and human message; parse/planning
//! errors always carry a source position when one is available.

use std::fmt;
use thiserror::Error;

/// Conflict resolution policy applied to a constraint violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Abort,
    Replace,
    Ignore,
    Rollback,
    Fail,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictPolicy::Abort => "ABORT",
            ConflictPolicy::Replace => "REPLACE",
            ConflictPolicy::Ignore => "IGNORE",
            ConflictPolicy::Rollback => "ROLLBACK",
            ConflictPolicy::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

/// A line/column position within the original SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum QuereusError {
    #[error("parse error at {pos}: {message}")]
    Parse { message: String, pos: SourcePos },

    #[error("planning error: {0}")]
    Planning(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("constraint violation ({policy}): {message}")]
    Constraint {
        message: String,
        policy: ConflictPolicy,
    },

    #[error("misuse: {0}")]
    Misuse(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuereusError {
    /// Stable, machine-matchable error code.
    pub fn code(&self) -> &'static str {
        match self {
            QuereusError::Parse { .. } => "PARSE",
            QuereusError::Planning(_) => "PLANNING",
            QuereusError::Type(_) => "TYPE",
            QuereusError::Constraint { .. } => "CONSTRAINT",
            QuereusError::Misuse(_) => "MISUSE",
            QuereusError::Unsupported(_) => "UNSUPPORTED",
            QuereusError::Internal(_) => "INTERNAL",
            QuereusError::Io(_) => "IO",
        }
    }

    pub fn parse(message: impl Into<String>, pos: SourcePos) -> Self {
        QuereusError::Parse {
            message: message.into(),
            pos,
        }
    }

    pub fn planning(message: impl Into<String>) -> Self {
        QuereusError::Planning(message.into())
    }

    pub fn constraint(message: impl Into<String>, policy: ConflictPolicy) -> Self {
        QuereusError::Constraint {
            message: message.into(),
            policy,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        QuereusError::Internal(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        QuereusError::Unsupported(message.into())
    }

    pub fn misuse(message: impl Into<String>) -> Self {
        QuereusError::Misuse(message.into())
    }
}

pub type QuereusResult<T> = Result<T, QuereusError>;
