//! Error types shared by every table operation.
//!
//! All violations are reported at the call that causes them; nothing is
//! deferred or silently repaired.

use crate::lock::Part;
use thiserror::Error;

/// Errors raised by the lock controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("{0} is read-only outside of an unlocked scope")]
    ReadOnly(Part),

    #[error("{0} is a view of another buffer and cannot be unlocked; use force_unlocked")]
    ViewNotUnlockable(Part),

    #[error("buffer is read-only")]
    ReadOnlyBuffer,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("variable '{0}' is not in domain")]
    UnknownVariable(String),

    #[error("index {0} is out of range for the domain")]
    IndexOutOfRange(isize),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("filter error: {0}")]
    Filter(String),

    #[error("cannot parse '{raw}' as a value of '{variable}': {message}")]
    Parse {
        variable: String,
        raw: String,
        message: String,
    },

    #[error("invalid concatenation axis {0}; expected 0 (rows) or 1 (columns)")]
    InvalidAxis(usize),

    #[error("expression error: {0}")]
    Expression(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

impl TableError {
    pub(crate) fn parse(variable: &str, raw: impl Into<String>, message: impl Into<String>) -> Self {
        TableError::Parse {
            variable: variable.to_string(),
            raw: raw.into(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TableError>;
