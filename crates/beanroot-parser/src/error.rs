//! Parse error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A syntax error on one line. The directive it belongs to is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("line {lineno}: {message}")]
pub struct ParseError {
    /// 1-based line number.
    pub lineno: u32,
    /// What went wrong.
    pub message: String,
}

impl ParseError {
    /// Create a new parse error.
    #[must_use]
    pub fn new(lineno: u32, message: impl Into<String>) -> Self {
        Self {
            lineno,
            message: message.into(),
        }
    }
}
