//! Error types shared by every stage of the pipeline.
//!
//! User-input failures (syntax, unresolved names, type or axis mismatches)
//! surface as [`MotifError::Parse`] with the location of the offending node.
//! Broken internal invariants surface as [`MotifError::Internal`] and point at
//! a bug rather than at the input.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 1-based source position of a node.
///
/// Locations never take part in structural equality: two trees parsed from
/// differently formatted text compare equal when their shape matches.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Location { line, column }
    }
}

impl PartialEq for Location {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
pub enum MotifError {
    #[error("line {location}: {message}")]
    Parse { location: Location, message: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MotifError {
    pub fn parse(location: Location, message: impl Into<String>) -> Self {
        MotifError::Parse {
            location,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        MotifError::Internal(message.into())
    }

    /// Location of a parse error, if this is one.
    pub fn location(&self) -> Option<Location> {
        match self {
            MotifError::Parse { location, .. } => Some(*location),
            _ => None,
        }
    }

    /// The bare message without the location prefix.
    pub fn message(&self) -> String {
        match self {
            MotifError::Parse { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, MotifError::Internal(_))
    }
}

pub type Result<T> = std::result::Result<T, MotifError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_displays_line_and_column() {
        let err = MotifError::parse(Location::new(3, 14), "could not bind path 'user.foo'");
        assert_eq!(err.to_string(), "line 3:14: could not bind path 'user.foo'");
        assert_eq!(err.message(), "could not bind path 'user.foo'");
        assert_eq!(err.location().map(|l| (l.line, l.column)), Some((3, 14)));
    }

    #[test]
    fn internal_errors_are_distinct() {
        let err = MotifError::internal("path accessor 'user' is not bound");
        assert!(err.is_internal());
        assert!(err.location().is_none());
    }
}
