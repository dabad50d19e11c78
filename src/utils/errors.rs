//! Error types for the polyhedral pipeline.
//!
//! Every fallible operation returns [`PolyResult`]. The variants of
//! [`PolyError`] are organized by the stage that produces them; no stage
//! recovers from an error internally.

use thiserror::Error;
use crate::utils::location::Span;
use std::fmt;

/// Top-level error type for the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolyError {
    /// Malformed set or map text
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Arity, statement or parameter tuples do not line up
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(#[from] SchemaError),

    /// Band tiling or splitting rejected its arguments
    #[error("Tiling error: {0}")]
    Tiling(#[from] TilingError),

    /// A transform needed a band and the tree has none
    #[error("No band found: {0}")]
    NoBandFound(String),

    /// A loop bound could not be derived
    #[error("Unbounded domain: {0}")]
    UnboundedDomain(String),

    /// Checked 64-bit arithmetic overflowed
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),
}

impl PolyError {
    /// Build a schema mismatch error.
    pub fn schema(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        PolyError::SchemaMismatch(SchemaError {
            message: message.into(),
            kind,
        })
    }

    /// Build a tiling error.
    pub fn tiling(kind: TilingErrorKind, message: impl Into<String>) -> Self {
        PolyError::Tiling(TilingError {
            message: message.into(),
            kind,
        })
    }

    /// Process exit status used by the command line driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            PolyError::Parse(_) => 2,
            PolyError::SchemaMismatch(_) => 3,
            PolyError::Tiling(_) => 4,
            PolyError::NoBandFound(_) => 5,
            PolyError::UnboundedDomain(_) => 6,
            PolyError::Overflow(_) => 7,
        }
    }
}

/// Error while reading set or map text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The error message
    pub message: String,
    /// Location in the input
    pub span: Span,
    /// The kind of parse error
    pub kind: ParseErrorKind,
    /// Expected tokens (if applicable)
    pub expected: Vec<String>,
    /// What was found
    pub found: Option<String>,
}

impl ParseError {
    /// Create a parse error without expectation details.
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
            expected: Vec::new(),
            found: None,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)?;
        if !self.expected.is_empty() {
            write!(f, " (expected: {})", self.expected.join(", "))?;
        }
        if let Some(ref found) = self.found {
            write!(f, " (found: {})", found)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Character that starts no token
    UnexpectedChar,
    /// Integer literal out of range
    InvalidNumber,
    /// Unexpected token
    UnexpectedToken,
    /// Expected a specific token
    ExpectedToken,
    /// Identifier is neither a dimension nor a parameter
    UndeclaredIdentifier,
    /// Product of two non-constant terms, or floor in a constraint
    NonAffine,
    /// Disjuncts disagree on tuple name or arity
    TupleMismatch,
    /// Input ended early
    UnexpectedEof,
}

/// Operands of an operation have incompatible shapes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    /// The error message
    pub message: String,
    /// The kind of mismatch
    pub kind: SchemaErrorKind,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Dimension counts differ
    Arity,
    /// Parameter index or name does not exist
    UnknownParameter,
    /// Dimension name does not exist
    UnknownDimension,
    /// Statement sets differ
    Statements,
    /// Schedule map does not cover a statement domain
    Coverage,
    /// Node does not belong to the tree or has the wrong kind
    InvalidNode,
}

/// Band tiling or splitting failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct TilingError {
    /// The error message
    pub message: String,
    /// The kind of tiling error
    pub kind: TilingErrorKind,
}

impl fmt::Display for TilingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilingErrorKind {
    /// Number of sizes differs from the band width
    SizeCountMismatch,
    /// A tile size is zero or negative
    NonPositiveSize,
    /// The node is not a band
    NotABand,
    /// The node belongs to a different tree
    ForeignNode,
    /// Split position outside the band
    InvalidSplit,
}

/// Result type using PolyError.
pub type PolyResult<T> = Result<T, PolyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::location::Position;

    #[test]
    fn test_error_display() {
        let err = ParseError {
            message: "Unexpected token".to_string(),
            span: Span::new(Position::new(1, 5, 4), Position::new(1, 10, 9)),
            kind: ParseErrorKind::UnexpectedToken,
            expected: vec!["identifier".to_string()],
            found: Some("'}'".to_string()),
        };
        let s = format!("{}", err);
        assert!(s.contains("Unexpected token"));
        assert!(s.contains("identifier"));
        assert!(s.contains("1:5-10"));
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = vec![
            PolyError::from(ParseError::new(ParseErrorKind::UnexpectedEof, "eof", Span::default())),
            PolyError::schema(SchemaErrorKind::Arity, "arity"),
            PolyError::tiling(TilingErrorKind::NotABand, "leaf"),
            PolyError::NoBandFound("none".into()),
            PolyError::UnboundedDomain("i".into()),
            PolyError::Overflow("mul".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 6);
        assert!(codes.iter().all(|&c| c != 0));
    }
}
