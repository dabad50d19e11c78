//! Positions and spans in set and map texts.
//!
//! Domains passed on the command line are one line, but `--file` inputs may
//! span several, so positions keep the line next to the byte offset.

use std::fmt;
use std::ops::Range;
use serde::{Serialize, Deserialize};

/// A position in the input text. Lines and columns count from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    /// Byte offset into the input
    pub offset: usize,
}

impl Position {
    /// First character of the input.
    pub const FIRST: Position = Position { line: 1, column: 1, offset: 0 };

    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

/// Half-open range `[start, end)` of the input covered by a token or an
/// entry. The default span has no position and prints as `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: Option<Position>,
    pub end: Option<Position>,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start: Some(start), end: Some(end) }
    }

    /// Byte range of the covered text, empty for the default span.
    pub fn bytes(&self) -> Range<usize> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => s.offset..e.offset,
            _ => 0..0,
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(&self, other: &Span) -> Span {
        let start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(if a.offset <= b.offset { a } else { b }),
            (a, b) => a.or(b),
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(if a.offset >= b.offset { a } else { b }),
            (a, b) => a.or(b),
        };
        Span { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (Some(s), Some(e)) if s.line == e.line => write!(f, "{}:{}-{}", s.line, s.column, e.column),
            (Some(s), Some(e)) => write!(f, "{}:{}-{}:{}", s.line, s.column, e.line, e.column),
            _ => write!(f, "?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_display() {
        let span = Span::new(Position::new(1, 5, 4), Position::new(1, 10, 9));
        assert_eq!(span.to_string(), "1:5-10");

        let span = Span::new(Position::new(1, 5, 4), Position::new(3, 2, 30));
        assert_eq!(span.to_string(), "1:5-3:2");
        assert_eq!(Span::default().to_string(), "?");
    }

    #[test]
    fn test_span_cover() {
        let a = Span::new(Position::new(1, 1, 0), Position::new(1, 5, 4));
        let b = Span::new(Position::new(1, 10, 9), Position::new(1, 15, 14));
        let both = b.to(&a);
        assert_eq!(both.bytes(), 0..14);
        assert_eq!(both.start.map(|p| p.column), Some(1));
        assert_eq!(a.to(&Span::default()), a);
    }
}
