//! Token types for the set and map notation.

use crate::utils::location::Span;
use std::fmt;

/// A token in the input text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The source span
    pub span: Span,
    /// The lexeme (raw text)
    pub lexeme: String,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span, lexeme: String) -> Self {
        Self { kind, span, lexeme }
    }

    /// Check if this is an EOF token.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_eof() {
            write!(f, "end of input")
        } else {
            write!(f, "'{}'", self.lexeme)
        }
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    Integer,

    // Identifiers
    /// Dimension, parameter or tuple name
    Identifier,

    // Keywords
    /// `and` keyword (also `&&`)
    And,
    /// `or` keyword (also `||`)
    Or,
    /// `floor` keyword
    Floor,
    /// `true` keyword
    True,
    /// `false` keyword
    False,

    // Arithmetic operators
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,

    // Comparison operators
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `=`
    Equal,
    /// `>=`
    GreaterEqual,
    /// `>`
    Greater,

    // Delimiters
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `:`
    Colon,
    /// `->`
    Arrow,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Look up a keyword.
    pub fn keyword(s: &str) -> Option<TokenKind> {
        match s {
            "and" => Some(TokenKind::And),
            "or" => Some(TokenKind::Or),
            "floor" => Some(TokenKind::Floor),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            _ => None,
        }
    }

    /// Check if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Equal
                | TokenKind::GreaterEqual
                | TokenKind::Greater
        )
    }

    /// Check if a token of this kind can begin an affine factor.
    pub fn starts_factor(&self) -> bool {
        matches!(
            self,
            TokenKind::Integer | TokenKind::Identifier | TokenKind::LeftParen | TokenKind::Floor
        )
    }

    /// Human-readable description used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Integer => "integer",
            TokenKind::Identifier => "identifier",
            TokenKind::And => "'and'",
            TokenKind::Or => "'or'",
            TokenKind::Floor => "'floor'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Less => "'<'",
            TokenKind::LessEqual => "'<='",
            TokenKind::Equal => "'='",
            TokenKind::GreaterEqual => "'>='",
            TokenKind::Greater => "'>'",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::LeftBracket => "'['",
            TokenKind::RightBracket => "']'",
            TokenKind::LeftBrace => "'{'",
            TokenKind::RightBrace => "'}'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Colon => "':'",
            TokenKind::Arrow => "'->'",
            TokenKind::Eof => "end of input",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        assert_eq!(TokenKind::keyword("and"), Some(TokenKind::And));
        assert_eq!(TokenKind::keyword("floor"), Some(TokenKind::Floor));
        assert_eq!(TokenKind::keyword("i"), None);
        assert!(TokenKind::LessEqual.is_comparison());
        assert!(!TokenKind::Comma.is_comparison());
    }
}
