//! Parser for the set and map notation.
//!
//! This module implements a recursive descent parser over the token
//! stream produced by the lexer. The grammar is:
//!
//! ```text
//! document    := [ "[" params "]" "->" ] "{" [ entry ( ";" entry )* ] "}"
//! entry       := ":" disjunction
//!              | [ name ] "[" dims "]" [ "->" [ name ] "[" exprs "]" ] [ ":" disjunction ]
//! disjunction := conjunction ( "or" conjunction )*
//! conjunction := atom ( "and" atom )*
//! atom        := "true" | "false" | list ( cmp list )+
//! list        := expr ( "," expr )*
//! ```
//!
//! Adjacent lists in a comparison chain are related pairwise, so
//! `0 <= i, j < 100` yields four constraints.

use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::polyhedral::constraint::Constraint;
use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::quasi::QuasiAffineExpr;
use crate::utils::errors::{ParseError, ParseErrorKind};
use crate::utils::location::Span;

type ParseResult<T> = Result<T, ParseError>;

/// One `;`-separated entry of a set or map.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    /// Tuple name, `None` for anonymous tuples
    pub name: Option<String>,
    /// Dimension names of the (input) tuple
    pub dims: Vec<String>,
    /// Whether the entry is `{ : constraints }`
    pub params_only: bool,
    /// Output tuple of a map entry
    pub outputs: Option<(Option<String>, Vec<QuasiAffineExpr>)>,
    /// Constraint disjuncts over `dims` and the document parameters
    pub disjuncts: Vec<Vec<Constraint>>,
    /// Location of the entry
    pub span: Span,
}

/// A parsed `[params] -> { entries }` document.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Caller-supplied parameters followed by declared ones
    pub params: Vec<String>,
    /// Entries in text order
    pub entries: Vec<ParsedEntry>,
}

/// Names visible inside an entry.
struct Scope<'s> {
    dims: &'s [String],
    params: &'s [String],
}

/// A parser for set and map text.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    external_params: Vec<String>,
}

impl Parser {
    /// Create a parser; `params` are names usable without declaration.
    pub fn new(source: &str, params: &[String]) -> ParseResult<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self {
            tokens,
            pos: 0,
            external_params: params.to_vec(),
        })
    }

    fn current(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !token.is_eof() {
            self.pos += 1;
        }
        token
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, kind: ParseErrorKind, message: impl Into<String>) -> ParseError {
        ParseError::new(kind, message, self.current().span)
    }

    fn expected(&self, what: &[&str]) -> ParseError {
        let token = self.current();
        let kind = if token.is_eof() {
            ParseErrorKind::UnexpectedEof
        } else {
            ParseErrorKind::ExpectedToken
        };
        ParseError {
            message: format!("Unexpected {}", token),
            span: token.span,
            kind,
            expected: what.iter().map(|s| s.to_string()).collect(),
            found: Some(token.to_string()),
        }
    }

    fn consume(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.expected(&[kind.describe()]))
        }
    }

    fn consume_identifier(&mut self) -> ParseResult<String> {
        Ok(self.consume(TokenKind::Identifier)?.lexeme)
    }

    /// Parse a complete document.
    pub fn parse_document(&mut self, allow_maps: bool) -> ParseResult<ParsedDocument> {
        let mut params = self.external_params.clone();
        if self.match_token(TokenKind::LeftBracket) {
            if !self.check(TokenKind::RightBracket) {
                loop {
                    let name = self.consume_identifier()?;
                    if !params.contains(&name) {
                        params.push(name);
                    }
                    if !self.match_token(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightBracket)?;
            self.consume(TokenKind::Arrow)?;
        }

        self.consume(TokenKind::LeftBrace)?;
        let mut entries = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            entries.push(self.parse_entry(&params, allow_maps)?);
            if !self.match_token(TokenKind::Semicolon) {
                break;
            }
        }
        self.consume(TokenKind::RightBrace)?;
        self.consume(TokenKind::Eof)?;
        Ok(ParsedDocument { params, entries })
    }

    fn parse_entry(&mut self, params: &[String], allow_maps: bool) -> ParseResult<ParsedEntry> {
        let start = self.current().span;

        if self.match_token(TokenKind::Colon) {
            let scope = Scope { dims: &[], params };
            let disjuncts = self.parse_disjunction(&scope)?;
            return Ok(ParsedEntry {
                name: None,
                dims: Vec::new(),
                params_only: true,
                outputs: None,
                disjuncts,
                span: start.to(&self.current().span),
            });
        }

        let name = if self.check(TokenKind::Identifier) {
            Some(self.consume_identifier()?)
        } else {
            None
        };
        let dims = self.parse_dim_tuple(params)?;
        let scope = Scope { dims: &dims, params };

        let outputs = if self.match_token(TokenKind::Arrow) {
            if !allow_maps {
                return Err(self.error(
                    ParseErrorKind::UnexpectedToken,
                    "Expected a set, found a map",
                ));
            }
            let out_name = if self.check(TokenKind::Identifier) {
                Some(self.consume_identifier()?)
            } else {
                None
            };
            self.consume(TokenKind::LeftBracket)?;
            let mut exprs = Vec::new();
            if !self.check(TokenKind::RightBracket) {
                exprs = self.parse_list(&scope, true)?;
            }
            self.consume(TokenKind::RightBracket)?;
            Some((out_name, exprs))
        } else {
            if allow_maps {
                return Err(self.expected(&["'->'"]));
            }
            None
        };

        let disjuncts = if self.match_token(TokenKind::Colon) {
            self.parse_disjunction(&scope)?
        } else {
            vec![Vec::new()]
        };

        Ok(ParsedEntry {
            name,
            dims,
            params_only: false,
            outputs,
            disjuncts,
            span: start.to(&self.current().span),
        })
    }

    fn parse_dim_tuple(&mut self, params: &[String]) -> ParseResult<Vec<String>> {
        self.consume(TokenKind::LeftBracket)?;
        let mut dims: Vec<String> = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            loop {
                let span = self.current().span;
                let name = self.consume_identifier()?;
                if dims.contains(&name) || params.contains(&name) {
                    return Err(ParseError::new(
                        ParseErrorKind::UnexpectedToken,
                        format!("Name '{}' is declared twice", name),
                        span,
                    ));
                }
                dims.push(name);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBracket)?;
        Ok(dims)
    }

    fn parse_disjunction(&mut self, scope: &Scope) -> ParseResult<Vec<Vec<Constraint>>> {
        let mut disjuncts = vec![self.parse_conjunction(scope)?];
        while self.match_token(TokenKind::Or) {
            disjuncts.push(self.parse_conjunction(scope)?);
        }
        Ok(disjuncts)
    }

    fn parse_conjunction(&mut self, scope: &Scope) -> ParseResult<Vec<Constraint>> {
        let mut constraints = self.parse_atom(scope)?;
        while self.match_token(TokenKind::And) {
            constraints.extend(self.parse_atom(scope)?);
        }
        Ok(constraints)
    }

    fn parse_atom(&mut self, scope: &Scope) -> ParseResult<Vec<Constraint>> {
        let n_dim = scope.dims.len();
        let n_param = scope.params.len();
        if self.match_token(TokenKind::True) {
            return Ok(Vec::new());
        }
        if self.match_token(TokenKind::False) {
            return Ok(vec![Constraint::falsum(n_dim, n_param)]);
        }

        let mut lists = vec![self.parse_affine_list(scope)?];
        let mut ops = Vec::new();
        while self.current().kind.is_comparison() {
            let op = self.advance();
            ops.push(op);
            lists.push(self.parse_affine_list(scope)?);
        }
        if ops.is_empty() {
            return Err(self.expected(&["'<'", "'<='", "'='", "'>='", "'>'"]));
        }

        let mut constraints = Vec::new();
        for (k, op) in ops.iter().enumerate() {
            for lhs in &lists[k] {
                for rhs in &lists[k + 1] {
                    constraints.push(self.compare(op, lhs, rhs)?);
                }
            }
        }
        Ok(constraints)
    }

    fn compare(&self, op: &Token, lhs: &AffineExpr, rhs: &AffineExpr) -> ParseResult<Constraint> {
        let overflow = |_| ParseError::new(ParseErrorKind::InvalidNumber, "Coefficient overflow", op.span);
        let constraint = match op.kind {
            TokenKind::Less => Constraint::ge_zero(rhs.checked_sub(lhs).and_then(|e| e.add_constant(-1)).map_err(overflow)?),
            TokenKind::LessEqual => Constraint::le(lhs, rhs).map_err(overflow)?,
            TokenKind::Equal => Constraint::eq(lhs, rhs).map_err(overflow)?,
            TokenKind::GreaterEqual => Constraint::ge(lhs, rhs).map_err(overflow)?,
            _ => Constraint::ge_zero(lhs.checked_sub(rhs).and_then(|e| e.add_constant(-1)).map_err(overflow)?),
        };
        Ok(constraint)
    }

    fn parse_affine_list(&mut self, scope: &Scope) -> ParseResult<Vec<AffineExpr>> {
        let start = self.current().span;
        let list = self.parse_list(scope, false)?;
        // floors are rejected in constraints by parse_factor
        list.into_iter()
            .map(|e| {
                e.as_affine().cloned().ok_or_else(|| {
                    ParseError::new(ParseErrorKind::NonAffine, "Constraint is not affine", start)
                })
            })
            .collect()
    }

    fn parse_list(&mut self, scope: &Scope, allow_floor: bool) -> ParseResult<Vec<QuasiAffineExpr>> {
        let mut list = vec![self.parse_expr(scope, allow_floor)?];
        while self.match_token(TokenKind::Comma) {
            list.push(self.parse_expr(scope, allow_floor)?);
        }
        Ok(list)
    }

    fn parse_expr(&mut self, scope: &Scope, allow_floor: bool) -> ParseResult<QuasiAffineExpr> {
        let mut expr = self.parse_term(scope, allow_floor)?;
        loop {
            let factor = if self.check(TokenKind::Plus) {
                1
            } else if self.check(TokenKind::Minus) {
                -1
            } else {
                break;
            };
            let span = self.advance().span;
            let rhs = self.parse_term(scope, allow_floor)?;
            expr = expr
                .add_scaled(&rhs, factor)
                .map_err(|_| ParseError::new(ParseErrorKind::InvalidNumber, "Coefficient overflow", span))?;
        }
        Ok(expr)
    }

    fn parse_term(&mut self, scope: &Scope, allow_floor: bool) -> ParseResult<QuasiAffineExpr> {
        if self.check(TokenKind::Minus) {
            let span = self.advance().span;
            let term = self.parse_term(scope, allow_floor)?;
            return term
                .checked_scale(-1)
                .map_err(|_| ParseError::new(ParseErrorKind::InvalidNumber, "Coefficient overflow", span));
        }
        let mut value = self.parse_factor(scope, allow_floor)?;
        loop {
            let explicit = self.check(TokenKind::Star);
            if !explicit && !self.current().kind.starts_factor() {
                break;
            }
            let span = self.current().span;
            if explicit {
                self.advance();
            }
            let rhs = self.parse_factor(scope, allow_floor)?;
            value = Self::multiply(&value, &rhs).ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::NonAffine,
                    "Product of two non-constant terms",
                    span,
                )
            })?;
        }
        Ok(value)
    }

    fn multiply(a: &QuasiAffineExpr, b: &QuasiAffineExpr) -> Option<QuasiAffineExpr> {
        if let Some(k) = a.as_constant() {
            b.checked_scale(k).ok()
        } else if let Some(k) = b.as_constant() {
            a.checked_scale(k).ok()
        } else {
            None
        }
    }

    fn parse_factor(&mut self, scope: &Scope, allow_floor: bool) -> ParseResult<QuasiAffineExpr> {
        let n_dim = scope.dims.len();
        let n_param = scope.params.len();
        let token = self.current().clone();
        match token.kind {
            TokenKind::Integer => {
                self.advance();
                let value = token.lexeme.parse::<i64>().map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidNumber, "Integer literal out of range", token.span)
                })?;
                Ok(QuasiAffineExpr::constant(value, n_dim, n_param))
            }
            TokenKind::Identifier => {
                self.advance();
                if let Some(d) = scope.dims.iter().position(|n| *n == token.lexeme) {
                    Ok(AffineExpr::var(d, n_dim, n_param).into())
                } else if let Some(p) = scope.params.iter().position(|n| *n == token.lexeme) {
                    Ok(AffineExpr::param(p, n_dim, n_param).into())
                } else {
                    Err(ParseError::new(
                        ParseErrorKind::UndeclaredIdentifier,
                        format!("Undeclared identifier '{}'", token.lexeme),
                        token.span,
                    ))
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expr(scope, allow_floor)?;
                self.consume(TokenKind::RightParen)?;
                Ok(inner)
            }
            TokenKind::Floor => {
                if !allow_floor {
                    return Err(ParseError::new(
                        ParseErrorKind::NonAffine,
                        "floor() is only allowed in schedule outputs",
                        token.span,
                    ));
                }
                self.advance();
                self.consume(TokenKind::LeftParen)?;
                let numerator = self.parse_expr(scope, allow_floor)?;
                self.consume(TokenKind::Slash)?;
                let divisor_token = self.consume(TokenKind::Integer)?;
                let divisor = divisor_token.lexeme.parse::<i64>().unwrap_or(0);
                if divisor <= 0 {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidNumber,
                        "floor() divisor must be a positive integer",
                        divisor_token.span,
                    ));
                }
                self.consume(TokenKind::RightParen)?;
                numerator.floor_div(divisor).map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidNumber, "Coefficient overflow", token.span)
                })
            }
            _ => Err(self.expected(&["integer", "identifier", "'('"])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str, maps: bool) -> ParseResult<ParsedDocument> {
        Parser::new(source, &[])?.parse_document(maps)
    }

    #[test]
    fn test_chain_with_lists() {
        let doc = parse("{ S[i, j] : 0 <= i, j < 100 }", false).unwrap();
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.entries[0].dims, vec!["i".to_string(), "j".to_string()]);
        assert_eq!(doc.entries[0].disjuncts[0].len(), 4);
    }

    #[test]
    fn test_params_and_disjunction() {
        let doc = parse("[n] -> { S[i] : 0 <= i < n or i = 2n }", false).unwrap();
        assert_eq!(doc.params, vec!["n".to_string()]);
        let disjuncts = &doc.entries[0].disjuncts;
        assert_eq!(disjuncts.len(), 2);
        assert_eq!(disjuncts[1][0].expr.param_coeffs, vec![-2]);
    }

    #[test]
    fn test_external_params_come_first() {
        let params = vec!["m".to_string()];
        let doc = Parser::new("[n] -> { S[i] : i < n + m }", &params)
            .unwrap()
            .parse_document(false)
            .unwrap();
        assert_eq!(doc.params, vec!["m".to_string(), "n".to_string()]);
    }

    #[test]
    fn test_map_outputs() {
        let doc = parse("{ S[i, j] -> [floor(i/32), 2*j + 1] }", true).unwrap();
        let (_, outputs) = doc.entries[0].outputs.as_ref().unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(!outputs[0].is_affine());
        assert_eq!(outputs[1].affine.coeffs, vec![0, 2]);
    }

    #[test]
    fn test_errors() {
        let err = parse("{ S[i] : i < n }", false).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UndeclaredIdentifier);

        let err = parse("{ S[i, j] : i * j >= 0 }", false).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::NonAffine);

        let err = parse("{ S[i] : floor(i/2) >= 0 }", false).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::NonAffine);

        let err = parse("{ S[i] : i >= 0 ", false).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEof);

        let err = parse("{ S[i] : i }", false).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedToken);
    }
}
