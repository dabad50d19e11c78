//! Frontend: lexer and parser for the set and map notation.
//!
//! ## Notation Overview
//!
//! ```text
//! [n] -> { S[i, j] : 0 <= i, j < n; T[k] : k = 0 }
//! { S[i, j] -> [floor(i/32), j - 32*floor(j/32)] }
//! [n] -> { : n >= 1 }
//! ```
//!
//! Parameters are declared in the leading bracket list; parameters passed
//! by the caller may be used without a declaration and come first in the
//! resulting parameter tuple.

pub mod token;
pub mod lexer;
pub mod parser;

// Re-exports
pub use lexer::Lexer;
pub use parser::{ParsedDocument, ParsedEntry, Parser};
pub use token::{Token, TokenKind};
pub use crate::utils::errors::ParseError;

use crate::polyhedral::map::{AffineMap, UnionMap};
use crate::polyhedral::set::{BasicSet, Set};
use crate::polyhedral::space::Space;
use crate::polyhedral::union::UnionSet;
use crate::utils::errors::{ParseErrorKind, PolyResult};

fn parse_document(text: &str, param_names: &[String], maps: bool) -> PolyResult<ParsedDocument> {
    let mut parser = Parser::new(text, param_names)?;
    let doc = parser.parse_document(maps)?;
    log::trace!("parsed {} entries over params {:?}", doc.entries.len(), doc.params);
    Ok(doc)
}

fn entry_space(entry: &ParsedEntry, params: &[String]) -> Space {
    if entry.params_only {
        Space::params(params.to_vec())
    } else {
        Space {
            name: entry.name.clone(),
            dim_names: entry.dims.clone(),
            param_names: params.to_vec(),
        }
    }
}

fn entry_set(entry: &ParsedEntry, space: &Space) -> PolyResult<Set> {
    let mut set = Set::empty(space.clone());
    for conjunct in &entry.disjuncts {
        set.add_disjunct(BasicSet::from_constraints(space.clone(), conjunct)?);
    }
    Ok(set)
}

fn mismatch(entry: &ParsedEntry, message: String) -> ParseError {
    ParseError::new(ParseErrorKind::TupleMismatch, message, entry.span)
}

/// Parse a single-tuple set such as `[n] -> { S[i] : 0 <= i < n }`.
///
/// Every entry must share the tuple name and arity of the first one; the
/// entries are combined as a disjunction.
pub fn parse_set(text: &str, param_names: &[String]) -> PolyResult<Set> {
    let doc = parse_document(text, param_names, false)?;
    let first = match doc.entries.first() {
        Some(first) => first,
        None => {
            return Err(ParseError::new(
                ParseErrorKind::ExpectedToken,
                "A set needs at least one tuple",
                crate::utils::location::Span::default(),
            )
            .into())
        }
    };
    let space = entry_space(first, &doc.params);
    let mut result = Set::empty(space.clone());
    for entry in &doc.entries {
        if entry.name != first.name
            || entry.dims.len() != first.dims.len()
            || entry.params_only != first.params_only
        {
            return Err(mismatch(
                entry,
                format!(
                    "Tuple {} does not match {}",
                    entry_space(entry, &doc.params).tuple_string(),
                    space.tuple_string()
                ),
            )
            .into());
        }
        for basic in entry_set(entry, &space)?.basic_sets() {
            result.add_disjunct(basic.clone());
        }
    }
    Ok(result)
}

/// Parse a statement domain such as `{ S[i] : 0 <= i < 4; T[j] : j = 0 }`.
pub fn parse_union_set(text: &str, param_names: &[String]) -> PolyResult<UnionSet> {
    let doc = parse_document(text, param_names, false)?;
    let mut result = UnionSet::new(doc.params.clone());
    let mut arities: Vec<(String, usize)> = Vec::new();
    for entry in &doc.entries {
        if entry.params_only {
            return Err(mismatch(entry, "A statement domain needs named tuples".to_string()).into());
        }
        let name = entry.name.clone().unwrap_or_default();
        match arities.iter().find(|(n, _)| *n == name) {
            Some((_, arity)) if *arity != entry.dims.len() => {
                return Err(mismatch(
                    entry,
                    format!(
                        "Statement '{}' used with {} and {} dimensions",
                        name,
                        arity,
                        entry.dims.len()
                    ),
                )
                .into());
            }
            Some(_) => {}
            None => arities.push((name, entry.dims.len())),
        }
        let space = entry_space(entry, &doc.params);
        result.add_set(entry_set(entry, &space)?)?;
    }
    Ok(result)
}

/// Parse a schedule such as `{ S[i, j] -> [floor(i/32), j] }`.
pub fn parse_union_map(text: &str, param_names: &[String]) -> PolyResult<UnionMap> {
    let doc = parse_document(text, param_names, true)?;
    let mut result = UnionMap::new(doc.params.clone());
    for entry in &doc.entries {
        let space = entry_space(entry, &doc.params);
        let (out_name, outputs) = match &entry.outputs {
            Some(out) => out.clone(),
            None => return Err(mismatch(entry, "Expected a map entry".to_string()).into()),
        };
        let mut map = AffineMap::new(space.clone(), outputs);
        map.out_name = out_name;
        map.domain = entry_set(entry, &space)?;
        result.add_map(map)?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::PolyError;

    fn parse_kind(result: PolyResult<impl std::fmt::Debug>) -> ParseErrorKind {
        match result {
            Err(PolyError::Parse(e)) => e.kind,
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_set_disjunction() {
        let set = parse_set("{ S[i] : 0 <= i < 3; S[i] : i = 10 }", &[]).unwrap();
        assert_eq!(set.points(&[]).unwrap(), vec![vec![0], vec![1], vec![2], vec![10]]);
    }

    #[test]
    fn test_parse_set_tuple_mismatch() {
        let result = parse_set("{ S[i] : i = 0; T[j] : j = 0 }", &[]);
        assert_eq!(parse_kind(result), ParseErrorKind::TupleMismatch);
    }

    #[test]
    fn test_parse_params_only_set() {
        let set = parse_set("[n] -> { : n >= 1 }", &[]).unwrap();
        assert!(set.space.is_params());
        assert_eq!(set.n_param(), 1);
    }

    #[test]
    fn test_parse_union_set() {
        let params = vec!["n".to_string()];
        let domain = parse_union_set("{ S[i] : 0 <= i < n; T[j] : j = 0 }", &params).unwrap();
        assert_eq!(domain.statement_names(), vec!["S".to_string(), "T".to_string()]);
        assert_eq!(domain.params, params);
    }

    #[test]
    fn test_parse_union_set_arity_mismatch() {
        let result = parse_union_set("{ S[i] : i = 0; S[i, j] : i = j }", &[]);
        assert_eq!(parse_kind(result), ParseErrorKind::TupleMismatch);
    }

    #[test]
    fn test_parse_union_map() {
        let schedule = parse_union_map("{ S[i] -> [2i]; T[j] -> [j + 1] }", &[]).unwrap();
        assert_eq!(schedule.n_out(), Some(1));
        assert_eq!(schedule.get("S").unwrap().apply(&[3], &[]).unwrap(), vec![6]);
    }

    #[test]
    fn test_map_text_is_not_a_set() {
        let result = parse_union_set("{ S[i] -> [i] }", &[]);
        assert_eq!(parse_kind(result), ParseErrorKind::UnexpectedToken);
    }
}
