//! Union domains: one set per statement, keyed by statement name.

use crate::polyhedral::set::Set;
use crate::utils::errors::{PolyError, PolyResult, SchemaErrorKind};
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Statement name → iteration domain, over one shared parameter tuple.
///
/// Iteration follows statement-name order, which fixes the order of
/// statements everywhere in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnionSet {
    pub params: Vec<String>,
    sets: BTreeMap<String, Set>,
}

impl UnionSet {
    pub fn new(params: Vec<String>) -> Self {
        Self { params, sets: BTreeMap::new() }
    }

    /// Union domain holding a single statement.
    pub fn from_set(set: Set) -> Self {
        let mut union = Self::new(set.space.param_names.clone());
        union.sets.insert(set.name().to_string(), set);
        union
    }

    pub fn len(&self) -> usize { self.sets.len() }
    pub fn is_empty_union(&self) -> bool { self.sets.is_empty() }

    pub fn get(&self, name: &str) -> Option<&Set> {
        self.sets.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Set)> {
        self.sets.iter()
    }

    pub fn statement_names(&self) -> Vec<String> {
        self.sets.keys().cloned().collect()
    }

    /// Re-express every statement over a larger parameter tuple.
    pub fn align_params(&self, params: &[String]) -> PolyResult<UnionSet> {
        let mut result = UnionSet::new(params.to_vec());
        for (name, set) in &self.sets {
            result.sets.insert(name.clone(), set.align_params(params)?);
        }
        Ok(result)
    }

    fn merged_params(&self, other: &[String]) -> Vec<String> {
        let mut params = self.params.clone();
        for p in other {
            if !params.contains(p) {
                params.push(p.clone());
            }
        }
        params
    }

    /// Add a statement domain. A statement already present is merged as
    /// a disjunction; a different arity is a schema mismatch.
    pub fn add_set(&mut self, set: Set) -> PolyResult<()> {
        let params = self.merged_params(&set.space.param_names);
        if params != self.params {
            *self = self.align_params(&params)?;
        }
        let set = set.align_params(&self.params)?;
        let name = set.name().to_string();
        let merged = match self.sets.get(&name) {
            Some(existing) => existing.union(&set)?,
            None => set,
        };
        self.sets.insert(name, merged);
        Ok(())
    }

    /// Disjoint union keyed by statement name.
    pub fn union(&self, other: &UnionSet) -> PolyResult<UnionSet> {
        let mut result = self.clone();
        for set in other.sets.values() {
            result.add_set(set.clone())?;
        }
        Ok(result)
    }

    /// Per-statement intersection; statements missing on either side are dropped.
    pub fn intersect(&self, other: &UnionSet) -> PolyResult<UnionSet> {
        let params = self.merged_params(&other.params);
        let mut result = UnionSet::new(params.clone());
        for (name, set) in &self.sets {
            if let Some(theirs) = other.sets.get(name) {
                let set = set.align_params(&params)?;
                let theirs = theirs.align_params(&params)?;
                result.sets.insert(name.clone(), set.intersect(&theirs)?);
            }
        }
        Ok(result)
    }

    /// Intersect every statement with a parameter-only set.
    pub fn intersect_params(&self, context: &Set) -> PolyResult<UnionSet> {
        if !context.space.is_params() {
            return Err(PolyError::schema(
                SchemaErrorKind::Arity,
                format!("parameter context must have no set dimensions, got {}", context),
            ));
        }
        let params = self.merged_params(&context.space.param_names);
        let context = context.align_params(&params)?;
        let mut result = UnionSet::new(params.clone());
        for (name, set) in &self.sets {
            let set = set.align_params(&params)?;
            let mut restricted = Set::empty(set.space.clone());
            for b in set.basic_sets() {
                for c in context.basic_sets() {
                    let mut piece = b.clone();
                    for constraint in c.constraints.constraints() {
                        let mut constraint = constraint.clone();
                        constraint.expr.coeffs = vec![0; set.n_dim()];
                        piece.add_constraint(constraint)?;
                    }
                    restricted.add_disjunct(piece);
                }
            }
            result.sets.insert(name.clone(), restricted);
        }
        Ok(result)
    }

    /// Keep only the named statements.
    pub fn restrict_to(&self, names: &[String]) -> UnionSet {
        let mut result = UnionSet::new(self.params.clone());
        for (name, set) in &self.sets {
            if names.contains(name) {
                result.sets.insert(name.clone(), set.clone());
            }
        }
        result
    }

    /// Fix a parameter in every statement.
    pub fn fix_param(&self, param: usize, value: i64) -> PolyResult<UnionSet> {
        let name = self.params.get(param).ok_or_else(|| {
            PolyError::schema(
                SchemaErrorKind::UnknownParameter,
                format!("parameter index {} out of range for [{}]", param, self.params.join(", ")),
            )
        })?;
        self.fix_param_by_name(&name.clone(), value)
    }

    /// Fix a parameter, by name, in every statement.
    pub fn fix_param_by_name(&self, name: &str, value: i64) -> PolyResult<UnionSet> {
        if !self.params.iter().any(|p| p == name) {
            return Err(PolyError::schema(
                SchemaErrorKind::UnknownParameter,
                format!("no parameter named '{}'", name),
            ));
        }
        let mut result = UnionSet::new(self.params.clone());
        for (stmt, set) in &self.sets {
            result.sets.insert(stmt.clone(), set.fix_param_by_name(name, value)?);
        }
        Ok(result)
    }

    pub fn is_empty(&self) -> PolyResult<bool> {
        for set in self.sets.values() {
            if !set.is_empty()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Every `(statement, point)` pair, statements in name order.
    pub fn points(&self, params: &[i64]) -> PolyResult<Vec<(String, Vec<i64>)>> {
        let mut points = Vec::new();
        for (name, set) in &self.sets {
            for p in set.points(params)? {
                points.push((name.clone(), p));
            }
        }
        Ok(points)
    }
}

impl fmt::Display for UnionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.params.is_empty() {
            write!(f, "[{}] -> ", self.params.join(", "))?;
        }
        write!(f, "{{ ")?;
        for (i, set) in self.sets.values().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", set.body_string())?;
        }
        write!(f, " }}")
    }
}

impl From<Set> for UnionSet {
    fn from(set: Set) -> Self {
        UnionSet::from_set(set)
    }
}

impl FromStr for UnionSet {
    type Err = PolyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::frontend::parse_union_set(s, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uset(text: &str) -> UnionSet {
        text.parse().unwrap()
    }

    #[test]
    fn test_union_keys_by_statement() {
        let a = uset("[n] -> { S[i] : 0 <= i < n }");
        let b = uset("[m] -> { T[i, j] : 0 <= i < m and 0 <= j < m }");
        let u = a.union(&b).unwrap();
        assert_eq!(u.statement_names(), vec!["S".to_string(), "T".to_string()]);
        assert_eq!(u.params, vec!["n".to_string(), "m".to_string()]);
        assert_eq!(u.points(&[2, 1]).unwrap().len(), 3);
    }

    #[test]
    fn test_union_arity_mismatch() {
        let a = uset("{ S[i] : 0 <= i < 4 }");
        let b = uset("{ S[i, j] : 0 <= i < 4 and j = 0 }");
        assert!(matches!(a.union(&b), Err(PolyError::SchemaMismatch(_))));
    }

    #[test]
    fn test_intersect_drops_missing_statements() {
        let a = uset("{ S[i] : 0 <= i < 10; T[i] : 0 <= i < 10 }");
        let b = uset("{ S[i] : i >= 5 }");
        let c = a.intersect(&b).unwrap();
        assert_eq!(c.statement_names(), vec!["S".to_string()]);
        assert_eq!(c.points(&[]).unwrap().len(), 5);
    }

    #[test]
    fn test_display_round_trip() {
        let text = "[n] -> { S[i] : i >= 0 and n >= i + 1; T[j] : j = 0 }";
        let u = uset(text);
        assert_eq!(u.to_string(), text);
    }
}
