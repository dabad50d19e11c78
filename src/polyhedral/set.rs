//! Integer sets (unions of polyhedra) for iteration domains.

use crate::polyhedral::constraint::Constraint;
use crate::polyhedral::elimination::ConstraintSystem;
use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::space::Space;
use crate::utils::errors::{PolyError, PolyResult, SchemaErrorKind};
use crate::utils::math;
use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A conjunction of affine constraints over one space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicSet {
    pub space: Space,
    pub constraints: ConstraintSystem,
}

impl BasicSet {
    pub fn universe(space: Space) -> Self {
        let constraints = ConstraintSystem::new(space.n_dim(), space.n_param());
        Self { space, constraints }
    }

    pub fn from_constraints<'a>(
        space: Space,
        constraints: impl IntoIterator<Item = &'a Constraint>,
    ) -> PolyResult<Self> {
        let constraints = ConstraintSystem::from_constraints(space.n_dim(), space.n_param(), constraints)?;
        Ok(Self { space, constraints })
    }

    pub fn n_dim(&self) -> usize { self.space.n_dim() }
    pub fn n_param(&self) -> usize { self.space.n_param() }

    pub fn add_constraint(&mut self, constraint: Constraint) -> PolyResult<()> {
        self.constraints.add(constraint)
    }

    pub fn is_universe(&self) -> bool {
        !self.constraints.is_known_infeasible() && self.constraints.constraints().is_empty()
    }

    pub fn is_empty(&self) -> PolyResult<bool> {
        self.constraints.is_empty()
    }

    pub fn contains(&self, point: &[i64], params: &[i64]) -> PolyResult<bool> {
        self.constraints.contains(point, params)
    }

    /// Conjunction with a basic set over the same space.
    pub fn intersect(&self, other: &BasicSet) -> PolyResult<BasicSet> {
        let mut result = self.clone();
        for c in other.constraints.constraints() {
            result.add_constraint(c.clone())?;
        }
        if other.constraints.is_known_infeasible() {
            result.constraints.set_infeasible();
        }
        Ok(result)
    }

    /// Re-express over a parameter tuple that contains all current parameters.
    pub fn align_params(&self, params: &[String]) -> PolyResult<BasicSet> {
        let mapping = self.space.param_mapping(params)?;
        let space = self.space.with_params(params.to_vec());
        let mut result = BasicSet::universe(space);
        for c in self.constraints.constraints() {
            result.add_constraint(c.remap_params(&mapping, params.len()))?;
        }
        if self.constraints.is_known_infeasible() {
            result.constraints.set_infeasible();
        }
        Ok(result)
    }

    /// Eliminate a dimension and drop it from the space.
    pub fn project_out(&self, dim: usize) -> PolyResult<BasicSet> {
        let mut constraints = self.constraints.clone();
        constraints.eliminate(dim)?;
        constraints.remove_var(dim);
        Ok(BasicSet {
            space: self.space.drop_dim(dim),
            constraints,
        })
    }

    /// Pieces covering `self` minus `other`, pairwise disjoint.
    pub fn subtract(&self, other: &BasicSet) -> PolyResult<Vec<BasicSet>> {
        if other.constraints.is_known_infeasible() {
            return Ok(vec![self.clone()]);
        }
        let mut pieces = Vec::new();
        let mut remaining = self.clone();
        for c in other.constraints.constraints() {
            for ineq in c.as_inequalities()? {
                let mut piece = remaining.clone();
                piece.add_constraint(ineq.negate()?)?;
                if !piece.is_empty()? {
                    pieces.push(piece);
                }
                remaining.add_constraint(ineq)?;
            }
            if remaining.is_empty()? {
                break;
            }
        }
        Ok(pieces)
    }

    /// Constraint system with every parameter replaced by its value.
    fn instantiate(&self, params: &[i64]) -> PolyResult<ConstraintSystem> {
        if params.len() != self.n_param() {
            return Err(PolyError::schema(
                SchemaErrorKind::Arity,
                format!("expected {} parameter values, got {}", self.n_param(), params.len()),
            ));
        }
        let mut system = self.constraints.clone();
        for (p, &v) in params.iter().enumerate() {
            system.fix_param(p, v)?;
        }
        Ok(system)
    }

    /// Shadows of the system onto dimension prefixes; entry `k` only
    /// mentions dimensions `0..=k`.
    fn prefix_shadows(system: &ConstraintSystem) -> PolyResult<Vec<ConstraintSystem>> {
        let n = system.n_var;
        let mut shadows = vec![system.clone(); n];
        for k in (0..n.saturating_sub(1)).rev() {
            let mut next = shadows[k + 1].clone();
            next.eliminate(k + 1)?;
            shadows[k] = next;
        }
        Ok(shadows)
    }

    /// Range of dimension `k` given values for dimensions `0..k`.
    fn dim_range(&self, shadow: &ConstraintSystem, k: usize, prefix: &[i64]) -> PolyResult<Option<(i64, i64)>> {
        if shadow.is_known_infeasible() {
            return Ok(None);
        }
        let mut lower: Option<i64> = None;
        let mut upper: Option<i64> = None;
        let (lowers, uppers) = shadow.bounds(k)?;
        for c in shadow.constraints() {
            if c.expr.coeff(k) == 0 && !c.is_satisfied(prefix, &[])? {
                return Ok(None);
            }
        }
        for e in lowers {
            let a = e.coeff(k);
            let mut rest = e.clone();
            rest.coeffs[k] = 0;
            let bound = math::ceil_div(math::neg(rest.evaluate(prefix, &[])?)?, a)?;
            lower = Some(lower.map_or(bound, |l| l.max(bound)));
        }
        for e in uppers {
            let a = math::neg(e.coeff(k))?;
            let mut rest = e.clone();
            rest.coeffs[k] = 0;
            let bound = math::floor_div(rest.evaluate(prefix, &[])?, a)?;
            upper = Some(upper.map_or(bound, |u| u.min(bound)));
        }
        match (lower, upper) {
            (Some(l), Some(u)) => Ok(Some((l, u))),
            _ => Err(PolyError::UnboundedDomain(format!(
                "dimension '{}' of {} has no {} bound",
                self.space.dim_names.get(k).cloned().unwrap_or_default(),
                self.space.tuple_string(),
                if lower.is_none() { "lower" } else { "upper" }
            ))),
        }
    }

    /// Walk integer points in lexicographic order until `visit` returns false.
    fn scan(&self, params: &[i64], visit: &mut dyn FnMut(&[i64]) -> bool) -> PolyResult<()> {
        let system = self.instantiate(params)?;
        if system.is_known_infeasible() {
            return Ok(());
        }
        if self.n_dim() == 0 {
            if system.contains(&[], &[])? {
                visit(&[]);
            }
            return Ok(());
        }
        let shadows = Self::prefix_shadows(&system)?;
        // an infeasible shadow has no constraints left to bound with
        if shadows.iter().any(ConstraintSystem::is_known_infeasible) {
            return Ok(());
        }
        let mut prefix = Vec::with_capacity(self.n_dim());
        self.scan_level(&system, &shadows, &mut prefix, visit)?;
        Ok(())
    }

    fn scan_level(
        &self,
        system: &ConstraintSystem,
        shadows: &[ConstraintSystem],
        prefix: &mut Vec<i64>,
        visit: &mut dyn FnMut(&[i64]) -> bool,
    ) -> PolyResult<bool> {
        let k = prefix.len();
        if k == shadows.len() {
            if system.contains(prefix, &[])? {
                return Ok(visit(prefix));
            }
            return Ok(true);
        }
        let Some((lo, hi)) = self.dim_range(&shadows[k], k, prefix)? else {
            return Ok(true);
        };
        let mut v = lo;
        while v <= hi {
            prefix.push(v);
            let keep_going = self.scan_level(system, shadows, prefix, visit)?;
            prefix.pop();
            if !keep_going {
                return Ok(false);
            }
            v = math::add(v, 1)?;
        }
        Ok(true)
    }

    /// Lexicographically smallest integer point for the given parameters.
    pub fn lexmin(&self, params: &[i64]) -> PolyResult<Option<Vec<i64>>> {
        let mut found = None;
        self.scan(params, &mut |p: &[i64]| {
            found = Some(p.to_vec());
            false
        })?;
        Ok(found)
    }

    /// Constraints joined by `and`.
    pub fn constraints_text(&self) -> String {
        if self.constraints.is_known_infeasible() {
            return "false".to_string();
        }
        let constraints = self.constraints.constraints();
        if constraints.is_empty() {
            return "true".to_string();
        }
        constraints
            .iter()
            .map(|c| c.to_string_with_names(&self.space.dim_names, &self.space.param_names))
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

impl fmt::Display for BasicSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Set::from_basic(self.clone()), f)
    }
}

/// A finite union of basic sets sharing one space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Set {
    pub space: Space,
    basic_sets: Vec<BasicSet>,
}

impl Set {
    /// The set with no points.
    pub fn empty(space: Space) -> Self {
        Self { space, basic_sets: Vec::new() }
    }

    /// The set of all points of the space.
    pub fn universe(space: Space) -> Self {
        Self {
            basic_sets: vec![BasicSet::universe(space.clone())],
            space,
        }
    }

    pub fn from_basic(basic: BasicSet) -> Self {
        let mut set = Self::empty(basic.space.clone());
        set.add_disjunct(basic);
        set
    }

    pub fn n_dim(&self) -> usize { self.space.n_dim() }
    pub fn n_param(&self) -> usize { self.space.n_param() }
    pub fn name(&self) -> &str { self.space.tuple_name() }
    pub fn basic_sets(&self) -> &[BasicSet] { &self.basic_sets }

    /// Add a disjunct over the same space. Contradictory disjuncts are
    /// dropped and a universe disjunct absorbs all others.
    pub fn add_disjunct(&mut self, basic: BasicSet) {
        if basic.constraints.is_known_infeasible() {
            return;
        }
        if self.basic_sets.iter().any(BasicSet::is_universe) {
            return;
        }
        if basic.is_universe() {
            self.basic_sets = vec![basic];
            return;
        }
        if !self.basic_sets.contains(&basic) {
            self.basic_sets.push(basic);
        }
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> PolyResult<()> {
        let old = std::mem::take(&mut self.basic_sets);
        for mut b in old {
            b.add_constraint(constraint.clone())?;
            self.add_disjunct(b);
        }
        Ok(())
    }

    /// Re-express over a parameter tuple that contains all current parameters.
    pub fn align_params(&self, params: &[String]) -> PolyResult<Set> {
        let mut result = Set::empty(self.space.with_params(params.to_vec()));
        for b in &self.basic_sets {
            result.add_disjunct(b.align_params(params)?);
        }
        Ok(result)
    }

    /// Bring two sets over the same parameter tuple and check their tuples.
    fn aligned(&self, other: &Set) -> PolyResult<(Set, Set)> {
        self.space.check_same_tuple(&other.space)?;
        let params = self.space.merged_params(&other.space.param_names);
        Ok((self.align_params(&params)?, other.align_params(&params)?))
    }

    /// Points in both sets.
    pub fn intersect(&self, other: &Set) -> PolyResult<Set> {
        let (a, b) = self.aligned(other)?;
        let mut result = Set::empty(a.space.clone());
        for x in &a.basic_sets {
            for y in &b.basic_sets {
                result.add_disjunct(x.intersect(y)?);
            }
        }
        Ok(result)
    }

    /// Points in either set.
    pub fn union(&self, other: &Set) -> PolyResult<Set> {
        let (mut a, b) = self.aligned(other)?;
        for y in b.basic_sets {
            a.add_disjunct(y);
        }
        Ok(a)
    }

    /// Restrict parameter `param` to `value`; the parameter stays in the space.
    pub fn fix_param(&self, param: usize, value: i64) -> PolyResult<Set> {
        if param >= self.n_param() {
            return Err(PolyError::schema(
                SchemaErrorKind::UnknownParameter,
                format!(
                    "parameter index {} out of range for [{}]",
                    param,
                    self.space.param_names.join(", ")
                ),
            ));
        }
        let mut expr = AffineExpr::param(param, self.n_dim(), self.n_param());
        expr.constant = math::neg(value)?;
        let mut result = self.clone();
        result.add_constraint(Constraint::eq_zero(expr))?;
        Ok(result)
    }

    /// [`Set::fix_param`] by parameter name.
    pub fn fix_param_by_name(&self, name: &str, value: i64) -> PolyResult<Set> {
        let index = self.space.param_index(name).ok_or_else(|| {
            PolyError::schema(
                SchemaErrorKind::UnknownParameter,
                format!("no parameter named '{}'", name),
            )
        })?;
        self.fix_param(index, value)
    }

    pub fn is_empty(&self) -> PolyResult<bool> {
        for b in &self.basic_sets {
            if !b.is_empty()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn contains(&self, point: &[i64], params: &[i64]) -> PolyResult<bool> {
        for b in &self.basic_sets {
            if b.contains(point, params)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Eliminate the named dimension.
    pub fn project_out(&self, dim_name: &str) -> PolyResult<Set> {
        let dim = self.space.dim_index(dim_name).ok_or_else(|| {
            PolyError::schema(
                SchemaErrorKind::UnknownDimension,
                format!("{} has no dimension '{}'", self.space.tuple_string(), dim_name),
            )
        })?;
        let mut result = Set::empty(self.space.drop_dim(dim));
        for b in &self.basic_sets {
            result.add_disjunct(b.project_out(dim)?);
        }
        Ok(result)
    }

    /// All integer points in lexicographic order.
    pub fn points(&self, params: &[i64]) -> PolyResult<Vec<Vec<i64>>> {
        let mut points = BTreeSet::new();
        for b in &self.basic_sets {
            b.scan(params, &mut |p: &[i64]| {
                points.insert(p.to_vec());
                true
            })?;
        }
        Ok(points.into_iter().collect())
    }

    /// Lexicographically smallest integer point, `None` when empty.
    pub fn lexmin(&self, params: &[i64]) -> PolyResult<Option<Vec<i64>>> {
        let mut best: Option<Vec<i64>> = None;
        for b in &self.basic_sets {
            if let Some(p) = b.lexmin(params)? {
                if best.as_ref().map_or(true, |cur| p < *cur) {
                    best = Some(p);
                }
            }
        }
        Ok(best)
    }

    /// Equivalent set whose disjuncts do not overlap.
    pub fn make_disjoint(&self) -> PolyResult<Set> {
        let mut pieces: Vec<BasicSet> = Vec::new();
        for b in &self.basic_sets {
            let mut fresh = vec![b.clone()];
            for existing in &pieces {
                let mut next = Vec::new();
                for f in &fresh {
                    next.extend(f.subtract(existing)?);
                }
                fresh = next;
            }
            pieces.extend(fresh);
        }
        Ok(Set {
            space: self.space.clone(),
            basic_sets: pieces,
        })
    }

    /// Points of `self` that are not in `other`.
    pub fn subtract(&self, other: &Set) -> PolyResult<Set> {
        let (a, b) = self.aligned(other)?;
        let mut remaining: Vec<BasicSet> = a.basic_sets.clone();
        for y in &b.basic_sets {
            let mut next = Vec::new();
            for x in &remaining {
                next.extend(x.subtract(y)?);
            }
            remaining = next;
        }
        let mut result = Set::empty(a.space.clone());
        for x in remaining {
            result.add_disjunct(x);
        }
        Ok(result)
    }

    /// Whether every point of `self` (for every parameter value) is in `other`.
    pub fn is_subset(&self, other: &Set) -> PolyResult<bool> {
        self.subtract(other)?.is_empty()
    }

    /// Constraint part of the body, `None` for the universe.
    pub fn constraints_string(&self) -> Option<String> {
        if self.basic_sets.len() == 1 && self.basic_sets[0].is_universe() {
            return None;
        }
        if self.basic_sets.is_empty() {
            return Some("false".to_string());
        }
        Some(
            self.basic_sets
                .iter()
                .map(BasicSet::constraints_text)
                .collect::<Vec<_>>()
                .join(" or "),
        )
    }

    /// Body between the braces, e.g. `S[i] : i >= 0 and 99 >= i`.
    pub fn body_string(&self) -> String {
        let constraints = self.constraints_string();
        if self.space.is_params() {
            return format!(": {}", constraints.unwrap_or_else(|| "true".to_string()));
        }
        match constraints {
            Some(c) => format!("{} : {}", self.space.tuple_string(), c),
            None => self.space.tuple_string(),
        }
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{ {} }}", self.space.params_prefix(), self.body_string())
    }
}

impl FromStr for Set {
    type Err = PolyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::frontend::parse_set(s, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(text: &str) -> Set {
        text.parse().unwrap()
    }

    #[test]
    fn test_rectangular_points() {
        let s = set("{ S[i, j] : 0 <= i < 3 and 0 <= j < 2 }");
        let points = s.points(&[]).unwrap();
        assert_eq!(points.len(), 6);
        assert_eq!(points[0], vec![0, 0]);
        assert_eq!(points[5], vec![2, 1]);
        assert!(s.contains(&[2, 1], &[]).unwrap());
        assert!(!s.contains(&[3, 0], &[]).unwrap());
    }

    #[test]
    fn test_fix_param_keeps_parameter() {
        let s = set("[n] -> { S[i] : 0 <= i < n }");
        let fixed = s.fix_param(0, 5).unwrap();
        assert_eq!(fixed.n_param(), 1);
        assert_eq!(fixed.points(&[5]).unwrap().len(), 5);
        assert!(fixed.points(&[6]).unwrap().is_empty());
        assert!(matches!(s.fix_param(3, 1), Err(PolyError::SchemaMismatch(_))));
    }

    #[test]
    fn test_emptiness_and_lexmin() {
        let s = set("{ S[i, j] : 0 <= i <= 4 and 2 <= j <= 3 and i + j >= 5 }");
        assert!(!s.is_empty().unwrap());
        assert_eq!(s.lexmin(&[]).unwrap(), Some(vec![2, 3]));

        let e = set("{ S[i] : i >= 5 and i <= 4 }");
        assert!(e.is_empty().unwrap());
        assert_eq!(e.lexmin(&[]).unwrap(), None);
    }

    #[test]
    fn test_empty_after_elimination() {
        let s = set("{ S[i, j] : 0 <= i <= 3 and j = 5 and j <= 2 }");
        assert!(s.is_empty().unwrap());
        assert_eq!(s.lexmin(&[]).unwrap(), None);
        assert!(s.points(&[]).unwrap().is_empty());

        let p = set("[n] -> { S[i, j] : 0 <= i < n and j = i + 1 and j <= 0 }");
        assert_eq!(p.lexmin(&[4]).unwrap(), None);
        assert!(p.points(&[4]).unwrap().is_empty());
    }

    #[test]
    fn test_project_out() {
        let s = set("{ S[i, j] : 0 <= i <= 4 and i <= j <= i + 2 }");
        let p = s.project_out("i").unwrap();
        assert_eq!(p.n_dim(), 1);
        let pts: Vec<i64> = p.points(&[]).unwrap().into_iter().map(|v| v[0]).collect();
        assert_eq!(pts, (0..=6).collect::<Vec<_>>());
        assert!(matches!(s.project_out("k"), Err(PolyError::SchemaMismatch(_))));
    }

    #[test]
    fn test_union_and_disjoint_pieces() {
        let a = set("{ S[i] : 0 <= i <= 5 }");
        let b = set("{ S[i] : 3 <= i <= 8 }");
        let u = a.union(&b).unwrap();
        assert_eq!(u.points(&[]).unwrap().len(), 9);
        let d = u.make_disjoint().unwrap();
        let mut total = 0;
        for piece in d.basic_sets() {
            total += Set::from_basic(piece.clone()).points(&[]).unwrap().len();
        }
        assert_eq!(total, 9);
    }

    #[test]
    fn test_intersect_aligns_params() {
        let a = set("[n] -> { S[i] : 0 <= i < n }");
        let b = set("[m] -> { S[i] : i >= m }");
        let c = a.intersect(&b).unwrap();
        assert_eq!(c.space.param_names, vec!["n".to_string(), "m".to_string()]);
        assert_eq!(c.points(&[5, 3]).unwrap(), vec![vec![3], vec![4]]);

        let other = set("{ S[i, j] : i = j }");
        assert!(matches!(a.intersect(&other), Err(PolyError::SchemaMismatch(_))));
    }

    #[test]
    fn test_subset_and_subtract() {
        let small = set("[n] -> { S[i] : 0 <= i < n }");
        let big = set("{ S[i] : i >= 0 }");
        assert!(small.is_subset(&big).unwrap());
        assert!(!big.is_subset(&small).unwrap());

        let rest = set("{ S[i] : 0 <= i < 10 }")
            .subtract(&set("{ S[i] : 3 <= i < 5 }"))
            .unwrap();
        assert_eq!(rest.points(&[]).unwrap().len(), 8);
    }

    #[test]
    fn test_unbounded_enumeration() {
        let s = set("{ S[i] : i >= 0 }");
        assert!(matches!(s.points(&[]), Err(PolyError::UnboundedDomain(_))));
    }

    #[test]
    fn test_display() {
        let s = set("[n] -> { S[i] : 0 <= i < n }");
        assert_eq!(s.to_string(), "[n] -> { S[i] : i >= 0 and n >= i + 1 }");
        assert_eq!(set("{ S[i, j] }").to_string(), "{ S[i, j] }");
        assert_eq!(set("{ S[i] : i >= 1 and i <= 0 }").to_string(), "{ S[i] : false }");
        assert_eq!(set("[n] -> { : n >= 0 }").to_string(), "[n] -> { : n >= 0 }");
    }
}
