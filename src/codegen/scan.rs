//! Scanning systems: one per statement piece.
//!
//! A unit keeps a constraint system whose columns are the statement
//! dimensions, local variables standing for `floor` terms, and the loop
//! iterators introduced so far. Binding an iterator adds the equality
//! `iterator = member`; unit-coefficient equalities are then solved by
//! substitution, so that statement dimensions end up expressed in the
//! iterators. Loop bounds come from projecting every unsolved column out.

use crate::codegen::ast::{AstCondition, AstExpr, AstNode, CmpOp};
use crate::polyhedral::{AffineExpr, BasicSet, Constraint, ConstraintKind, ConstraintSystem, QuasiAffineExpr};
use crate::utils::errors::{PolyError, PolyResult};
use crate::utils::math;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    /// Statement dimension
    Dim(usize),
    /// `floor` term of a schedule member
    Local,
    /// Loop iterator
    Iterator(String),
}

#[derive(Debug, Clone)]
enum Definition {
    /// Column equals the expression
    Affine(AffineExpr),
    /// Column equals `numerator / divisor`, exactly
    Quotient(AffineExpr, i64),
}

/// Candidate bounds of one loop for one unit, each with the inequality it
/// was read from.
#[derive(Debug, Clone)]
pub(crate) struct LoopBounds {
    pub lower: Vec<(AstExpr, Constraint)>,
    pub upper: Vec<(AstExpr, Constraint)>,
}

/// Scanning state of one disjoint piece of one statement domain.
#[derive(Debug, Clone)]
pub(crate) struct ScanUnit {
    pub statement: String,
    pub dim_names: Vec<String>,
    pub param_names: Vec<String>,
    system: ConstraintSystem,
    /// Constraints enforced by the enclosing loops
    context: ConstraintSystem,
    columns: Vec<Column>,
    defs: Vec<Option<Definition>>,
    /// Parameters fixed by an equality of the piece
    fixed: Vec<(usize, i64)>,
    /// Fixing equalities the assumed context does not imply
    pinned: Vec<Constraint>,
    /// `(numerator, divisor, column)` of every local
    divs: Vec<(AffineExpr, i64, usize)>,
    /// `(iterator column, stride, offset)`
    strides: Vec<(usize, i64, i64)>,
}

impl ScanUnit {
    /// Unit for `piece`, or `None` if the piece is empty.
    ///
    /// `assumed` holds the parameter constraints the generated code may
    /// take for granted, over the dimensions and parameters of `piece`.
    /// Every other constraint of the piece, parameter-only ones included,
    /// ends up in a loop bound or a guard.
    pub fn new(statement: &str, piece: &BasicSet, assumed: &ConstraintSystem) -> PolyResult<Option<Self>> {
        let mut system = piece.constraints.clone();
        let mut context = assumed.clone();
        let mut fixed = Vec::new();
        let mut pinned = Vec::new();
        loop {
            let (param, value, eq) = match system
                .constraints()
                .iter()
                .find_map(|c| fixed_param(c).map(|(p, v)| (p, v, c.clone())))
            {
                Some(found) => found,
                None => break,
            };
            log::trace!("{}: parameter {} fixed to {}", statement, piece.space.param_names[param], value);
            if !context.implies(&eq)? {
                pinned.push(eq);
            }
            system.fix_param(param, value)?;
            context.fix_param(param, value)?;
            fixed.push((param, value));
        }
        if system.is_empty()? {
            return Ok(None);
        }
        let n_dim = piece.n_dim();
        Ok(Some(Self {
            statement: statement.to_string(),
            dim_names: piece.space.dim_names.clone(),
            param_names: piece.space.param_names.clone(),
            system,
            context,
            columns: (0..n_dim).map(Column::Dim).collect(),
            defs: vec![None; n_dim],
            fixed,
            pinned,
            divs: Vec::new(),
            strides: Vec::new(),
        }))
    }

    fn n_col(&self) -> usize {
        self.columns.len()
    }

    fn pad(&self, e: &AffineExpr) -> AffineExpr {
        let mut e = e.clone();
        e.coeffs.resize(self.n_col(), 0);
        e.param_coeffs.resize(self.param_names.len(), 0);
        e
    }

    fn column_var(&self, col: usize) -> AffineExpr {
        AffineExpr::var(col, self.n_col(), self.param_names.len())
    }

    fn is_iterator(&self, col: usize) -> bool {
        matches!(self.columns.get(col), Some(Column::Iterator(_)))
    }

    /// Neither an iterator nor solved.
    fn is_free(&self, col: usize) -> bool {
        !self.is_iterator(col) && self.defs.get(col).map_or(false, Option::is_none)
    }

    fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .map(|(col, c)| match c {
                Column::Dim(d) => self.dim_names[*d].clone(),
                Column::Local => format!("q{}", col),
                Column::Iterator(name) => name.clone(),
            })
            .collect()
    }

    fn add_column(&mut self, column: Column) -> usize {
        let col = self.system.add_var();
        self.context.add_var();
        self.columns.push(column);
        self.defs.push(None);
        col
    }

    /// Substitute every solved column.
    fn resolve(&self, e: &AffineExpr) -> PolyResult<AffineExpr> {
        let mut e = self.pad(e);
        for (col, def) in self.defs.iter().enumerate() {
            if let Some(Definition::Affine(def)) = def {
                e = e.substitute(col, def)?;
            }
        }
        Ok(e)
    }

    fn div_column(&mut self, numerator: &AffineExpr, divisor: i64) -> PolyResult<usize> {
        let numerator = self.resolve(numerator)?;
        for (cached, d, col) in &self.divs {
            if *d == divisor && self.resolve(cached)? == numerator {
                return Ok(*col);
            }
        }
        let col = self.add_column(Column::Local);
        let q = self.column_var(col);
        let numerator = self.pad(&numerator);
        // d*q <= e <= d*q + d - 1
        self.system
            .add(Constraint::ge_zero(numerator.add_scaled(&q, -divisor)?))?;
        self.system.add(Constraint::ge_zero(
            q.checked_scale(divisor)?
                .checked_sub(&numerator)?
                .add_constant(divisor - 1)?,
        ))?;
        self.divs.push((numerator, divisor, col));
        Ok(col)
    }

    fn linearize(&mut self, e: &QuasiAffineExpr) -> PolyResult<AffineExpr> {
        let mut result = self.pad(&e.affine);
        for (k, div) in &e.divs {
            let numerator = self.linearize(&div.numerator)?;
            let col = self.div_column(&numerator, div.divisor)?;
            result = self.pad(&result).add_scaled(&self.column_var(col), *k)?;
        }
        Ok(result)
    }

    /// A schedule member as an affine expression over the columns, with
    /// solved columns substituted.
    pub fn member(&mut self, e: &QuasiAffineExpr) -> PolyResult<AffineExpr> {
        let mut e = e.clone();
        for &(param, value) in &self.fixed {
            e = e.fix_param(param, value)?;
        }
        let linear = self.linearize(&e)?;
        self.resolve(&linear)
    }

    /// Split `e` into its iterator terms (named) and the remainder.
    pub fn split_outer(&self, e: &AffineExpr) -> (Vec<(i64, String)>, AffineExpr) {
        let mut outer = Vec::new();
        let mut rest = self.pad(e);
        for (col, column) in self.columns.iter().enumerate() {
            if let Column::Iterator(name) = column {
                let c = rest.coeff(col);
                if c != 0 {
                    outer.push((c, name.clone()));
                    rest.coeffs[col] = 0;
                }
            }
        }
        (outer, rest)
    }

    /// `(k, o)` such that every value of `e` is `o` modulo `k`, when `e`
    /// mentions neither parameters nor iterators.
    pub fn lattice(&self, e: &AffineExpr) -> PolyResult<Option<(i64, i64)>> {
        if e.has_params() || e.vars().any(|col| self.is_iterator(col)) {
            return Ok(None);
        }
        let k = math::gcd_all(&e.coeffs)?;
        if k <= 1 {
            return Ok(None);
        }
        Ok(Some((k, math::floor_mod(e.constant, k)?)))
    }

    /// Add iterator `name` equal to `value` and solve what it determines.
    pub fn add_iterator(&mut self, name: &str, value: &AffineExpr) -> PolyResult<usize> {
        let col = self.add_column(Column::Iterator(name.to_string()));
        let eq = self.column_var(col).checked_sub(&self.pad(value))?;
        self.system.add(Constraint::eq_zero(eq))?;
        self.solve_unit_equalities()?;
        Ok(col)
    }

    /// Turn a free column into iterator `name`.
    pub fn mark_iterator(&mut self, col: usize, name: &str) {
        self.columns[col] = Column::Iterator(name.to_string());
    }

    pub fn record_stride(&mut self, col: usize, stride: i64, offset: i64) {
        self.strides.push((col, stride, offset));
    }

    pub fn add_context(&mut self, constraint: &Constraint) -> PolyResult<()> {
        self.context.add(constraint.clone())
    }

    /// Record `it >= value` (lower) or `it <= value` in the context.
    pub fn add_context_bound(&mut self, col: usize, value: i64, lower: bool) -> PolyResult<()> {
        let it = self.column_var(col);
        let expr = if lower {
            it.add_constant(-value)?
        } else {
            it.checked_neg()?.add_constant(value)?
        };
        self.context.add(Constraint::ge_zero(expr))
    }

    /// Free column to scan next at a leaf: locals first, then dimensions.
    pub fn next_free(&self) -> Option<usize> {
        let local = (0..self.n_col()).find(|&c| self.columns[c] == Column::Local && self.is_free(c));
        local.or_else(|| (0..self.n_col()).find(|&c| matches!(self.columns[c], Column::Dim(_)) && self.is_free(c)))
    }

    /// Dimension name of a column, if it is a dimension.
    pub fn dim_name(&self, col: usize) -> Option<&str> {
        match self.columns.get(col) {
            Some(Column::Dim(d)) => Some(&self.dim_names[*d]),
            _ => None,
        }
    }

    fn unit_equality(&self) -> Option<(usize, Constraint)> {
        let locals = (0..self.n_col()).filter(|&c| self.columns[c] == Column::Local);
        let dims = (0..self.n_col()).filter(|&c| matches!(self.columns[c], Column::Dim(_)));
        for col in locals.chain(dims).filter(|&c| self.is_free(c)) {
            let found = self
                .system
                .constraints()
                .iter()
                .find(|c| c.is_equality() && c.expr.coeff(col).abs() == 1);
            if let Some(c) = found {
                return Some((col, c.clone()));
            }
        }
        None
    }

    /// Solve free columns with a coefficient of one in some equality.
    pub fn solve_unit_equalities(&mut self) -> PolyResult<()> {
        while let Some((col, eq)) = self.unit_equality() {
            let a = eq.expr.coeff(col);
            let mut rest = eq.expr.clone();
            rest.coeffs[col] = 0;
            self.define(col, rest.checked_scale(-a)?)?;
        }
        Ok(())
    }

    fn define(&mut self, col: usize, def: AffineExpr) -> PolyResult<()> {
        let def = self.pad(&def);
        self.system.substitute(col, &def)?;
        self.context.substitute(col, &def)?;
        for existing in self.defs.iter_mut().flatten() {
            match existing {
                Definition::Affine(e) | Definition::Quotient(e, _) => *e = e.substitute(col, &def)?,
            }
        }
        self.defs[col] = Some(Definition::Affine(def));
        Ok(())
    }

    /// Solve equalities until none determines a free column. Columns with
    /// a non-unit coefficient become exact divisions; the returned guards
    /// check divisibility where loop strides do not imply it.
    pub fn settle(&mut self) -> PolyResult<Vec<AstCondition>> {
        let mut guards = Vec::new();
        loop {
            self.solve_unit_equalities()?;
            let found = self.system.constraints().iter().filter(|c| c.is_equality()).find_map(|c| {
                let mut free = c.expr.vars().filter(|&v| self.is_free(v));
                match (free.next(), free.next()) {
                    (Some(col), None) => Some((col, c.expr.clone())),
                    _ => None,
                }
            });
            let (col, eq) = match found {
                Some(found) => found,
                None => return Ok(guards),
            };
            let a = eq.coeff(col);
            let (a, eq) = if a < 0 { (-a, eq.checked_neg()?) } else { (a, eq) };
            let mut numerator = eq;
            numerator.coeffs[col] = 0;
            let numerator = numerator.checked_neg()?;
            if !self.stride_implies(&numerator, a)? {
                guards.push(AstCondition::Divisible {
                    expr: self.to_ast(&numerator),
                    divisor: a,
                });
            }
            self.system.eliminate(col)?;
            self.defs[col] = Some(Definition::Quotient(numerator, a));
        }
    }

    /// Whether loop strides make `e` a multiple of `divisor`.
    fn stride_implies(&self, e: &AffineExpr, divisor: i64) -> PolyResult<bool> {
        if e.param_coeffs.iter().any(|c| c % divisor != 0) {
            return Ok(false);
        }
        let mut residue = e.constant;
        for col in e.vars() {
            let c = e.coeff(col);
            if c % divisor == 0 {
                continue;
            }
            match self.strides.iter().find(|(s, _, _)| *s == col) {
                Some(&(_, k, o)) if math::mul(c, k)? % divisor == 0 => {
                    residue = math::mul_add(c, o, residue)?;
                }
                _ => return Ok(false),
            }
        }
        Ok(math::floor_mod(residue, divisor)? == 0)
    }

    /// Bounds of iterator `col` after projecting out every free column,
    /// or `None` if the unit turned out to be empty.
    pub fn loop_bounds(&self, col: usize) -> PolyResult<Option<LoopBounds>> {
        let projected = self.system.project_out(|v| self.is_free(v))?;
        if projected.is_known_infeasible() {
            return Ok(None);
        }
        let (lowers, uppers) = projected.bounds(col)?;

        let mut lower = Vec::new();
        let mut tightest: Option<(i64, Constraint)> = None;
        for e in lowers {
            let a = e.coeff(col);
            let mut rest = e.clone();
            rest.coeffs[col] = 0;
            // a*it >= -rest
            let numerator = rest.checked_neg()?;
            match numerator.as_constant() {
                Some(v) => {
                    let v = math::ceil_div(v, a)?;
                    if tightest.as_ref().map_or(true, |(best, _)| v > *best) {
                        tightest = Some((v, Constraint::ge_zero(e)));
                    }
                }
                None => {
                    let expr = self.to_ast(&numerator);
                    let expr = if a == 1 { expr } else { AstExpr::CeilDiv(Box::new(expr), a) };
                    if !lower.iter().any(|(x, _)| *x == expr) {
                        lower.push((expr, Constraint::ge_zero(e)));
                    }
                }
            }
        }
        if let Some((v, c)) = tightest {
            lower.insert(0, (AstExpr::int(v), c));
        }

        let mut upper = Vec::new();
        let mut tightest: Option<(i64, Constraint)> = None;
        for e in uppers {
            let a = -e.coeff(col);
            let mut rest = e.clone();
            rest.coeffs[col] = 0;
            // a*it <= rest
            match rest.as_constant() {
                Some(v) => {
                    let v = math::floor_div(v, a)?;
                    if tightest.as_ref().map_or(true, |(best, _)| v < *best) {
                        tightest = Some((v, Constraint::ge_zero(e)));
                    }
                }
                None => {
                    let expr = self.to_ast(&rest);
                    let expr = if a == 1 { expr } else { AstExpr::FloorDiv(Box::new(expr), a) };
                    if !upper.iter().any(|(x, _)| *x == expr) {
                        upper.push((expr, Constraint::ge_zero(e)));
                    }
                }
            }
        }
        if let Some((v, c)) = tightest {
            upper.insert(0, (AstExpr::int(v), c));
        }

        let name = self.column_names()[col].clone();
        if lower.is_empty() {
            return Err(PolyError::UnboundedDomain(format!(
                "no lower bound for {} in statement {}",
                name, self.statement
            )));
        }
        if upper.is_empty() {
            return Err(PolyError::UnboundedDomain(format!(
                "no upper bound for {} in statement {}",
                name, self.statement
            )));
        }
        Ok(Some(LoopBounds { lower, upper }))
    }

    /// Expression over iterators and parameters.
    pub fn to_ast(&self, e: &AffineExpr) -> AstExpr {
        AstExpr::linear(e.named_terms(&self.column_names(), &self.param_names), e.constant)
    }

    fn condition(&self, c: &Constraint) -> AstCondition {
        let terms = c.expr.named_terms(&self.column_names(), &self.param_names);
        let pos: Vec<(i64, String)> = terms.iter().filter(|(k, _)| *k > 0).cloned().collect();
        let neg: Vec<(i64, String)> = terms
            .iter()
            .filter(|(k, _)| *k < 0)
            .map(|(k, n)| (k.saturating_neg(), n.clone()))
            .collect();
        let constant = c.expr.constant;
        let (lhs_const, rhs_const) = if constant > 0 { (constant, 0) } else { (0, constant.saturating_neg()) };
        let lhs = AstExpr::linear(pos, lhs_const);
        let rhs = AstExpr::linear(neg, rhs_const);
        match c.kind {
            ConstraintKind::Equality => AstCondition::Compare { lhs, op: CmpOp::Eq, rhs },
            ConstraintKind::Inequality if lhs.as_constant().is_some() => AstCondition::Compare {
                lhs: rhs,
                op: CmpOp::Le,
                rhs: lhs,
            },
            ConstraintKind::Inequality => AstCondition::Compare { lhs, op: CmpOp::Ge, rhs },
        }
    }

    /// Constraints the enclosing loops do not already enforce.
    pub fn guards(&self) -> PolyResult<Vec<AstCondition>> {
        let mut guards = Vec::new();
        for c in &self.pinned {
            let expr = self.pad(&c.expr);
            guards.push(self.condition(&Constraint::new(expr, c.kind)));
        }
        for c in self.system.constraints() {
            if !self.context.implies(c)? {
                guards.push(self.condition(c));
            }
        }
        Ok(guards)
    }

    fn column_expr(&self, col: usize) -> PolyResult<AstExpr> {
        match (&self.columns[col], &self.defs[col]) {
            (_, Some(Definition::Affine(def))) => self.expr_with_quotients(def),
            (_, Some(Definition::Quotient(numerator, divisor))) => {
                Ok(AstExpr::Div(Box::new(self.expr_with_quotients(numerator)?), *divisor))
            }
            (Column::Iterator(name), None) => Ok(AstExpr::var(name)),
            _ => Err(PolyError::UnboundedDomain(format!(
                "column {} of statement {} was never scanned",
                self.column_names()[col],
                self.statement
            ))),
        }
    }

    fn expr_with_quotients(&self, e: &AffineExpr) -> PolyResult<AstExpr> {
        let mut base = self.pad(e);
        let mut parts = Vec::new();
        for col in e.vars() {
            if let Some(Definition::Quotient(..)) = self.defs[col] {
                let c = base.coeff(col);
                base.coeffs[col] = 0;
                let q = self.column_expr(col)?;
                parts.push(if c == 1 { q } else { q.mul(c) });
            }
        }
        let mut expr = if parts.is_empty() || !base.is_zero() {
            Some(self.to_ast(&base))
        } else {
            None
        };
        for part in parts {
            expr = Some(match expr {
                Some(e) => e.add(part),
                None => part,
            });
        }
        Ok(expr.unwrap_or_else(|| AstExpr::int(0)))
    }

    /// The statement call with every dimension expressed in the iterators.
    pub fn call(&self) -> PolyResult<AstNode> {
        let args = (0..self.dim_names.len())
            .map(|d| self.column_expr(d))
            .collect::<PolyResult<Vec<_>>>()?;
        Ok(AstNode::Call {
            name: self.statement.clone(),
            args,
        })
    }
}

/// `(param, value)` for an equality `±param + c = 0`.
fn fixed_param(c: &Constraint) -> Option<(usize, i64)> {
    if !c.is_equality() || c.expr.has_vars() {
        return None;
    }
    let mut nonzero = c.expr.param_coeffs.iter().enumerate().filter(|(_, k)| **k != 0);
    match (nonzero.next(), nonzero.next()) {
        (Some((param, &a)), None) if a.abs() == 1 => Some((param, c.expr.constant.checked_neg()? * a)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedral::Set;

    fn unit(text: &str) -> ScanUnit {
        let set: Set = text.parse().unwrap();
        let assumed = ConstraintSystem::new(set.n_dim(), set.n_param());
        ScanUnit::new(set.name(), &set.basic_sets()[0], &assumed).unwrap().unwrap()
    }

    #[test]
    fn test_fixed_parameter_is_substituted() {
        let u = unit("[n] -> { S[i] : 0 <= i < n and n = 5 }");
        assert_eq!(u.fixed, vec![(0, 5)]);
        assert_eq!(u.pinned.len(), 1);
        let b = {
            let mut u = u.clone();
            let col = u.next_free().unwrap();
            u.mark_iterator(col, "i");
            u.loop_bounds(col).unwrap().unwrap()
        };
        assert_eq!(b.lower[0].0, AstExpr::int(0));
        assert_eq!(b.upper[0].0, AstExpr::int(4));
    }

    #[test]
    fn test_floor_terms_share_a_local() {
        let mut u = unit("{ S[i] : 0 <= i < 100 }");
        let e = QuasiAffineExpr::from(AffineExpr::var(0, 1, 0)).floor_div(32).unwrap();
        let a = u.member(&e).unwrap();
        let b = u.member(&e).unwrap();
        assert_eq!(a, b);
        assert_eq!(u.n_col(), 2);
    }

    #[test]
    fn test_iterator_solves_dimension() {
        let mut u = unit("{ S[i] : 0 <= i < 10 }");
        let value = u.member(&AffineExpr::var(0, 1, 0).into()).unwrap();
        let col = u.add_iterator("i0", &value).unwrap();
        assert!(!u.is_free(0));
        let b = u.loop_bounds(col).unwrap().unwrap();
        assert_eq!(b.upper[0].0, AstExpr::int(9));
        assert!(matches!(u.call().unwrap(), AstNode::Call { ref args, .. } if args[0] == AstExpr::var("i0")));
    }

    #[test]
    fn test_strided_quotient_needs_no_guard() {
        let mut u = unit("{ S[i] : 0 <= i < 10 }");
        let value = u.member(&AffineExpr::var(0, 1, 0).checked_scale(2).unwrap().into()).unwrap();
        assert_eq!(u.lattice(&value).unwrap(), Some((2, 0)));
        let col = u.add_iterator("i0", &value).unwrap();
        u.record_stride(col, 2, 0);
        assert!(u.settle().unwrap().is_empty());
        let b = u.loop_bounds(col).unwrap().unwrap();
        assert_eq!(b.upper[0].0, AstExpr::int(18));
    }

    #[test]
    fn test_parameter_constraints_become_guards() {
        let mut u = unit("[n] -> { S[i] : 0 <= i < 10 and n >= 5 }");
        let col = u.next_free().unwrap();
        u.mark_iterator(col, "i");
        let b = u.loop_bounds(col).unwrap().unwrap();
        for (_, c) in b.lower.iter().chain(&b.upper) {
            u.add_context(c).unwrap();
        }
        let guards = u.guards().unwrap();
        assert_eq!(guards.len(), 1);
        let env: std::collections::HashMap<String, i64> =
            [("n".to_string(), 4), ("i".to_string(), 0)].into_iter().collect();
        assert!(!guards[0].evaluate(&env).unwrap());

        let set: Set = "[n] -> { S[i] : 0 <= i < n and n = 5 }".parse().unwrap();
        let mut assumed = ConstraintSystem::new(1, 1);
        assumed
            .add(Constraint::eq_zero(AffineExpr::param(0, 1, 1).add_constant(-5).unwrap()))
            .unwrap();
        let u = ScanUnit::new("S", &set.basic_sets()[0], &assumed).unwrap().unwrap();
        assert!(u.pinned.is_empty());
    }

    #[test]
    fn test_unbounded_dimension() {
        let mut u = unit("{ S[i] : i >= 0 }");
        let col = u.next_free().unwrap();
        u.mark_iterator(col, "i");
        assert!(matches!(u.loop_bounds(col), Err(PolyError::UnboundedDomain(_))));
    }
}
