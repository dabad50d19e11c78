//! Linear constraints for polyhedral representation.
//!
//! A constraint is a linear inequality or equality:
//! - Inequality: expr >= 0
//! - Equality: expr = 0

use crate::polyhedral::expr::{format_linear, AffineExpr};
use crate::utils::errors::PolyResult;
use crate::utils::math;
use serde::{Serialize, Deserialize};

/// A linear constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    /// The affine expression (constraint is: expr >= 0 or expr = 0)
    pub expr: AffineExpr,
    /// Kind of constraint
    pub kind: ConstraintKind,
}

/// Kind of constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Greater than or equal: expr >= 0
    Inequality,
    /// Equal: expr = 0
    Equality,
}

/// Outcome of normalizing a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tightened {
    /// Holds for every point
    True,
    /// Holds for no point
    False,
    /// Non-trivial normalized constraint
    Keep(Constraint),
}

impl Constraint {
    /// Create a new constraint.
    pub fn new(expr: AffineExpr, kind: ConstraintKind) -> Self {
        Self { expr, kind }
    }

    /// Create an inequality constraint: expr >= 0
    pub fn ge_zero(expr: AffineExpr) -> Self {
        Self::new(expr, ConstraintKind::Inequality)
    }

    /// Create an equality constraint: expr = 0
    pub fn eq_zero(expr: AffineExpr) -> Self {
        Self::new(expr, ConstraintKind::Equality)
    }

    /// Create a constraint: lhs >= rhs
    pub fn ge(lhs: &AffineExpr, rhs: &AffineExpr) -> PolyResult<Self> {
        Ok(Self::ge_zero(lhs.checked_sub(rhs)?))
    }

    /// Create a constraint: lhs <= rhs
    pub fn le(lhs: &AffineExpr, rhs: &AffineExpr) -> PolyResult<Self> {
        Ok(Self::ge_zero(rhs.checked_sub(lhs)?))
    }

    /// Create a constraint: lhs = rhs
    pub fn eq(lhs: &AffineExpr, rhs: &AffineExpr) -> PolyResult<Self> {
        Ok(Self::eq_zero(lhs.checked_sub(rhs)?))
    }

    /// The always-false constraint `-1 >= 0`.
    pub fn falsum(n_var: usize, n_param: usize) -> Self {
        Self::ge_zero(AffineExpr::constant(-1, n_var, n_param))
    }

    /// Check if this is an equality constraint.
    pub fn is_equality(&self) -> bool {
        matches!(self.kind, ConstraintKind::Equality)
    }

    /// Check if this is an inequality constraint.
    pub fn is_inequality(&self) -> bool {
        matches!(self.kind, ConstraintKind::Inequality)
    }

    /// Check if this constraint is satisfied by the given point.
    pub fn is_satisfied(&self, var_values: &[i64], param_values: &[i64]) -> PolyResult<bool> {
        let value = self.expr.evaluate(var_values, param_values)?;
        Ok(match self.kind {
            ConstraintKind::Inequality => value >= 0,
            ConstraintKind::Equality => value == 0,
        })
    }

    /// Integer complement of an inequality: `expr >= 0` becomes `-expr - 1 >= 0`.
    ///
    /// An equality has no single-constraint complement; callers split it
    /// into `expr >= 1` and `expr <= -1`.
    pub fn negate(&self) -> PolyResult<Self> {
        Ok(Self::ge_zero(self.expr.checked_neg()?.add_constant(-1)?))
    }

    /// The two inequalities `expr >= 0` and `-expr >= 0` of an equality.
    pub fn as_inequalities(&self) -> PolyResult<Vec<Self>> {
        match self.kind {
            ConstraintKind::Inequality => Ok(vec![self.clone()]),
            ConstraintKind::Equality => Ok(vec![
                Self::ge_zero(self.expr.clone()),
                Self::ge_zero(self.expr.checked_neg()?),
            ]),
        }
    }

    /// Divide by the coefficient gcd, tightening the constant of
    /// inequalities, and detect trivially true or false constraints.
    ///
    /// Equalities are sign-normalized so that the first non-zero
    /// coefficient is positive.
    pub fn normalize(&self) -> PolyResult<Tightened> {
        let g = self.expr.content()?;
        if g == 0 {
            let holds = match self.kind {
                ConstraintKind::Inequality => self.expr.constant >= 0,
                ConstraintKind::Equality => self.expr.constant == 0,
            };
            return Ok(if holds { Tightened::True } else { Tightened::False });
        }
        let mut expr = self.expr.clone();
        for c in expr.coeffs.iter_mut().chain(expr.param_coeffs.iter_mut()) {
            *c /= g;
        }
        match self.kind {
            ConstraintKind::Inequality => {
                expr.constant = math::floor_div(self.expr.constant, g)?;
            }
            ConstraintKind::Equality => {
                if self.expr.constant % g != 0 {
                    return Ok(Tightened::False);
                }
                expr.constant = self.expr.constant / g;
                let leading = expr
                    .coeffs
                    .iter()
                    .chain(expr.param_coeffs.iter())
                    .copied()
                    .find(|&c| c != 0)
                    .unwrap_or(1);
                if leading < 0 {
                    expr = expr.checked_neg()?;
                }
            }
        }
        Ok(Tightened::Keep(Self { expr, kind: self.kind }))
    }

    /// Same constraint with parameters moved to a new parameter tuple.
    pub fn remap_params(&self, mapping: &[usize], n_param: usize) -> Self {
        Self {
            expr: self.expr.remap_params(mapping, n_param),
            kind: self.kind,
        }
    }

    /// Format as `lhs >= rhs` or `lhs = rhs`, moving negative terms to the
    /// right-hand side, e.g. `99 >= i` or `n >= i + 1`.
    pub fn to_string_with_names(&self, var_names: &[String], param_names: &[String]) -> String {
        let terms = self.expr.named_terms(var_names, param_names);
        let lhs_terms: Vec<(i64, String)> = terms.iter().filter(|(c, _)| *c > 0).cloned().collect();
        let rhs_terms: Vec<(i64, String)> = terms
            .iter()
            .filter(|(c, _)| *c < 0)
            .map(|(c, n)| (c.saturating_neg(), n.clone()))
            .collect();
        let constant = self.expr.constant;
        let lhs = side(&lhs_terms, if constant > 0 { constant } else { 0 });
        let rhs = side(&rhs_terms, if constant < 0 { constant.saturating_neg() } else { 0 });
        let op = match self.kind {
            ConstraintKind::Inequality => ">=",
            ConstraintKind::Equality => "=",
        };
        format!("{} {} {}", lhs, op, rhs)
    }
}

fn side(terms: &[(i64, String)], constant: i64) -> String {
    if terms.is_empty() {
        constant.to_string()
    } else {
        format_linear(terms, constant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_tightens_inequalities() {
        // -32*c + 99 >= 0  ==>  -c + 3 >= 0
        let mut e = AffineExpr::var(0, 1, 0);
        e.coeffs[0] = -32;
        e.constant = 99;
        match Constraint::ge_zero(e).normalize().unwrap() {
            Tightened::Keep(c) => {
                assert_eq!(c.expr.coeffs, vec![-1]);
                assert_eq!(c.expr.constant, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_normalize_equalities() {
        // 2*x - 3 = 0 has no integer solution
        let mut e = AffineExpr::var(0, 1, 0);
        e.coeffs[0] = 2;
        e.constant = -3;
        assert_eq!(Constraint::eq_zero(e).normalize().unwrap(), Tightened::False);

        // -2*x + 4 = 0  ==>  x - 2 = 0
        let mut e = AffineExpr::var(0, 1, 0);
        e.coeffs[0] = -2;
        e.constant = 4;
        match Constraint::eq_zero(e).normalize().unwrap() {
            Tightened::Keep(c) => {
                assert_eq!(c.expr.coeffs, vec![1]);
                assert_eq!(c.expr.constant, -2);
            }
            other => panic!("unexpected {:?}", other),
        }

        let trivial = Constraint::ge_zero(AffineExpr::constant(3, 1, 0));
        assert_eq!(trivial.normalize().unwrap(), Tightened::True);
    }

    #[test]
    fn test_display_moves_terms() {
        let vars = names(&["i"]);
        let params = names(&["n"]);
        // -i + n - 1 >= 0
        let mut e = AffineExpr::zero(1, 1);
        e.coeffs[0] = -1;
        e.param_coeffs[0] = 1;
        e.constant = -1;
        let c = Constraint::ge_zero(e);
        assert_eq!(c.to_string_with_names(&vars, &params), "n >= i + 1");

        let mut e = AffineExpr::var(0, 1, 1);
        e.coeffs[0] = -1;
        e.constant = 99;
        assert_eq!(Constraint::ge_zero(e).to_string_with_names(&vars, &params), "99 >= i");

        let c = Constraint::ge_zero(AffineExpr::var(0, 1, 1));
        assert_eq!(c.to_string_with_names(&vars, &params), "i >= 0");
    }

    #[test]
    fn test_negate() {
        let c = Constraint::ge_zero(AffineExpr::var(0, 1, 0));
        let n = c.negate().unwrap();
        assert!(!n.is_satisfied(&[0], &[]).unwrap());
        assert!(n.is_satisfied(&[-1], &[]).unwrap());
    }
}
