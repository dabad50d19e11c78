//! Constraint systems and Fourier–Motzkin elimination.
//!
//! A [`ConstraintSystem`] is a conjunction of normalized constraints over
//! `n_var` variables and `n_param` parameters. Every inserted constraint
//! is gcd-tightened, so eliminating a variable computes the integer-tightened
//! rational shadow of the system. This is exact on the unimodular systems
//! produced by rectangular domains and tiling, and conservative (it may
//! report a non-empty shadow) otherwise.
//!
//! Elimination is worst-case doubly exponential in the number of
//! eliminated variables; duplicates and dominated parallel inequalities are
//! dropped on insertion to keep systems small.

use crate::polyhedral::constraint::{Constraint, ConstraintKind, Tightened};
use crate::polyhedral::expr::AffineExpr;
use crate::utils::errors::PolyResult;
use crate::utils::math;
use serde::{Serialize, Deserialize};

/// A conjunction of affine constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSystem {
    /// Number of variables
    pub n_var: usize,
    /// Number of parameters
    pub n_param: usize,
    /// The constraints
    constraints: Vec<Constraint>,
    /// Set once a contradiction was found
    infeasible: bool,
}

impl ConstraintSystem {
    /// Create the universe system.
    pub fn new(n_var: usize, n_param: usize) -> Self {
        Self {
            n_var,
            n_param,
            constraints: Vec::new(),
            infeasible: false,
        }
    }

    /// Create a system from constraints.
    pub fn from_constraints<'a>(
        n_var: usize,
        n_param: usize,
        constraints: impl IntoIterator<Item = &'a Constraint>,
    ) -> PolyResult<Self> {
        let mut system = Self::new(n_var, n_param);
        for c in constraints {
            system.add(c.clone())?;
        }
        Ok(system)
    }

    /// The constraints, empty when a contradiction was found.
    pub fn constraints(&self) -> &[Constraint] {
        if self.infeasible {
            &[]
        } else {
            &self.constraints
        }
    }

    /// Whether a contradiction has already been derived.
    pub fn is_known_infeasible(&self) -> bool {
        self.infeasible
    }

    /// Mark the system as contradictory.
    pub fn set_infeasible(&mut self) {
        self.infeasible = true;
        self.constraints.clear();
    }

    /// Add a constraint, normalizing it and dropping duplicates.
    pub fn add(&mut self, constraint: Constraint) -> PolyResult<()> {
        if self.infeasible {
            return Ok(());
        }
        let mut constraint = constraint;
        constraint.expr.coeffs.resize(self.n_var, 0);
        constraint.expr.param_coeffs.resize(self.n_param, 0);
        let c = match constraint.normalize()? {
            Tightened::True => return Ok(()),
            Tightened::False => {
                self.set_infeasible();
                return Ok(());
            }
            Tightened::Keep(c) => c,
        };
        if c.is_equality() {
            if !self.constraints.contains(&c) {
                self.constraints.push(c);
            }
            return Ok(());
        }
        for existing in self.constraints.iter_mut() {
            if existing.is_inequality() && same_linear_part(&existing.expr, &c.expr, 1) {
                if c.expr.constant < existing.expr.constant {
                    existing.expr.constant = c.expr.constant;
                }
                return Ok(());
            }
        }
        // e + c1 >= 0 together with -e + c2 >= 0
        let opposite = self
            .constraints
            .iter()
            .position(|o| o.is_inequality() && same_linear_part(&o.expr, &c.expr, -1));
        if let Some(pos) = opposite {
            let sum = math::add(self.constraints[pos].expr.constant, c.expr.constant)?;
            if sum < 0 {
                self.set_infeasible();
                return Ok(());
            }
            if sum == 0 {
                self.constraints.remove(pos);
                return self.add(Constraint::eq_zero(c.expr));
            }
        }
        self.constraints.push(c);
        Ok(())
    }

    /// Append a variable column and return its index.
    pub fn add_var(&mut self) -> usize {
        for c in self.constraints.iter_mut() {
            c.expr.push_var();
        }
        self.n_var += 1;
        self.n_var - 1
    }

    /// Remove a variable column. The variable must have been eliminated.
    pub fn remove_var(&mut self, var: usize) {
        for c in self.constraints.iter_mut() {
            c.expr.remove_var(var);
        }
        self.n_var = self.n_var.saturating_sub(1);
    }

    /// Replace a variable by an expression that does not mention it.
    pub fn substitute(&mut self, var: usize, def: &AffineExpr) -> PolyResult<()> {
        let old = std::mem::take(&mut self.constraints);
        for c in old {
            let expr = c.expr.substitute(var, def)?;
            self.add(Constraint::new(expr, c.kind))?;
        }
        Ok(())
    }

    /// Replace a parameter by a constant.
    pub fn fix_param(&mut self, param: usize, value: i64) -> PolyResult<()> {
        let old = std::mem::take(&mut self.constraints);
        for c in old {
            let expr = c.expr.fix_param(param, value)?;
            self.add(Constraint::new(expr, c.kind))?;
        }
        Ok(())
    }

    /// Eliminate a variable, leaving its column at coefficient zero.
    ///
    /// An equality mentioning the variable is used as a pivot when one
    /// exists; otherwise every lower bound is combined with every upper
    /// bound.
    pub fn eliminate(&mut self, var: usize) -> PolyResult<()> {
        if self.infeasible {
            return Ok(());
        }
        let constraints = std::mem::take(&mut self.constraints);
        let pivot = constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_equality() && c.expr.coeff(var) != 0)
            .min_by_key(|(_, c)| c.expr.coeff(var).unsigned_abs())
            .map(|(i, _)| i);

        if let Some(p) = pivot {
            let eq = constraints[p].expr.clone();
            let a = eq.coeff(var);
            for (i, c) in constraints.into_iter().enumerate() {
                if i == p {
                    continue;
                }
                let b = c.expr.coeff(var);
                if b == 0 {
                    self.add(c)?;
                    continue;
                }
                let factor = math::neg(math::mul(a.signum(), b)?)?;
                let expr = c.expr.checked_scale(a.abs())?.add_scaled(&eq, factor)?;
                self.add(Constraint::new(expr, c.kind))?;
            }
            return Ok(());
        }

        let mut lower = Vec::new();
        let mut upper = Vec::new();
        for c in constraints {
            let b = c.expr.coeff(var);
            if b > 0 {
                lower.push(c);
            } else if b < 0 {
                upper.push(c);
            } else {
                self.add(c)?;
            }
        }
        for l in &lower {
            for u in &upper {
                let a = l.expr.coeff(var);
                let b = math::neg(u.expr.coeff(var))?;
                let expr = l.expr.checked_scale(b)?.add_scaled(&u.expr, a)?;
                self.add(Constraint::ge_zero(expr))?;
            }
        }
        Ok(())
    }

    /// Eliminate every variable for which `drop` holds.
    pub fn project_out(&self, drop: impl Fn(usize) -> bool) -> PolyResult<Self> {
        let mut system = self.clone();
        for var in 0..self.n_var {
            if drop(var) {
                system.eliminate(var)?;
            }
        }
        Ok(system)
    }

    /// Move parameters to trailing variable columns.
    fn params_as_vars(&self) -> Self {
        let n_var = self.n_var + self.n_param;
        let constraints = self
            .constraints
            .iter()
            .map(|c| {
                let mut coeffs = c.expr.coeffs.clone();
                coeffs.extend_from_slice(&c.expr.param_coeffs);
                Constraint::new(
                    AffineExpr {
                        coeffs,
                        param_coeffs: Vec::new(),
                        constant: c.expr.constant,
                    },
                    c.kind,
                )
            })
            .collect();
        Self {
            n_var,
            n_param: 0,
            constraints,
            infeasible: self.infeasible,
        }
    }

    /// Whether the system has no solution for any parameter value.
    pub fn is_empty(&self) -> PolyResult<bool> {
        if self.infeasible {
            return Ok(true);
        }
        let mut system = self.params_as_vars();
        for var in 0..system.n_var {
            system.eliminate(var)?;
            if system.infeasible {
                return Ok(true);
            }
        }
        Ok(system.infeasible)
    }

    /// Whether every solution of the system satisfies `constraint`.
    pub fn implies(&self, constraint: &Constraint) -> PolyResult<bool> {
        for ineq in constraint.as_inequalities()? {
            let mut system = self.clone();
            system.add(ineq.negate()?)?;
            if !system.is_empty()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Inequalities bounding `var` from below (positive coefficient) and
    /// above (negative coefficient). Equalities contribute to both.
    pub fn bounds(&self, var: usize) -> PolyResult<(Vec<AffineExpr>, Vec<AffineExpr>)> {
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        for c in self.constraints() {
            let a = c.expr.coeff(var);
            if a == 0 {
                continue;
            }
            let exprs = match c.kind {
                ConstraintKind::Inequality => vec![c.expr.clone()],
                ConstraintKind::Equality => vec![c.expr.clone(), c.expr.checked_neg()?],
            };
            for e in exprs {
                if e.coeff(var) > 0 {
                    lower.push(e);
                } else {
                    upper.push(e);
                }
            }
        }
        Ok((lower, upper))
    }

    /// Evaluate all constraints at a point.
    pub fn contains(&self, var_values: &[i64], param_values: &[i64]) -> PolyResult<bool> {
        if self.infeasible {
            return Ok(false);
        }
        for c in &self.constraints {
            if !c.is_satisfied(var_values, param_values)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Whether `a` and `sign * b` agree on every variable and parameter.
fn same_linear_part(a: &AffineExpr, b: &AffineExpr, sign: i64) -> bool {
    a.coeffs.len() == b.coeffs.len()
        && a.param_coeffs.len() == b.param_coeffs.len()
        && a.coeffs.iter().zip(&b.coeffs).all(|(x, y)| *x == sign * *y)
        && a.param_coeffs.iter().zip(&b.param_coeffs).all(|(x, y)| *x == sign * *y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ineq(coeffs: &[i64], constant: i64) -> Constraint {
        Constraint::ge_zero(AffineExpr {
            coeffs: coeffs.to_vec(),
            param_coeffs: Vec::new(),
            constant,
        })
    }

    fn eq(coeffs: &[i64], constant: i64) -> Constraint {
        Constraint::eq_zero(AffineExpr {
            coeffs: coeffs.to_vec(),
            param_coeffs: Vec::new(),
            constant,
        })
    }

    #[test]
    fn test_fm_tile_bounds() {
        // vars: i, c ; 0 <= i <= 99, i - 32c >= 0, -i + 32c + 31 >= 0
        let sys = ConstraintSystem::from_constraints(
            2,
            0,
            &[
                ineq(&[1, 0], 0),
                ineq(&[-1, 0], 99),
                ineq(&[1, -32], 0),
                ineq(&[-1, 32], 31),
            ],
        )
        .unwrap();
        let projected = sys.project_out(|v| v == 0).unwrap();
        let (lower, upper) = projected.bounds(1).unwrap();
        assert_eq!(lower, vec![AffineExpr { coeffs: vec![0, 1], param_coeffs: vec![], constant: 0 }]);
        assert_eq!(upper, vec![AffineExpr { coeffs: vec![0, -1], param_coeffs: vec![], constant: 3 }]);
    }

    #[test]
    fn test_emptiness() {
        let sys = ConstraintSystem::from_constraints(1, 0, &[ineq(&[1], -5), ineq(&[-1], 4)]).unwrap();
        assert!(sys.is_empty().unwrap());
        assert!(sys.is_known_infeasible());

        let sys = ConstraintSystem::from_constraints(
            2,
            0,
            &[ineq(&[1, -1], 0), ineq(&[0, 1], -3), ineq(&[-1, 0], 2)],
        )
        .unwrap();
        assert!(sys.is_empty().unwrap());
    }

    #[test]
    fn test_opposite_inequalities_become_equality() {
        let sys = ConstraintSystem::from_constraints(1, 0, &[ineq(&[1], -5), ineq(&[-1], 5)]).unwrap();
        assert_eq!(sys.constraints(), &[eq(&[1], -5)]);
    }

    #[test]
    fn test_equality_pivot() {
        // c - 2i = 0, 0 <= i <= 9  ==>  0 <= c <= 18
        let sys = ConstraintSystem::from_constraints(
            2,
            0,
            &[eq(&[-2, 1], 0), ineq(&[1, 0], 0), ineq(&[-1, 0], 9)],
        )
        .unwrap();
        let projected = sys.project_out(|v| v == 0).unwrap();
        assert!(projected.contains(&[0, 18], &[]).unwrap());
        assert!(!projected.contains(&[0, 19], &[]).unwrap());
        assert!(!projected.contains(&[0, -1], &[]).unwrap());
    }

    #[test]
    fn test_implication() {
        let sys = ConstraintSystem::from_constraints(1, 0, &[ineq(&[1], -2)]).unwrap();
        assert!(sys.implies(&ineq(&[1], 0)).unwrap());
        assert!(!sys.implies(&ineq(&[1], -3)).unwrap());
        assert!(!sys.implies(&eq(&[1], -2)).unwrap());
    }

    #[test]
    fn test_parametric_emptiness() {
        // 0 <= i <= n - 1 is non-empty for some n
        let mut lower = AffineExpr::var(0, 1, 1);
        lower.constant = 0;
        let mut upper = AffineExpr::param(0, 1, 1);
        upper.coeffs[0] = -1;
        upper.constant = -1;
        let sys = ConstraintSystem::from_constraints(
            1,
            1,
            &[Constraint::ge_zero(lower), Constraint::ge_zero(upper)],
        )
        .unwrap();
        assert!(!sys.is_empty().unwrap());
    }
}
