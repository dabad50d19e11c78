//! Quasi-affine expressions: affine expressions extended with integer
//! multiples of `floor(e / d)` for positive constants `d`.
//!
//! Schedule functions are quasi-affine. Tiling produces them, and the map
//! parser accepts them.

use crate::polyhedral::expr::{format_linear, AffineExpr};
use crate::utils::errors::{PolyError, PolyResult};
use crate::utils::math;
use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;

/// `floor(numerator / divisor)` with `divisor > 0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FloorDiv {
    pub numerator: Box<QuasiAffineExpr>,
    pub divisor: i64,
}

/// An affine expression plus `sum(k * floor(e / d))` terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuasiAffineExpr {
    /// Affine part over the input dimensions and parameters
    pub affine: AffineExpr,
    /// Floor-division terms with their coefficients
    pub divs: Vec<(i64, FloorDiv)>,
}

impl From<AffineExpr> for QuasiAffineExpr {
    fn from(affine: AffineExpr) -> Self {
        Self { affine, divs: Vec::new() }
    }
}

impl QuasiAffineExpr {
    /// Create a constant expression.
    pub fn constant(value: i64, n_var: usize, n_param: usize) -> Self {
        AffineExpr::constant(value, n_var, n_param).into()
    }

    /// Whether the expression has no floor terms.
    pub fn is_affine(&self) -> bool {
        self.divs.is_empty()
    }

    /// The affine part if the expression has no floor terms.
    pub fn as_affine(&self) -> Option<&AffineExpr> {
        if self.is_affine() {
            Some(&self.affine)
        } else {
            None
        }
    }

    /// Constant value if the expression mentions no variable or parameter.
    pub fn as_constant(&self) -> Option<i64> {
        if self.is_affine() {
            self.affine.as_constant()
        } else {
            None
        }
    }

    /// `floor(self / divisor)`, folded when the division is exact.
    pub fn floor_div(&self, divisor: i64) -> PolyResult<Self> {
        if divisor <= 0 {
            return Err(PolyError::Overflow(format!("floor division by {}", divisor)));
        }
        if divisor == 1 {
            return Ok(self.clone());
        }
        if let Some(value) = self.as_constant() {
            return Ok(Self::constant(
                math::floor_div(value, divisor)?,
                self.affine.n_var(),
                self.affine.n_param(),
            ));
        }
        if self.is_affine() {
            if let Some(exact) = self.affine.exact_div(divisor) {
                return Ok(exact.into());
            }
        }
        let zero = AffineExpr::zero(self.affine.n_var(), self.affine.n_param());
        Ok(Self {
            affine: zero,
            divs: vec![(
                1,
                FloorDiv {
                    numerator: Box::new(self.clone()),
                    divisor,
                },
            )],
        })
    }

    /// `self + factor * other`, merging identical floor terms.
    pub fn add_scaled(&self, other: &QuasiAffineExpr, factor: i64) -> PolyResult<Self> {
        let affine = self.affine.add_scaled(&other.affine, factor)?;
        let mut divs = self.divs.clone();
        for (k, div) in &other.divs {
            let scaled = math::mul(*k, factor)?;
            match divs.iter_mut().find(|(_, d)| d == div) {
                Some(entry) => entry.0 = math::add(entry.0, scaled)?,
                None => divs.push((scaled, div.clone())),
            }
        }
        divs.retain(|(k, _)| *k != 0);
        Ok(Self { affine, divs })
    }

    /// `self + other`
    pub fn checked_add(&self, other: &QuasiAffineExpr) -> PolyResult<Self> {
        self.add_scaled(other, 1)
    }

    /// `self - other`
    pub fn checked_sub(&self, other: &QuasiAffineExpr) -> PolyResult<Self> {
        self.add_scaled(other, -1)
    }

    /// Scale by a constant.
    pub fn checked_scale(&self, factor: i64) -> PolyResult<Self> {
        let zero = Self::constant(0, self.affine.n_var(), self.affine.n_param());
        zero.add_scaled(self, factor)
    }

    /// Evaluate at a point.
    pub fn evaluate(&self, var_values: &[i64], param_values: &[i64]) -> PolyResult<i64> {
        let mut value = self.affine.evaluate(var_values, param_values)?;
        for (k, div) in &self.divs {
            let num = div.numerator.evaluate(var_values, param_values)?;
            let q = math::floor_div(num, div.divisor)?;
            value = math::mul_add(*k, q, value)?;
        }
        Ok(value)
    }

    /// Variables mentioned anywhere in the expression, including numerators.
    pub fn referenced_vars(&self) -> BTreeSet<usize> {
        let mut vars: BTreeSet<usize> = self.affine.vars().collect();
        for (_, div) in &self.divs {
            vars.extend(div.numerator.referenced_vars());
        }
        vars
    }

    /// Same expression with parameters moved to a new parameter tuple.
    pub fn remap_params(&self, mapping: &[usize], n_param: usize) -> Self {
        Self {
            affine: self.affine.remap_params(mapping, n_param),
            divs: self
                .divs
                .iter()
                .map(|(k, d)| {
                    (
                        *k,
                        FloorDiv {
                            numerator: Box::new(d.numerator.remap_params(mapping, n_param)),
                            divisor: d.divisor,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Replace a parameter by a constant everywhere.
    pub fn fix_param(&self, param: usize, value: i64) -> PolyResult<Self> {
        let mut divs = Vec::with_capacity(self.divs.len());
        for (k, d) in &self.divs {
            divs.push((
                *k,
                FloorDiv {
                    numerator: Box::new(d.numerator.fix_param(param, value)?),
                    divisor: d.divisor,
                },
            ));
        }
        Ok(Self {
            affine: self.affine.fix_param(param, value)?,
            divs,
        })
    }

    /// Format with variables first, then floor terms, then the constant,
    /// e.g. `i - 32*floor(i/32)`.
    pub fn to_string_with_names(&self, var_names: &[String], param_names: &[String]) -> String {
        let mut terms = self.affine.named_terms(var_names, param_names);
        for (k, div) in &self.divs {
            let num = div.numerator.to_string_with_names(var_names, param_names);
            let num = if div.numerator.is_single_term() {
                num
            } else {
                format!("({})", num)
            };
            terms.push((*k, format!("floor({}/{})", num, div.divisor)));
        }
        format_linear(&terms, self.affine.constant)
    }

    fn is_single_term(&self) -> bool {
        let n_terms = self.affine.coeffs.iter().chain(&self.affine.param_coeffs).filter(|c| **c != 0).count()
            + self.divs.len();
        let constant_terms = usize::from(self.affine.constant != 0);
        if n_terms + constant_terms != 1 {
            return false;
        }
        // A lone variable or floor term with coefficient one.
        self.affine.coeffs.iter().chain(&self.affine.param_coeffs).all(|c| *c == 0 || *c == 1)
            && self.divs.iter().all(|(k, _)| *k == 1)
            && self.affine.constant >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tile_and_point_members() {
        let i: QuasiAffineExpr = AffineExpr::var(0, 1, 0).into();
        let tile = i.floor_div(32).unwrap();
        let point = i.add_scaled(&tile, -32).unwrap();
        let vars = names(&["i"]);
        assert_eq!(tile.to_string_with_names(&vars, &[]), "floor(i/32)");
        assert_eq!(point.to_string_with_names(&vars, &[]), "i - 32*floor(i/32)");
        assert_eq!(tile.evaluate(&[70], &[]).unwrap(), 2);
        assert_eq!(point.evaluate(&[70], &[]).unwrap(), 6);
        assert_eq!(tile.evaluate(&[-1], &[]).unwrap(), -1);
    }

    #[test]
    fn test_exact_division_folds() {
        let mut e = AffineExpr::var(0, 1, 0);
        e.coeffs[0] = 4;
        let q: QuasiAffineExpr = e.into();
        let d = q.floor_div(2).unwrap();
        assert!(d.is_affine());
        assert_eq!(d.affine.coeffs, vec![2]);
    }

    #[test]
    fn test_compound_numerator_is_parenthesized() {
        let mut e = AffineExpr::var(0, 1, 0);
        e.constant = 1;
        let q: QuasiAffineExpr = e.into();
        let d = q.floor_div(4).unwrap();
        assert_eq!(d.to_string_with_names(&names(&["i"]), &[]), "floor((i + 1)/4)");
        assert_eq!(d.referenced_vars().into_iter().collect::<Vec<_>>(), vec![0]);
    }
}
