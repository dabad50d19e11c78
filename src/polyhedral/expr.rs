//! Affine expressions for polyhedral representation.
//!
//! An affine expression is a linear combination of variables and
//! parameters plus a constant:
//! `aff(x, p) = c0 + c1*x1 + ... + cn*xn + d1*p1 + ... + dm*pm`
//!
//! Variables are set dimensions for sets and maps, and arbitrary columns
//! (dimensions, floor locals, loop iterators) inside the AST builder.
//! All arithmetic is checked.

use crate::utils::errors::PolyResult;
use crate::utils::math;
use serde::{Serialize, Deserialize};

/// An affine expression: constant + sum(coeff[i] * var[i]) + sum(param_coeff[j] * param[j])
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AffineExpr {
    /// Coefficients for each variable (index = variable index)
    pub coeffs: Vec<i64>,
    /// Coefficients for parameters (index = parameter index)
    pub param_coeffs: Vec<i64>,
    /// Constant term
    pub constant: i64,
}

impl AffineExpr {
    /// Create a zero expression.
    pub fn zero(n_var: usize, n_param: usize) -> Self {
        Self {
            coeffs: vec![0; n_var],
            param_coeffs: vec![0; n_param],
            constant: 0,
        }
    }

    /// Create a constant expression.
    pub fn constant(value: i64, n_var: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_var, n_param);
        expr.constant = value;
        expr
    }

    /// Create an expression for a single variable.
    pub fn var(var: usize, n_var: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_var, n_param);
        if var < n_var {
            expr.coeffs[var] = 1;
        }
        expr
    }

    /// Create an expression for a parameter.
    pub fn param(param: usize, n_var: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_var, n_param);
        if param < n_param {
            expr.param_coeffs[param] = 1;
        }
        expr
    }

    /// Number of variables.
    pub fn n_var(&self) -> usize {
        self.coeffs.len()
    }

    /// Number of parameters.
    pub fn n_param(&self) -> usize {
        self.param_coeffs.len()
    }

    /// Coefficient of a variable.
    pub fn coeff(&self, var: usize) -> i64 {
        self.coeffs.get(var).copied().unwrap_or(0)
    }

    /// Coefficient of a parameter.
    pub fn param_coeff(&self, param: usize) -> i64 {
        self.param_coeffs.get(param).copied().unwrap_or(0)
    }

    /// Whether any variable has a non-zero coefficient.
    pub fn has_vars(&self) -> bool {
        self.coeffs.iter().any(|&c| c != 0)
    }

    /// Whether any parameter has a non-zero coefficient.
    pub fn has_params(&self) -> bool {
        self.param_coeffs.iter().any(|&c| c != 0)
    }

    /// Check if this is a constant expression.
    pub fn is_constant(&self) -> bool {
        !self.has_vars() && !self.has_params()
    }

    /// Check if this expression is zero.
    pub fn is_zero(&self) -> bool {
        self.constant == 0 && self.is_constant()
    }

    /// Get the constant value if this is a constant expression.
    pub fn as_constant(&self) -> Option<i64> {
        if self.is_constant() {
            Some(self.constant)
        } else {
            None
        }
    }

    /// Indices of variables with a non-zero coefficient.
    pub fn vars(&self) -> impl Iterator<Item = usize> + '_ {
        self.coeffs
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != 0)
            .map(|(i, _)| i)
    }

    /// Gcd of variable and parameter coefficients (0 for constants).
    pub fn content(&self) -> PolyResult<i64> {
        let g = math::gcd_all(&self.coeffs)?;
        self.param_coeffs.iter().try_fold(g, |g, &c| math::gcd(g, c))
    }

    /// `self + factor * other`
    pub fn add_scaled(&self, other: &AffineExpr, factor: i64) -> PolyResult<Self> {
        let n_var = self.n_var().max(other.n_var());
        let n_param = self.n_param().max(other.n_param());
        let mut result = Self::zero(n_var, n_param);
        for i in 0..n_var {
            result.coeffs[i] = math::mul_add(other.coeff(i), factor, self.coeff(i))?;
        }
        for i in 0..n_param {
            result.param_coeffs[i] = math::mul_add(other.param_coeff(i), factor, self.param_coeff(i))?;
        }
        result.constant = math::mul_add(other.constant, factor, self.constant)?;
        Ok(result)
    }

    /// `self + other`
    pub fn checked_add(&self, other: &AffineExpr) -> PolyResult<Self> {
        self.add_scaled(other, 1)
    }

    /// `self - other`
    pub fn checked_sub(&self, other: &AffineExpr) -> PolyResult<Self> {
        self.add_scaled(other, -1)
    }

    /// Scale the expression by a constant.
    pub fn checked_scale(&self, factor: i64) -> PolyResult<Self> {
        Ok(Self {
            coeffs: self
                .coeffs
                .iter()
                .map(|&c| math::mul(c, factor))
                .collect::<PolyResult<_>>()?,
            param_coeffs: self
                .param_coeffs
                .iter()
                .map(|&c| math::mul(c, factor))
                .collect::<PolyResult<_>>()?,
            constant: math::mul(self.constant, factor)?,
        })
    }

    /// `-self`
    pub fn checked_neg(&self) -> PolyResult<Self> {
        self.checked_scale(-1)
    }

    /// Add a constant.
    pub fn add_constant(&self, value: i64) -> PolyResult<Self> {
        let mut result = self.clone();
        result.constant = math::add(result.constant, value)?;
        Ok(result)
    }

    /// Divide every coefficient and the constant exactly.
    ///
    /// Returns `None` if some term is not a multiple of `divisor`.
    pub fn exact_div(&self, divisor: i64) -> Option<Self> {
        if divisor == 0 {
            return None;
        }
        let divides = |c: &i64| c % divisor == 0;
        if !self.coeffs.iter().all(divides)
            || !self.param_coeffs.iter().all(divides)
            || !divides(&self.constant)
        {
            return None;
        }
        Some(Self {
            coeffs: self.coeffs.iter().map(|c| c / divisor).collect(),
            param_coeffs: self.param_coeffs.iter().map(|c| c / divisor).collect(),
            constant: self.constant / divisor,
        })
    }

    /// Evaluate the expression given concrete values.
    pub fn evaluate(&self, var_values: &[i64], param_values: &[i64]) -> PolyResult<i64> {
        let mut result = self.constant;
        for (i, &c) in self.coeffs.iter().enumerate() {
            if c != 0 {
                let v = var_values.get(i).copied().unwrap_or(0);
                result = math::mul_add(c, v, result)?;
            }
        }
        for (i, &c) in self.param_coeffs.iter().enumerate() {
            if c != 0 {
                let v = param_values.get(i).copied().unwrap_or(0);
                result = math::mul_add(c, v, result)?;
            }
        }
        Ok(result)
    }

    /// Replace variable `var` by `def`, which must not mention `var`.
    pub fn substitute(&self, var: usize, def: &AffineExpr) -> PolyResult<Self> {
        let c = self.coeff(var);
        if c == 0 {
            return Ok(self.clone());
        }
        let mut base = self.clone();
        base.coeffs[var] = 0;
        base.add_scaled(def, c)
    }

    /// Replace parameter `param` by a constant.
    pub fn fix_param(&self, param: usize, value: i64) -> PolyResult<Self> {
        let c = self.param_coeff(param);
        if c == 0 {
            return Ok(self.clone());
        }
        let mut result = self.clone();
        result.param_coeffs[param] = 0;
        result.constant = math::mul_add(c, value, result.constant)?;
        Ok(result)
    }

    /// Append a variable with coefficient zero.
    pub fn push_var(&mut self) {
        self.coeffs.push(0);
    }

    /// Remove a variable column.
    pub fn remove_var(&mut self, var: usize) {
        if var < self.coeffs.len() {
            self.coeffs.remove(var);
        }
    }

    /// Move parameter coefficients to their positions in a new parameter tuple.
    pub fn remap_params(&self, mapping: &[usize], n_param: usize) -> Self {
        let mut param_coeffs = vec![0; n_param];
        for (old, &new) in mapping.iter().enumerate() {
            if new < n_param {
                param_coeffs[new] = self.param_coeff(old);
            }
        }
        Self {
            coeffs: self.coeffs.clone(),
            param_coeffs,
            constant: self.constant,
        }
    }

    /// Terms with non-zero coefficient, variables before parameters.
    pub fn named_terms(&self, var_names: &[String], param_names: &[String]) -> Vec<(i64, String)> {
        let mut terms = Vec::new();
        for (i, &c) in self.coeffs.iter().enumerate() {
            if c != 0 {
                let name = var_names.get(i).cloned().unwrap_or_else(|| format!("x{}", i));
                terms.push((c, name));
            }
        }
        for (i, &c) in self.param_coeffs.iter().enumerate() {
            if c != 0 {
                let name = param_names.get(i).cloned().unwrap_or_else(|| format!("p{}", i));
                terms.push((c, name));
            }
        }
        terms
    }

    /// Convert to string with given variable and parameter names.
    pub fn to_string_with_names(&self, var_names: &[String], param_names: &[String]) -> String {
        format_linear(&self.named_terms(var_names, param_names), self.constant)
    }
}

/// Format `c1*t1 + c2*t2 + ... + constant` with variables first and the
/// constant last, e.g. `32*i0 + 31` or `-i + n - 1`.
pub fn format_linear(terms: &[(i64, String)], constant: i64) -> String {
    let mut out = String::new();
    for (c, name) in terms.iter().filter(|(c, _)| *c != 0) {
        let magnitude = c.unsigned_abs();
        if out.is_empty() {
            if *c < 0 {
                out.push('-');
            }
        } else if *c < 0 {
            out.push_str(" - ");
        } else {
            out.push_str(" + ");
        }
        if magnitude != 1 {
            out.push_str(&format!("{}*", magnitude));
        }
        out.push_str(name);
    }
    if out.is_empty() {
        return constant.to_string();
    }
    if constant > 0 {
        out.push_str(&format!(" + {}", constant));
    } else if constant < 0 {
        out.push_str(&format!(" - {}", constant.unsigned_abs()));
    }
    out
}
