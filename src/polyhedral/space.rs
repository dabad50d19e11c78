//! Polyhedral spaces name the dimensions of sets and maps.
//!
//! A space describes:
//! - An optional tuple name (the statement, e.g. `S` in `S[i, j]`)
//! - Named set dimensions
//! - Named parameters (symbolic constants), identified by name

use crate::utils::errors::{PolyError, PolyResult, SchemaErrorKind};
use serde::{Serialize, Deserialize};
use std::fmt;

/// A named tuple of dimensions over a named parameter tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Space {
    /// Tuple name, `None` for anonymous tuples and parameter-only sets
    pub name: Option<String>,
    /// Names of set dimensions
    pub dim_names: Vec<String>,
    /// Names of parameters
    pub param_names: Vec<String>,
}

impl Space {
    /// Create a named set space.
    pub fn set(name: impl Into<String>, dims: &[&str], params: &[&str]) -> Self {
        Self {
            name: Some(name.into()),
            dim_names: dims.iter().map(|s| s.to_string()).collect(),
            param_names: params.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Create a space with no set dimensions.
    pub fn params(params: Vec<String>) -> Self {
        Self {
            name: None,
            dim_names: Vec::new(),
            param_names: params,
        }
    }

    /// Number of set dimensions.
    pub fn n_dim(&self) -> usize {
        self.dim_names.len()
    }

    /// Number of parameters.
    pub fn n_param(&self) -> usize {
        self.param_names.len()
    }

    /// Tuple name, empty for anonymous tuples.
    pub fn tuple_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Whether this is a parameter-only space.
    pub fn is_params(&self) -> bool {
        self.name.is_none() && self.dim_names.is_empty()
    }

    /// Index of a dimension by name.
    pub fn dim_index(&self, name: &str) -> Option<usize> {
        self.dim_names.iter().position(|n| n == name)
    }

    /// Index of a parameter by name.
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.param_names.iter().position(|n| n == name)
    }

    /// Check that two spaces describe the same tuple.
    pub fn check_same_tuple(&self, other: &Space) -> PolyResult<()> {
        if self.n_dim() != other.n_dim() {
            return Err(PolyError::schema(
                SchemaErrorKind::Arity,
                format!(
                    "tuple {}[{}] has {} dimensions, {}[{}] has {}",
                    self.tuple_name(),
                    self.dim_names.join(", "),
                    self.n_dim(),
                    other.tuple_name(),
                    other.dim_names.join(", "),
                    other.n_dim()
                ),
            ));
        }
        if self.name != other.name {
            return Err(PolyError::schema(
                SchemaErrorKind::Statements,
                format!(
                    "tuple names differ: '{}' and '{}'",
                    self.tuple_name(),
                    other.tuple_name()
                ),
            ));
        }
        Ok(())
    }

    /// Parameter tuple containing this space's parameters followed by
    /// the ones of `other` not already present.
    pub fn merged_params(&self, other: &[String]) -> Vec<String> {
        let mut params = self.param_names.clone();
        for p in other {
            if !params.contains(p) {
                params.push(p.clone());
            }
        }
        params
    }

    /// Position of each of this space's parameters in `target`.
    ///
    /// Fails if a parameter is missing from `target`.
    pub fn param_mapping(&self, target: &[String]) -> PolyResult<Vec<usize>> {
        self.param_names
            .iter()
            .map(|p| {
                target.iter().position(|t| t == p).ok_or_else(|| {
                    PolyError::schema(
                        SchemaErrorKind::UnknownParameter,
                        format!("parameter '{}' is missing from [{}]", p, target.join(", ")),
                    )
                })
            })
            .collect()
    }

    /// Same tuple over a different parameter list.
    pub fn with_params(&self, params: Vec<String>) -> Self {
        Self {
            name: self.name.clone(),
            dim_names: self.dim_names.clone(),
            param_names: params,
        }
    }

    /// Drop one set dimension.
    pub fn drop_dim(&self, dim: usize) -> Self {
        let mut dim_names = self.dim_names.clone();
        if dim < dim_names.len() {
            dim_names.remove(dim);
        }
        Self {
            name: self.name.clone(),
            dim_names,
            param_names: self.param_names.clone(),
        }
    }

    /// Format the parameter prefix `[n, m] -> `, empty without parameters.
    pub fn params_prefix(&self) -> String {
        if self.param_names.is_empty() {
            String::new()
        } else {
            format!("[{}] -> ", self.param_names.join(", "))
        }
    }

    /// Format the tuple `S[i, j]`.
    pub fn tuple_string(&self) -> String {
        format!("{}[{}]", self.tuple_name(), self.dim_names.join(", "))
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_params() {
            write!(f, "{}{{ : }}", self.params_prefix())
        } else {
            write!(f, "{}{{ {} }}", self.params_prefix(), self.tuple_string())
        }
    }
}
