//! Schedule functions: per-statement tuples of quasi-affine expressions.
//!
//! `{ S[i, j] -> [floor(i/32), floor(j/32)] }` maps every instance of `S`
//! to a tuple of schedule coordinates.

use crate::polyhedral::quasi::QuasiAffineExpr;
use crate::polyhedral::set::Set;
use crate::polyhedral::space::Space;
use crate::utils::errors::{PolyError, PolyResult, SchemaErrorKind};
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A quasi-affine function from one statement's instances to a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffineMap {
    /// Input tuple (statement) space
    pub space: Space,
    /// Optional name of the output tuple
    pub out_name: Option<String>,
    /// One expression per output coordinate, over the input space
    pub outputs: Vec<QuasiAffineExpr>,
    /// Instances the map is defined on
    pub domain: Set,
}

impl AffineMap {
    /// Map defined on the whole input space.
    pub fn new(space: Space, outputs: Vec<QuasiAffineExpr>) -> Self {
        let domain = Set::universe(space.clone());
        Self {
            space,
            out_name: None,
            outputs,
            domain,
        }
    }

    /// Identity schedule `S[i, j] -> [i, j]`.
    pub fn identity(space: Space) -> Self {
        let outputs = (0..space.n_dim())
            .map(|d| {
                crate::polyhedral::expr::AffineExpr::var(d, space.n_dim(), space.n_param()).into()
            })
            .collect();
        Self::new(space, outputs)
    }

    pub fn n_in(&self) -> usize { self.space.n_dim() }
    pub fn n_out(&self) -> usize { self.outputs.len() }

    /// Same map with different output expressions.
    pub fn with_outputs(&self, outputs: Vec<QuasiAffineExpr>) -> Self {
        Self {
            space: self.space.clone(),
            out_name: self.out_name.clone(),
            outputs,
            domain: self.domain.clone(),
        }
    }

    /// Schedule coordinates of one instance.
    pub fn apply(&self, point: &[i64], params: &[i64]) -> PolyResult<Vec<i64>> {
        self.outputs.iter().map(|e| e.evaluate(point, params)).collect()
    }

    /// Re-express over a parameter tuple that contains all current parameters.
    pub fn align_params(&self, params: &[String]) -> PolyResult<AffineMap> {
        let mapping = self.space.param_mapping(params)?;
        Ok(Self {
            space: self.space.with_params(params.to_vec()),
            out_name: self.out_name.clone(),
            outputs: self
                .outputs
                .iter()
                .map(|e| e.remap_params(&mapping, params.len()))
                .collect(),
            domain: self.domain.align_params(params)?,
        })
    }

    /// Body between the braces, e.g. `S[i] -> [i]`.
    pub fn body_string(&self) -> String {
        let outputs: Vec<String> = self
            .outputs
            .iter()
            .map(|e| e.to_string_with_names(&self.space.dim_names, &self.space.param_names))
            .collect();
        let mut body = format!(
            "{} -> {}[{}]",
            self.space.tuple_string(),
            self.out_name.as_deref().unwrap_or(""),
            outputs.join(", ")
        );
        if let Some(constraints) = self.domain.constraints_string() {
            body.push_str(" : ");
            body.push_str(&constraints);
        }
        body
    }
}

impl fmt::Display for AffineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{ {} }}", self.space.params_prefix(), self.body_string())
    }
}

/// Statement name → schedule function, over one shared parameter tuple.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnionMap {
    pub params: Vec<String>,
    maps: BTreeMap<String, AffineMap>,
}

impl UnionMap {
    pub fn new(params: Vec<String>) -> Self {
        Self { params, maps: BTreeMap::new() }
    }

    pub fn len(&self) -> usize { self.maps.len() }
    pub fn is_empty(&self) -> bool { self.maps.is_empty() }

    pub fn get(&self, name: &str) -> Option<&AffineMap> {
        self.maps.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AffineMap)> {
        self.maps.iter()
    }

    pub fn statement_names(&self) -> Vec<String> {
        self.maps.keys().cloned().collect()
    }

    /// Add the map of one statement. Each statement may appear once.
    pub fn add_map(&mut self, map: AffineMap) -> PolyResult<()> {
        let name = map.space.tuple_name().to_string();
        if self.maps.contains_key(&name) {
            return Err(PolyError::schema(
                SchemaErrorKind::Statements,
                format!("statement '{}' is mapped twice", name),
            ));
        }
        let mut params = self.params.clone();
        for p in &map.space.param_names {
            if !params.contains(p) {
                params.push(p.clone());
            }
        }
        if params != self.params {
            *self = self.align_params(&params)?;
        }
        let map = map.align_params(&self.params)?;
        self.maps.insert(name, map);
        Ok(())
    }

    /// Re-express every map over a larger parameter tuple.
    pub fn align_params(&self, params: &[String]) -> PolyResult<UnionMap> {
        let mut result = UnionMap::new(params.to_vec());
        for (name, map) in &self.maps {
            result.maps.insert(name.clone(), map.align_params(params)?);
        }
        Ok(result)
    }

    /// Number of outputs shared by every map, `None` if they disagree.
    pub fn n_out(&self) -> Option<usize> {
        let mut counts = self.maps.values().map(AffineMap::n_out);
        let first = counts.next()?;
        if counts.all(|n| n == first) {
            Some(first)
        } else {
            None
        }
    }

    /// Apply `f` to the output list of every statement.
    pub fn map_outputs(
        &self,
        mut f: impl FnMut(&AffineMap) -> PolyResult<Vec<QuasiAffineExpr>>,
    ) -> PolyResult<UnionMap> {
        let mut result = UnionMap::new(self.params.clone());
        for (name, map) in &self.maps {
            let outputs = f(map)?;
            result.maps.insert(name.clone(), map.with_outputs(outputs));
        }
        Ok(result)
    }

    /// Keep only the maps of the named statements.
    pub fn restrict_to(&self, names: &[String]) -> UnionMap {
        let mut result = UnionMap::new(self.params.clone());
        for (name, map) in &self.maps {
            if names.contains(name) {
                result.maps.insert(name.clone(), map.clone());
            }
        }
        result
    }

    /// Keep outputs `range` of every map.
    pub fn slice(&self, range: std::ops::Range<usize>) -> PolyResult<UnionMap> {
        self.map_outputs(|m| Ok(m.outputs[range.clone()].to_vec()))
    }
}

impl fmt::Display for UnionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.params.is_empty() {
            write!(f, "[{}] -> ", self.params.join(", "))?;
        }
        write!(f, "{{ ")?;
        for (i, map) in self.maps.values().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", map.body_string())?;
        }
        write!(f, " }}")
    }
}

impl From<AffineMap> for UnionMap {
    fn from(map: AffineMap) -> Self {
        let mut union = UnionMap::new(map.space.param_names.clone());
        union.maps.insert(map.space.tuple_name().to_string(), map);
        union
    }
}

impl FromStr for UnionMap {
    type Err = PolyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::frontend::parse_union_map(s, &[])
    }
}
