//! Loop AST produced by the AST builder.
//!
//! The AST is a small C-like tree: `for` loops with inclusive upper bounds,
//! `if` guards, blocks and statement calls. Expressions stay symbolic in
//! the parameters; [`AstNode::for_each_call`] interprets a tree for
//! concrete parameter values.

use crate::utils::errors::{PolyError, PolyResult, SchemaErrorKind};
use crate::utils::math;
use std::collections::HashMap;

/// A node in the generated AST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
    /// `for (iterator = lower; iterator <= upper; iterator += stride)`
    For {
        iterator: String,
        lower: AstExpr,
        upper: AstExpr,
        stride: i64,
        body: Box<AstNode>,
    },
    /// A guarded subtree
    If {
        condition: AstCondition,
        body: Box<AstNode>,
    },
    /// Children executed in order
    Block(Vec<AstNode>),
    /// One statement instance
    Call { name: String, args: Vec<AstExpr> },
}

/// An integer expression over iterators and parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstExpr {
    /// `c1*t1 + c2*t2 + ... + constant`
    Linear {
        terms: Vec<(i64, String)>,
        constant: i64,
    },
    /// Sum of two expressions
    Add(Box<AstExpr>, Box<AstExpr>),
    /// Constant multiple of an expression
    Mul(i64, Box<AstExpr>),
    /// Division known to be exact
    Div(Box<AstExpr>, i64),
    /// `floord(e, d)`
    FloorDiv(Box<AstExpr>, i64),
    /// `ceild(e, d)`
    CeilDiv(Box<AstExpr>, i64),
    /// Minimum of two or more expressions
    Min(Vec<AstExpr>),
    /// Maximum of two or more expressions
    Max(Vec<AstExpr>),
}

/// Comparison operator of a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Ge,
    Le,
    Eq,
}

/// A guard condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstCondition {
    /// `lhs op rhs`
    Compare {
        lhs: AstExpr,
        op: CmpOp,
        rhs: AstExpr,
    },
    /// `expr % divisor == 0`
    Divisible { expr: AstExpr, divisor: i64 },
    /// All conditions hold
    And(Vec<AstCondition>),
    /// Some condition holds
    Or(Vec<AstCondition>),
}

impl AstExpr {
    pub fn int(v: i64) -> Self {
        Self::Linear {
            terms: Vec::new(),
            constant: v,
        }
    }

    pub fn var(name: &str) -> Self {
        Self::Linear {
            terms: vec![(1, name.to_string())],
            constant: 0,
        }
    }

    pub fn linear(terms: Vec<(i64, String)>, constant: i64) -> Self {
        Self::Linear { terms, constant }
    }

    /// Constant value, if the expression has no terms.
    pub fn as_constant(&self) -> Option<i64> {
        match self {
            AstExpr::Linear { terms, constant } if terms.is_empty() => Some(*constant),
            _ => None,
        }
    }

    pub fn add(self, other: Self) -> Self {
        Self::Add(Box::new(self), Box::new(other))
    }

    pub fn mul(self, factor: i64) -> Self {
        Self::Mul(factor, Box::new(self))
    }

    /// Maximum of `items`, folding constants into one leading term.
    pub fn max_of(items: Vec<AstExpr>) -> Self {
        fold_extremum(items, true)
    }

    /// Minimum of `items`, folding constants into one leading term.
    pub fn min_of(items: Vec<AstExpr>) -> Self {
        fold_extremum(items, false)
    }

    /// Evaluate with every name bound in `env`.
    pub fn evaluate(&self, env: &HashMap<String, i64>) -> PolyResult<i64> {
        match self {
            AstExpr::Linear { terms, constant } => {
                let mut value = *constant;
                for (c, name) in terms {
                    let v = env.get(name).copied().ok_or_else(|| {
                        PolyError::schema(
                            SchemaErrorKind::UnknownParameter,
                            format!("no value for '{}'", name),
                        )
                    })?;
                    value = math::mul_add(*c, v, value)?;
                }
                Ok(value)
            }
            AstExpr::Add(a, b) => math::add(a.evaluate(env)?, b.evaluate(env)?),
            AstExpr::Mul(k, e) => math::mul(*k, e.evaluate(env)?),
            AstExpr::Div(e, d) | AstExpr::FloorDiv(e, d) => math::floor_div(e.evaluate(env)?, *d),
            AstExpr::CeilDiv(e, d) => math::ceil_div(e.evaluate(env)?, *d),
            AstExpr::Min(items) => extremum(items, env, false),
            AstExpr::Max(items) => extremum(items, env, true),
        }
    }
}

fn fold_extremum(items: Vec<AstExpr>, is_max: bool) -> AstExpr {
    let mut constant: Option<i64> = None;
    let mut rest: Vec<AstExpr> = Vec::new();
    for item in items {
        match item.as_constant() {
            Some(v) => {
                constant = Some(match constant {
                    Some(c) if is_max => c.max(v),
                    Some(c) => c.min(v),
                    None => v,
                })
            }
            None => {
                if !rest.contains(&item) {
                    rest.push(item);
                }
            }
        }
    }
    let mut all: Vec<AstExpr> = constant.map(AstExpr::int).into_iter().collect();
    all.extend(rest);
    match all.len() {
        0 => AstExpr::int(0),
        1 => all.remove(0),
        _ if is_max => AstExpr::Max(all),
        _ => AstExpr::Min(all),
    }
}

fn extremum(items: &[AstExpr], env: &HashMap<String, i64>, is_max: bool) -> PolyResult<i64> {
    let mut best: Option<i64> = None;
    for item in items {
        let v = item.evaluate(env)?;
        best = Some(match best {
            Some(b) if is_max => b.max(v),
            Some(b) => b.min(v),
            None => v,
        });
    }
    best.ok_or_else(|| PolyError::Overflow("extremum of no values".to_string()))
}

impl AstCondition {
    /// Conjunction, flattened; a single condition is returned as is.
    pub fn all(mut conditions: Vec<AstCondition>) -> Option<AstCondition> {
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(AstCondition::And(conditions)),
        }
    }

    pub fn evaluate(&self, env: &HashMap<String, i64>) -> PolyResult<bool> {
        match self {
            AstCondition::Compare { lhs, op, rhs } => {
                let (l, r) = (lhs.evaluate(env)?, rhs.evaluate(env)?);
                Ok(match op {
                    CmpOp::Ge => l >= r,
                    CmpOp::Le => l <= r,
                    CmpOp::Eq => l == r,
                })
            }
            AstCondition::Divisible { expr, divisor } => {
                Ok(math::floor_mod(expr.evaluate(env)?, *divisor)? == 0)
            }
            AstCondition::And(items) => {
                for c in items {
                    if !c.evaluate(env)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            AstCondition::Or(items) => {
                for c in items {
                    if c.evaluate(env)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl AstNode {
    /// Block of `children`, flattening nested blocks; one child is
    /// returned unwrapped.
    pub fn block(children: Vec<AstNode>) -> AstNode {
        let mut flat = Vec::new();
        for child in children {
            match child {
                AstNode::Block(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            AstNode::Block(flat)
        }
    }

    /// Whether the node executes nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, AstNode::Block(children) if children.is_empty())
    }

    /// Execute the tree for the given parameter values, reporting every
    /// statement call in execution order.
    pub fn for_each_call<F>(&self, params: &HashMap<String, i64>, mut visit: F) -> PolyResult<()>
    where
        F: FnMut(&str, Vec<i64>),
    {
        let mut env = params.clone();
        self.execute(&mut env, &mut visit)
    }

    /// Every statement call as `(name, args)`, in execution order.
    pub fn calls(&self, params: &HashMap<String, i64>) -> PolyResult<Vec<(String, Vec<i64>)>> {
        let mut out = Vec::new();
        self.for_each_call(params, |name, args| out.push((name.to_string(), args)))?;
        Ok(out)
    }

    fn execute<F>(&self, env: &mut HashMap<String, i64>, visit: &mut F) -> PolyResult<()>
    where
        F: FnMut(&str, Vec<i64>),
    {
        match self {
            AstNode::For {
                iterator,
                lower,
                upper,
                stride,
                body,
            } => {
                let lo = lower.evaluate(env)?;
                let hi = upper.evaluate(env)?;
                let saved = env.get(iterator).copied();
                let mut it = lo;
                while it <= hi {
                    env.insert(iterator.clone(), it);
                    body.execute(env, visit)?;
                    it = math::add(it, *stride)?;
                }
                match saved {
                    Some(v) => env.insert(iterator.clone(), v),
                    None => env.remove(iterator),
                };
                Ok(())
            }
            AstNode::If { condition, body } => {
                if condition.evaluate(env)? {
                    body.execute(env, visit)?;
                }
                Ok(())
            }
            AstNode::Block(children) => {
                for child in children {
                    child.execute(env, visit)?;
                }
                Ok(())
            }
            AstNode::Call { name, args } => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(env))
                    .collect::<PolyResult<Vec<_>>>()?;
                visit(name, values);
                Ok(())
            }
        }
    }
}
