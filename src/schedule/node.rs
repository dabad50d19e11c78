//! Schedule tree nodes.

use crate::polyhedral::map::UnionMap;
use crate::polyhedral::union::UnionSet;
use crate::utils::errors::{PolyError, PolyResult, SchemaErrorKind};
use std::fmt;
use std::sync::Arc;

/// Kind of a schedule tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Domain,
    Band,
    Sequence,
    Filter,
    Leaf,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Domain => "domain",
            NodeType::Band => "band",
            NodeType::Sequence => "sequence",
            NodeType::Filter => "filter",
            NodeType::Leaf => "leaf",
        };
        write!(f, "{}", name)
    }
}

/// A band: one or more schedule dimensions shared by the statements
/// reaching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Band {
    /// Per statement, one output per band member
    pub partial: UnionMap,
    /// Whether each member carries no dependence
    pub coincident: Vec<bool>,
}

impl Band {
    /// Create a band with no coincident members.
    ///
    /// Every statement must have the same number of outputs, at least one.
    pub fn new(partial: UnionMap) -> PolyResult<Self> {
        let n_member = match partial.n_out() {
            Some(n) if n > 0 => n,
            Some(_) => {
                return Err(PolyError::schema(
                    SchemaErrorKind::Arity,
                    "a band needs at least one member",
                ))
            }
            None if partial.is_empty() => {
                return Err(PolyError::schema(
                    SchemaErrorKind::Statements,
                    "a band needs at least one statement",
                ))
            }
            None => {
                return Err(PolyError::schema(
                    SchemaErrorKind::Arity,
                    format!("statements disagree on the number of band members in {}", partial),
                ))
            }
        };
        Ok(Self {
            partial,
            coincident: vec![false; n_member],
        })
    }

    /// Band with explicit coincidence flags.
    pub fn with_coincident(partial: UnionMap, coincident: Vec<bool>) -> PolyResult<Self> {
        let mut band = Self::new(partial)?;
        if coincident.len() != band.n_member() {
            return Err(PolyError::schema(
                SchemaErrorKind::Arity,
                format!(
                    "{} coincidence flags for {} band members",
                    coincident.len(),
                    band.n_member()
                ),
            ));
        }
        band.coincident = coincident;
        Ok(band)
    }

    pub fn n_member(&self) -> usize {
        self.coincident.len()
    }

    pub fn is_coincident(&self, member: usize) -> bool {
        self.coincident.get(member).copied().unwrap_or(false)
    }
}

/// A node of a schedule tree. Children are shared between trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleNode {
    /// Root: all statement instances
    Domain {
        domain: UnionSet,
        child: Arc<ScheduleNode>,
    },
    /// Loop dimensions
    Band {
        band: Band,
        child: Arc<ScheduleNode>,
    },
    /// Ordered children, each a filter
    Sequence {
        children: Vec<Arc<ScheduleNode>>,
    },
    /// Restriction to a subset of the statements
    Filter {
        filter: UnionSet,
        child: Arc<ScheduleNode>,
    },
    /// Statement execution
    Leaf,
}

impl ScheduleNode {
    pub fn leaf() -> Arc<ScheduleNode> {
        Arc::new(ScheduleNode::Leaf)
    }

    pub fn band(band: Band, child: Arc<ScheduleNode>) -> Arc<ScheduleNode> {
        Arc::new(ScheduleNode::Band { band, child })
    }

    pub fn filter(filter: UnionSet, child: Arc<ScheduleNode>) -> Arc<ScheduleNode> {
        Arc::new(ScheduleNode::Filter { filter, child })
    }

    pub fn sequence(children: Vec<Arc<ScheduleNode>>) -> Arc<ScheduleNode> {
        Arc::new(ScheduleNode::Sequence { children })
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            ScheduleNode::Domain { .. } => NodeType::Domain,
            ScheduleNode::Band { .. } => NodeType::Band,
            ScheduleNode::Sequence { .. } => NodeType::Sequence,
            ScheduleNode::Filter { .. } => NodeType::Filter,
            ScheduleNode::Leaf => NodeType::Leaf,
        }
    }

    /// Children in order.
    pub fn children(&self) -> &[Arc<ScheduleNode>] {
        match self {
            ScheduleNode::Domain { child, .. }
            | ScheduleNode::Band { child, .. }
            | ScheduleNode::Filter { child, .. } => std::slice::from_ref(child),
            ScheduleNode::Sequence { children } => children,
            ScheduleNode::Leaf => &[],
        }
    }

    /// Same node with child `index` replaced.
    pub(crate) fn with_child(&self, index: usize, new_child: Arc<ScheduleNode>) -> ScheduleNode {
        match self {
            ScheduleNode::Domain { domain, .. } => ScheduleNode::Domain {
                domain: domain.clone(),
                child: new_child,
            },
            ScheduleNode::Band { band, .. } => ScheduleNode::Band {
                band: band.clone(),
                child: new_child,
            },
            ScheduleNode::Filter { filter, .. } => ScheduleNode::Filter {
                filter: filter.clone(),
                child: new_child,
            },
            ScheduleNode::Sequence { children } => {
                let mut children = children.clone();
                if index < children.len() {
                    children[index] = new_child;
                }
                ScheduleNode::Sequence { children }
            }
            ScheduleNode::Leaf => ScheduleNode::Leaf,
        }
    }

    /// Statements reaching this node's children when `active` reach
    /// the node itself.
    pub(crate) fn active_below(&self, active: &[String]) -> Vec<String> {
        match self {
            ScheduleNode::Domain { domain, .. } => domain.statement_names(),
            ScheduleNode::Filter { filter, .. } => active
                .iter()
                .filter(|s| filter.get(s).is_some())
                .cloned()
                .collect(),
            ScheduleNode::Sequence { .. } | ScheduleNode::Band { .. } | ScheduleNode::Leaf => {
                active.to_vec()
            }
        }
    }

    /// Statements reaching each leaf of this subtree, flattened.
    pub(crate) fn leaf_statements(&self, active: &[String], out: &mut Vec<String>) {
        match self {
            ScheduleNode::Leaf => out.extend(active.iter().cloned()),
            _ => {
                let below = self.active_below(active);
                for child in self.children() {
                    child.leaf_statements(&below, out);
                }
            }
        }
    }

    /// Check the node kinds and band maps of a subtree that `active`
    /// statements reach.
    pub(crate) fn validate(&self, active: &[String], is_root: bool) -> PolyResult<()> {
        match self {
            ScheduleNode::Domain { .. } if !is_root => {
                return Err(PolyError::schema(
                    SchemaErrorKind::InvalidNode,
                    "a domain node may only appear at the root",
                ))
            }
            ScheduleNode::Band { band, .. } => {
                let mapped = band.partial.statement_names();
                if let Some(missing) = active.iter().find(|s| !mapped.contains(s)) {
                    return Err(PolyError::schema(
                        SchemaErrorKind::Statements,
                        format!("band has no schedule for statement '{}'", missing),
                    ));
                }
            }
            ScheduleNode::Sequence { children } => {
                if let Some(other) = children.iter().find(|c| c.node_type() != NodeType::Filter) {
                    return Err(PolyError::schema(
                        SchemaErrorKind::InvalidNode,
                        format!("sequence child is a {} node, expected a filter", other.node_type()),
                    ));
                }
            }
            _ => {}
        }
        let below = self.active_below(active);
        for child in self.children() {
            child.validate(&below, false)?;
        }
        Ok(())
    }

    /// Copy of the subtree with every band map restricted to `names`.
    pub(crate) fn restrict(&self, names: &[String]) -> Arc<ScheduleNode> {
        let node = match self {
            ScheduleNode::Band { band, child } => ScheduleNode::Band {
                band: Band {
                    partial: band.partial.restrict_to(names),
                    coincident: band.coincident.clone(),
                },
                child: child.restrict(names),
            },
            ScheduleNode::Filter { filter, child } => ScheduleNode::Filter {
                filter: filter.restrict_to(names),
                child: child.restrict(names),
            },
            ScheduleNode::Sequence { children } => ScheduleNode::Sequence {
                children: children.iter().map(|c| c.restrict(names)).collect(),
            },
            ScheduleNode::Domain { domain, child } => ScheduleNode::Domain {
                domain: domain.restrict_to(names),
                child: child.restrict(names),
            },
            ScheduleNode::Leaf => ScheduleNode::Leaf,
        };
        Arc::new(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_member_count() {
        let map: UnionMap = "{ S[i, j] -> [i, j]; T[k] -> [k, 0] }".parse().unwrap();
        let band = Band::new(map).unwrap();
        assert_eq!(band.n_member(), 2);
        assert!(!band.is_coincident(0));

        let ragged: UnionMap = "{ S[i, j] -> [i, j]; T[k] -> [k] }".parse().unwrap();
        assert!(matches!(Band::new(ragged), Err(PolyError::SchemaMismatch(_))));

        let empty: UnionMap = "{ S[i] -> [] }".parse().unwrap();
        assert!(Band::new(empty).is_err());
    }

    #[test]
    fn test_leaf_statements_through_filters() {
        let domain: UnionSet = "{ S[i] : 0 <= i < 4; T[j] : j = 0 }".parse().unwrap();
        let names = domain.statement_names();
        let seq = ScheduleNode::sequence(vec![
            ScheduleNode::filter(domain.restrict_to(&names[..1]), ScheduleNode::leaf()),
            ScheduleNode::filter(domain.restrict_to(&names[1..]), ScheduleNode::leaf()),
        ]);
        let mut out = Vec::new();
        seq.leaf_statements(&names, &mut out);
        assert_eq!(out, names);
    }
}
