//! Persistent schedule trees.
//!
//! Every operation returns a new tree. Unchanged subtrees are shared with
//! the input through `Arc`, so the input stays valid and cheap to keep.

use crate::polyhedral::map::UnionMap;
use crate::polyhedral::union::UnionSet;
use crate::schedule::node::{Band, NodeType, ScheduleNode};
use crate::utils::errors::{PolyError, PolyResult, SchemaErrorKind};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A schedule tree rooted at a domain node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTree {
    root: Arc<ScheduleNode>,
    domain: UnionSet,
}

/// A position in a particular schedule tree.
#[derive(Debug, Clone)]
pub struct NodeRef {
    root: Arc<ScheduleNode>,
    path: Vec<usize>,
    node: Arc<ScheduleNode>,
}

impl NodeRef {
    pub fn node(&self) -> &ScheduleNode {
        &self.node
    }

    pub fn node_type(&self) -> NodeType {
        self.node.node_type()
    }

    /// Child indices from the root.
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Number of band nodes strictly above this node.
    pub fn band_depth(&self) -> usize {
        let mut node = &self.root;
        let mut depth = 0;
        for &i in &self.path {
            if node.node_type() == NodeType::Band {
                depth += 1;
            }
            node = &node.children()[i];
        }
        depth
    }

    pub fn n_children(&self) -> usize {
        self.node.children().len()
    }

    /// Child `index`, `None` if out of range.
    pub fn child(&self, index: usize) -> Option<NodeRef> {
        let node = self.node.children().get(index)?.clone();
        let mut path = self.path.clone();
        path.push(index);
        Some(NodeRef {
            root: self.root.clone(),
            path,
            node,
        })
    }

    pub fn band(&self) -> Option<&Band> {
        match self.node.as_ref() {
            ScheduleNode::Band { band, .. } => Some(band),
            _ => None,
        }
    }

    /// Whether this reference points into `tree`.
    pub fn belongs_to(&self, tree: &ScheduleTree) -> bool {
        Arc::ptr_eq(&self.root, &tree.root)
    }

    /// Shared handle to the referenced subtree.
    pub fn subtree(&self) -> Arc<ScheduleNode> {
        self.node.clone()
    }
}

impl ScheduleTree {
    /// Domain node over a single leaf.
    pub fn from_domain(domain: UnionSet) -> Self {
        log::debug!("schedule tree from domain {}", domain);
        Self {
            root: Arc::new(ScheduleNode::Domain {
                domain: domain.clone(),
                child: ScheduleNode::leaf(),
            }),
            domain,
        }
    }

    pub fn root(&self) -> NodeRef {
        NodeRef {
            root: self.root.clone(),
            path: Vec::new(),
            node: self.root.clone(),
        }
    }

    pub fn root_node(&self) -> &ScheduleNode {
        &self.root
    }

    pub fn domain(&self) -> &UnionSet {
        &self.domain
    }

    /// Insert a band right below the domain node.
    ///
    /// The map must schedule exactly the statements of the domain, with
    /// matching input arities, the same positive number of outputs for
    /// every statement and a domain restriction containing each
    /// statement's domain.
    pub fn insert_band(&self, schedule: &UnionMap) -> PolyResult<ScheduleTree> {
        let domain = self.domain();
        let schedule = self.check_covers(domain, schedule)?;
        let band = Band::new(schedule)?;
        log::debug!("inserting band with {} members", band.n_member());
        let child = self.root.children()[0].clone();
        Ok(Self {
            root: Arc::new(ScheduleNode::Domain {
                domain: domain.clone(),
                child: ScheduleNode::band(band, child),
            }),
            domain: domain.clone(),
        })
    }

    fn check_covers(&self, domain: &UnionSet, schedule: &UnionMap) -> PolyResult<UnionMap> {
        let stmts = domain.statement_names();
        if schedule.statement_names() != stmts {
            return Err(PolyError::schema(
                SchemaErrorKind::Coverage,
                format!(
                    "schedule covers statements [{}], domain has [{}]",
                    schedule.statement_names().join(", "),
                    stmts.join(", ")
                ),
            ));
        }
        // parameters outside the domain's tuple are rejected here
        let schedule = schedule.align_params(&domain.params)?;
        for (name, set) in domain.iter() {
            let map = match schedule.get(name) {
                Some(map) => map,
                None => continue,
            };
            if map.n_in() != set.n_dim() {
                return Err(PolyError::schema(
                    SchemaErrorKind::Arity,
                    format!(
                        "schedule of '{}' has {} inputs, domain has {} dimensions",
                        name,
                        map.n_in(),
                        set.n_dim()
                    ),
                ));
            }
            if !set.is_subset(&map.domain)? {
                return Err(PolyError::schema(
                    SchemaErrorKind::Coverage,
                    format!("schedule of '{}' does not cover {}", name, set),
                ));
            }
        }
        Ok(schedule)
    }

    /// Replace the subtree at `node` by `subtree`.
    ///
    /// The statements reaching leaves must not change. The root can only
    /// be replaced by a domain node over the same domain.
    pub fn replace_subtree(&self, node: &NodeRef, subtree: Arc<ScheduleNode>) -> PolyResult<ScheduleTree> {
        if !node.belongs_to(self) {
            return Err(PolyError::schema(
                SchemaErrorKind::InvalidNode,
                "node does not belong to this schedule tree",
            ));
        }
        if node.path.is_empty() {
            match subtree.as_ref() {
                ScheduleNode::Domain { domain, .. } if domain == self.domain() => {}
                ScheduleNode::Domain { .. } => {
                    return Err(PolyError::schema(
                        SchemaErrorKind::Coverage,
                        "replacement root has a different domain",
                    ))
                }
                other => {
                    return Err(PolyError::schema(
                        SchemaErrorKind::InvalidNode,
                        format!("cannot replace the root with a {} node", other.node_type()),
                    ))
                }
            }
            subtree.validate(&[], true)?;
            self.check_leaves(&self.root, &subtree, &[])?;
            return Ok(Self {
                root: subtree,
                domain: self.domain.clone(),
            });
        }

        // walk down, collecting the ancestors and the statements reaching `node`
        let mut ancestors = Vec::with_capacity(node.path.len());
        let mut current = self.root.clone();
        let mut active = Vec::new();
        for &i in &node.path {
            active = current.active_below(&active);
            let next = current.children()[i].clone();
            ancestors.push(current);
            current = next;
        }

        subtree.validate(&active, false)?;
        self.check_leaves(&current, &subtree, &active)?;

        let mut rebuilt = subtree;
        for (parent, &i) in ancestors.iter().rev().zip(node.path.iter().rev()) {
            rebuilt = Arc::new(parent.with_child(i, rebuilt));
        }
        Ok(Self {
            root: rebuilt,
            domain: self.domain.clone(),
        })
    }

    fn check_leaves(&self, old: &ScheduleNode, new: &ScheduleNode, active: &[String]) -> PolyResult<()> {
        let mut before = Vec::new();
        old.leaf_statements(active, &mut before);
        let mut after = Vec::new();
        new.leaf_statements(active, &mut after);
        before.sort();
        after.sort();
        if before != after {
            return Err(PolyError::schema(
                SchemaErrorKind::Coverage,
                format!(
                    "subtree reaches statements [{}] instead of [{}]",
                    after.join(", "),
                    before.join(", ")
                ),
            ));
        }
        Ok(())
    }

    /// Leftmost band in depth-first order.
    pub fn first_band(&self) -> Option<NodeRef> {
        fn find(node: NodeRef) -> Option<NodeRef> {
            if node.node_type() == NodeType::Band {
                return Some(node);
            }
            (0..node.n_children()).find_map(|i| node.child(i).and_then(find))
        }
        find(self.root())
    }

    /// Instances reaching each leaf, in depth-first order.
    pub fn leaf_domains(&self) -> Vec<UnionSet> {
        fn walk(node: &ScheduleNode, active: &[String], domain: &UnionSet, out: &mut Vec<UnionSet>) {
            if let ScheduleNode::Leaf = node {
                out.push(domain.restrict_to(active));
                return;
            }
            let below = node.active_below(active);
            for child in node.children() {
                walk(child, &below, domain, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &[], self.domain(), &mut out);
        out
    }

    /// Split the statements reaching `node` into ordered groups, each
    /// executing the subtree at `node` restricted to its statements.
    ///
    /// The groups must partition the statements reaching `node`.
    pub fn insert_sequence(&self, node: &NodeRef, groups: &[Vec<String>]) -> PolyResult<ScheduleTree> {
        if node.path.is_empty() {
            return Err(PolyError::schema(
                SchemaErrorKind::InvalidNode,
                "cannot insert a sequence above the domain node",
            ));
        }
        if groups.len() < 2 || groups.iter().any(Vec::is_empty) {
            return Err(PolyError::schema(
                SchemaErrorKind::Statements,
                "a sequence needs at least two non-empty groups",
            ));
        }
        let domain = self.domain();
        let children = groups
            .iter()
            .map(|group| ScheduleNode::filter(domain.restrict_to(group), node.node.restrict(group)))
            .collect();
        log::debug!("inserting sequence of {} filters", groups.len());
        self.replace_subtree(node, ScheduleNode::sequence(children))
    }

    /// Set the coincidence flag of one band member.
    pub fn set_coincident(&self, band: &NodeRef, member: usize, coincident: bool) -> PolyResult<ScheduleTree> {
        let current = band.band().ok_or_else(|| {
            PolyError::schema(
                SchemaErrorKind::InvalidNode,
                format!("expected a band node, found a {} node", band.node_type()),
            )
        })?;
        if member >= current.n_member() {
            return Err(PolyError::schema(
                SchemaErrorKind::Arity,
                format!("band has {} members, no member {}", current.n_member(), member),
            ));
        }
        let mut updated = current.clone();
        updated.coincident[member] = coincident;
        let child = band.node.children()[0].clone();
        self.replace_subtree(band, ScheduleNode::band(updated, child))
    }

    /// Per statement, the `(band depth, member)` pairs of every coincident
    /// band member above its leaves.
    pub fn vectorization_candidates(&self) -> BTreeMap<String, Vec<(usize, usize)>> {
        fn walk(
            node: &ScheduleNode,
            active: &[String],
            depth: usize,
            out: &mut BTreeMap<String, Vec<(usize, usize)>>,
        ) {
            let mut depth = depth;
            if let ScheduleNode::Band { band, .. } = node {
                for (member, &flag) in band.coincident.iter().enumerate() {
                    if flag {
                        for stmt in active {
                            out.entry(stmt.clone()).or_default().push((depth, member));
                        }
                    }
                }
                depth += 1;
            }
            let below = node.active_below(active);
            for child in node.children() {
                walk(child, &below, depth, out);
            }
        }
        let mut out = BTreeMap::new();
        walk(&self.root, &[], 0, &mut out);
        for pairs in out.values_mut() {
            pairs.sort_unstable();
            pairs.dedup();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(text: &str) -> UnionSet {
        text.parse().unwrap()
    }

    fn map(text: &str) -> UnionMap {
        text.parse().unwrap()
    }

    #[test]
    fn test_from_domain() {
        let tree = ScheduleTree::from_domain(domain("[n] -> { S[i] : 0 <= i < n }"));
        let root = tree.root();
        assert_eq!(root.node_type(), NodeType::Domain);
        assert_eq!(root.child(0).unwrap().node_type(), NodeType::Leaf);
        assert!(root.child(1).is_none());
        assert!(tree.first_band().is_none());
    }

    #[test]
    fn test_insert_band() {
        let tree = ScheduleTree::from_domain(domain("{ S[i, j] : 0 <= i, j < 100 }"));
        let banded = tree.insert_band(&map("{ S[i, j] -> [i, j] }")).unwrap();
        let band = banded.first_band().unwrap();
        assert_eq!(band.path(), &[0]);
        assert_eq!(band.band().unwrap().n_member(), 2);
        assert_eq!(band.child(0).unwrap().node_type(), NodeType::Leaf);
        // the input tree is untouched
        assert!(tree.first_band().is_none());
    }

    #[test]
    fn test_insert_band_checks_coverage() {
        let tree = ScheduleTree::from_domain(domain("{ S[i] : 0 <= i < 10; T[j] : j = 0 }"));
        let missing = tree.insert_band(&map("{ S[i] -> [i] }"));
        assert!(matches!(missing, Err(PolyError::SchemaMismatch(_))));

        let arity = tree.insert_band(&map("{ S[i, k] -> [i]; T[j] -> [j] }"));
        assert!(matches!(arity, Err(PolyError::SchemaMismatch(_))));

        let partial = tree.insert_band(&map("{ S[i] -> [i] : i < 5; T[j] -> [j] }"));
        assert!(matches!(partial, Err(PolyError::SchemaMismatch(_))));

        let ok = tree.insert_band(&map("{ S[i] -> [i] : i >= 0; T[j] -> [j] }"));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_replace_subtree_rules() {
        let tree = ScheduleTree::from_domain(domain("{ S[i] : 0 <= i < 10 }"));
        let leaf = tree.root().child(0).unwrap();

        let band = Band::new(map("{ S[i] -> [i] }")).unwrap();
        let replaced = tree
            .replace_subtree(&leaf, ScheduleNode::band(band, ScheduleNode::leaf()))
            .unwrap();
        assert_eq!(replaced.root().child(0).unwrap().node_type(), NodeType::Band);

        // a reference into another tree is rejected
        let foreign = replaced.root().child(0).unwrap();
        assert!(tree.replace_subtree(&foreign, ScheduleNode::leaf()).is_err());

        // the root must stay a domain node
        assert!(tree.replace_subtree(&tree.root(), ScheduleNode::leaf()).is_err());

        // a band without a schedule for S does not fit
        let other = Band::new(map("{ T[j] -> [j] }")).unwrap();
        assert!(tree
            .replace_subtree(&leaf, ScheduleNode::band(other, ScheduleNode::leaf()))
            .is_err());
    }

    #[test]
    fn test_sequence_and_leaf_domains() {
        let tree = ScheduleTree::from_domain(domain("{ S[i] : 0 <= i < 4; T[j] : 0 <= j < 2 }"))
            .insert_band(&map("{ S[i] -> [i]; T[j] -> [j] }"))
            .unwrap();
        let leaf = tree.first_band().unwrap().child(0).unwrap();
        let groups = vec![vec!["T".to_string()], vec!["S".to_string()]];
        let fissioned = tree.insert_sequence(&leaf, &groups).unwrap();

        let leaves = fissioned.leaf_domains();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].statement_names(), vec!["T".to_string()]);
        assert_eq!(leaves[1].statement_names(), vec!["S".to_string()]);

        // overlapping groups duplicate S
        let bad = vec![vec!["S".to_string(), "T".to_string()], vec!["S".to_string()]];
        assert!(tree.insert_sequence(&leaf, &bad).is_err());
    }

    #[test]
    fn test_vectorization_candidates() {
        let tree = ScheduleTree::from_domain(domain("{ S[i, j] : 0 <= i, j < 8 }"))
            .insert_band(&map("{ S[i, j] -> [i, j] }"))
            .unwrap();
        let band = tree.first_band().unwrap();
        let tree = tree.set_coincident(&band, 1, true).unwrap();
        let candidates = tree.vectorization_candidates();
        assert_eq!(candidates.get("S"), Some(&vec![(0, 1)]));

        let band = tree.first_band().unwrap();
        assert!(tree.set_coincident(&band, 2, true).is_err());
        assert!(tree.set_coincident(&tree.root(), 0, true).is_err());
    }
}
