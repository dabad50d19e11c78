//! Band splitting.
//!
//! Splitting a band `[m0, m1, m2]` at position 1 gives an outer band
//! `[m0]` whose child is an inner band `[m1, m2]`.

use crate::schedule::{Band, NodeRef, ScheduleNode, ScheduleTree};
use crate::transform::tiling::first_band;
use crate::transform::Transform;
use crate::utils::errors::{PolyError, PolyResult, TilingErrorKind};

/// Split the band at `band_node` before member `pos`.
pub fn split_band(tree: &ScheduleTree, band_node: &NodeRef, pos: usize) -> PolyResult<ScheduleTree> {
    if !band_node.belongs_to(tree) {
        return Err(PolyError::tiling(
            TilingErrorKind::ForeignNode,
            "band node does not belong to the tree being split",
        ));
    }
    let band = band_node.band().ok_or_else(|| {
        PolyError::tiling(
            TilingErrorKind::NotABand,
            format!("cannot split a {} node", band_node.node_type()),
        )
    })?;
    let n = band.n_member();
    if pos == 0 || pos >= n {
        return Err(PolyError::tiling(
            TilingErrorKind::InvalidSplit,
            format!("cannot split a band of {} members at {}", n, pos),
        ));
    }

    log::debug!("splitting band at {:?} before member {}", band_node.path(), pos);

    let outer = Band::with_coincident(band.partial.slice(0..pos)?, band.coincident[..pos].to_vec())?;
    let inner = Band::with_coincident(band.partial.slice(pos..n)?, band.coincident[pos..].to_vec())?;
    let child = band_node.node().children()[0].clone();
    tree.replace_subtree(
        band_node,
        ScheduleNode::band(outer, ScheduleNode::band(inner, child)),
    )
}

/// Split of the leftmost band of a tree.
#[derive(Debug, Clone)]
pub struct BandSplit {
    /// Number of members kept in the outer band
    pub pos: usize,
}

impl BandSplit {
    pub fn new(pos: usize) -> Self {
        Self { pos }
    }
}

impl Transform for BandSplit {
    fn apply(&self, tree: &ScheduleTree) -> PolyResult<ScheduleTree> {
        let band = first_band(tree)?;
        split_band(tree, &band, self.pos)
    }

    fn name(&self) -> &str {
        "split"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedral::{UnionMap, UnionSet};

    fn banded() -> ScheduleTree {
        let domain: UnionSet = "{ S[i, j, k] : 0 <= i, j, k < 4 }".parse().unwrap();
        let schedule: UnionMap = "{ S[i, j, k] -> [i, j, k] }".parse().unwrap();
        ScheduleTree::from_domain(domain).insert_band(&schedule).unwrap()
    }

    #[test]
    fn test_split_band() {
        let tree = banded();
        let band = tree.first_band().unwrap();
        let tree = tree.set_coincident(&band, 2, true).unwrap();
        let band = tree.first_band().unwrap();
        let split = split_band(&tree, &band, 1).unwrap();

        let outer = split.first_band().unwrap();
        let inner = outer.child(0).unwrap();
        assert_eq!(outer.band().unwrap().n_member(), 1);
        assert_eq!(inner.band().unwrap().n_member(), 2);
        assert_eq!(inner.band().unwrap().coincident, vec![false, true]);
        assert_eq!(
            inner.band().unwrap().partial.to_string(),
            "{ S[i, j, k] -> [j, k] }"
        );
    }

    #[test]
    fn test_split_positions() {
        let tree = banded();
        let band = tree.first_band().unwrap();
        assert!(split_band(&tree, &band, 0).is_err());
        assert!(split_band(&tree, &band, 3).is_err());
        assert!(BandSplit::new(2).apply(&tree).is_ok());
    }
}
