//! Rectangular band tiling.
//!
//! Tiling a band with members `m_k` and sizes `t_k` replaces it by two
//! nested bands:
//! ```text
//! band [i, j]            band [floor(i/32), floor(j/32)]     (tile loops)
//!   leaf          ==>      band [i - 32*floor(i/32), j - 32*floor(j/32)]
//!                            leaf                            (point loops)
//! ```
//! The domain and the statements are unchanged; only the execution order
//! is refined.

use crate::polyhedral::quasi::QuasiAffineExpr;
use crate::schedule::{Band, NodeRef, ScheduleNode, ScheduleTree};
use crate::transform::Transform;
use crate::utils::errors::{PolyError, PolyResult, TilingErrorKind};

/// Tile the band at `band_node` with one size per member.
///
/// The input tree is left untouched.
pub fn tile_band(tree: &ScheduleTree, band_node: &NodeRef, tile_sizes: &[i64]) -> PolyResult<ScheduleTree> {
    if !band_node.belongs_to(tree) {
        return Err(PolyError::tiling(
            TilingErrorKind::ForeignNode,
            "band node does not belong to the tree being tiled",
        ));
    }
    let band = band_node.band().ok_or_else(|| {
        PolyError::tiling(
            TilingErrorKind::NotABand,
            format!("cannot tile a {} node", band_node.node_type()),
        )
    })?;
    if tile_sizes.len() != band.n_member() {
        return Err(PolyError::tiling(
            TilingErrorKind::SizeCountMismatch,
            format!(
                "{} tile sizes for a band with {} members",
                tile_sizes.len(),
                band.n_member()
            ),
        ));
    }
    if let Some(&bad) = tile_sizes.iter().find(|&&t| t <= 0) {
        return Err(PolyError::tiling(
            TilingErrorKind::NonPositiveSize,
            format!("tile size {} is not positive", bad),
        ));
    }

    log::debug!("tiling band at {:?} with sizes {:?}", band_node.path(), tile_sizes);

    let tile = band.partial.map_outputs(|map| {
        map.outputs
            .iter()
            .zip(tile_sizes)
            .map(|(e, &t)| e.floor_div(t))
            .collect()
    })?;
    let point = band.partial.map_outputs(|map| {
        map.outputs
            .iter()
            .zip(tile_sizes)
            .map(|(e, &t)| point_member(e, t))
            .collect()
    })?;

    let child = band_node.node().children()[0].clone();
    let inner = ScheduleNode::band(Band::with_coincident(point, band.coincident.clone())?, child);
    let outer = ScheduleNode::band(Band::with_coincident(tile, band.coincident.clone())?, inner);
    tree.replace_subtree(band_node, outer)
}

/// `e - t * floor(e / t)`.
fn point_member(e: &QuasiAffineExpr, t: i64) -> PolyResult<QuasiAffineExpr> {
    e.add_scaled(&e.floor_div(t)?, -t)
}

/// Tiling of the leftmost band of a tree.
#[derive(Debug, Clone)]
pub struct Tiling {
    /// One tile size per band member
    pub tile_sizes: Vec<i64>,
}

impl Tiling {
    pub fn new(tile_sizes: Vec<i64>) -> Self {
        Self { tile_sizes }
    }

    /// Same tile size for every member of the first band.
    pub fn uniform(tree: &ScheduleTree, size: i64) -> PolyResult<Self> {
        let band = first_band(tree)?;
        let n = band.band().map_or(0, Band::n_member);
        Ok(Self::new(vec![size; n]))
    }
}

impl Transform for Tiling {
    fn apply(&self, tree: &ScheduleTree) -> PolyResult<ScheduleTree> {
        let band = first_band(tree)?;
        tile_band(tree, &band, &self.tile_sizes)
    }

    fn name(&self) -> &str {
        "tiling"
    }
}

/// The leftmost band, or `NoBandFound`.
pub(crate) fn first_band(tree: &ScheduleTree) -> PolyResult<NodeRef> {
    tree.first_band()
        .ok_or_else(|| PolyError::NoBandFound("the schedule tree has no band node".to_string()))
}
