//! Schedule tree transformations.

pub mod tiling;
pub mod split;
pub mod pipeline;

pub use tiling::{tile_band, Tiling};
pub use split::{split_band, BandSplit};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput};

use crate::schedule::ScheduleTree;
use crate::utils::errors::PolyResult;

/// Transformation pass trait.
pub trait Transform {
    /// Apply the transformation, returning a new tree.
    fn apply(&self, tree: &ScheduleTree) -> PolyResult<ScheduleTree>;

    /// Get transformation name.
    fn name(&self) -> &str;
}
