//! # polygen - Polyhedral Loop Generation
//!
//! Builds loop nests from integer-set iteration domains:
//! - Integer sets and quasi-affine maps with named parameters
//! - Persistent schedule trees (domain, band, sequence, filter, leaf)
//! - Rectangular band tiling and band splitting
//! - Polyhedral scanning into a C-like loop AST
//!
//! ## Architecture
//!
//! ```text
//! Domain text → Frontend → UnionSet → ScheduleTree → Transform → CodeGen → Loop text
//! ```
//!
//! ## Example
//!
//! ```rust
//! use polygen::prelude::*;
//!
//! let code = Pipeline::new("{ S[i, j] : 0 <= i, j < 100 }")
//!     .schedule("{ S[i, j] -> [i, j] }")
//!     .tile(&[32, 32])
//!     .compile()?;
//! assert!(code.contains("for (i1 = max(0, 32*i0); i1 <= min(99, 32*i0 + 31); i1 += 1) {"));
//! # Ok::<(), polygen::utils::errors::PolyError>(())
//! ```

#![warn(clippy::all)]

pub mod frontend;
pub mod polyhedral;
pub mod schedule;
pub mod transform;
pub mod codegen;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::frontend::{parse_set, parse_union_map, parse_union_set};
    pub use crate::polyhedral::{
        AffineExpr, AffineMap, Constraint, QuasiAffineExpr, Set, Space, UnionMap, UnionSet,
    };
    pub use crate::schedule::{Band, NodeRef, NodeType, ScheduleNode, ScheduleTree};
    pub use crate::transform::{
        split_band, tile_band, BandSplit, Pipeline, PipelineConfig, PipelineOutput, Tiling, Transform,
    };
    pub use crate::codegen::{build_ast, print_ast, AstNode};
    pub use crate::utils::errors::*;
    pub use crate::utils::print_schedule;
}

use crate::transform::Pipeline;
use crate::utils::errors::PolyResult;

/// Compile a union domain to loop code, tiling the leftmost band when
/// `tile_sizes` is given.
///
/// A bare domain has no band, so asking for tiling fails with
/// `NoBandFound`; use [`Pipeline`] to insert a schedule first.
pub fn compile(domain_text: &str, tile_sizes: Option<&[i64]>) -> PolyResult<String> {
    let pipeline = Pipeline::new(domain_text);
    match tile_sizes {
        Some(sizes) => pipeline.tile(sizes).compile(),
        None => pipeline.compile(),
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
