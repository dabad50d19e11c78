//! Polyhedral data structures and operations.
//!
//! This module provides the mathematical foundation of the pipeline:
//! - Affine and quasi-affine expressions and constraints
//! - Constraint systems with Fourier–Motzkin elimination
//! - Integer sets, union domains and schedule maps

pub mod space;
pub mod expr;
pub mod quasi;
pub mod constraint;
pub mod elimination;
pub mod set;
pub mod union;
pub mod map;

pub use space::Space;
pub use expr::AffineExpr;
pub use quasi::{FloorDiv, QuasiAffineExpr};
pub use constraint::{Constraint, ConstraintKind};
pub use elimination::ConstraintSystem;
pub use set::{BasicSet, Set};
pub use union::UnionSet;
pub use map::{AffineMap, UnionMap};
