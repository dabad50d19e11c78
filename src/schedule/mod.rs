//! Schedule trees.
//!
//! A schedule tree orders the instances of the statements of a domain:
//! - Domain: the root, holding every statement instance
//! - Band: one or more schedule dimensions, lowered to nested loops
//! - Sequence and Filter: ordered groups of statements
//! - Leaf: statement execution

pub mod node;
pub mod tree;

pub use node::{Band, NodeType, ScheduleNode};
pub use tree::{NodeRef, ScheduleTree};
