//! Utility modules for the polyhedral code generator.
//!
//! This module contains common utilities used throughout the codebase:
//! - Error types
//! - Checked integer arithmetic
//! - Source location tracking
//! - Pretty printing and schedule tree printing

pub mod errors;
pub mod location;
pub mod math;
pub mod pretty;
pub mod poly_print;

// Re-exports
pub use errors::*;
pub use location::{Position, Span};
pub use poly_print::print_schedule;
