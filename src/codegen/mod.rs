//! Code generation: schedule tree → loop AST → C-like text.

pub mod ast;
pub mod ast_builder;
pub mod c;
mod scan;

pub use ast::{AstCondition, AstExpr, AstNode, CmpOp};
pub use ast_builder::{build_ast, AstBuilder};
pub use c::print_ast;
