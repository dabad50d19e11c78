//! C-like rendering of the loop AST.
//!
//! Loops print as `for (it = lo; it <= hi; it += stride) {`, guards as
//! `if (cond) {` and statement instances as `S(i1, j1);`, with two-space
//! indentation and braces always present.

use crate::codegen::ast::{AstCondition, AstExpr, AstNode, CmpOp};
use crate::polyhedral::expr::format_linear;
use crate::utils::pretty::{format_list, CodeFormatter};
use std::fmt;

/// Render an AST as C-like text.
pub fn print_ast(node: &AstNode) -> String {
    let mut f = CodeFormatter::default_indent();
    write_node(&mut f, node);
    f.finish()
}

fn write_node(f: &mut CodeFormatter, node: &AstNode) {
    match node {
        AstNode::For {
            iterator,
            lower,
            upper,
            stride,
            body,
        } => {
            let header = format!(
                "for ({it} = {lo}; {it} <= {hi}; {it} += {stride})",
                it = iterator,
                lo = lower,
                hi = upper,
                stride = stride
            );
            f.block(&header, |f| write_node(f, body));
        }
        AstNode::If { condition, body } => {
            f.block(&format!("if ({})", condition), |f| write_node(f, body));
        }
        AstNode::Block(children) => {
            for child in children {
                write_node(f, child);
            }
        }
        AstNode::Call { name, args } => {
            f.writeln(&format!("{}({});", name, format_list(args, ", ")));
        }
    }
}

/// Whether the expression prints as a single token or call.
fn is_atomic(e: &AstExpr) -> bool {
    match e {
        AstExpr::Linear { terms, constant } => match terms.as_slice() {
            [] => *constant >= 0,
            [(1, _)] => *constant == 0,
            _ => false,
        },
        AstExpr::FloorDiv(..) | AstExpr::CeilDiv(..) | AstExpr::Min(_) | AstExpr::Max(_) => true,
        AstExpr::Add(..) | AstExpr::Mul(..) | AstExpr::Div(..) => false,
    }
}

fn operand(e: &AstExpr) -> String {
    if is_atomic(e) {
        e.to_string()
    } else {
        format!("({})", e)
    }
}

/// `name(a, b)`, nesting to the left for more than two items.
fn fold_call(name: &str, items: &[AstExpr]) -> String {
    let mut iter = items.iter();
    let mut out = match iter.next() {
        Some(first) => first.to_string(),
        None => return "0".to_string(),
    };
    for item in iter {
        out = format!("{}({}, {})", name, out, item);
    }
    out
}

impl fmt::Display for AstExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstExpr::Linear { terms, constant } => write!(f, "{}", format_linear(terms, *constant)),
            AstExpr::Add(a, b) => match b.as_constant() {
                Some(c) if c < 0 => write!(f, "{} - {}", a, c.unsigned_abs()),
                _ => write!(f, "{} + {}", a, operand(b)),
            },
            AstExpr::Mul(k, e) if *k == -1 => write!(f, "-{}", operand(e)),
            AstExpr::Mul(k, e) => write!(f, "{}*{}", k, operand(e)),
            AstExpr::Div(e, d) => write!(f, "{} / {}", operand(e), d),
            AstExpr::FloorDiv(e, d) => write!(f, "floord({}, {})", e, d),
            AstExpr::CeilDiv(e, d) => write!(f, "ceild({}, {})", e, d),
            AstExpr::Min(items) => write!(f, "{}", fold_call("min", items)),
            AstExpr::Max(items) => write!(f, "{}", fold_call("max", items)),
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
            CmpOp::Eq => "==",
        };
        write!(f, "{}", op)
    }
}

impl fmt::Display for AstCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstCondition::Compare { lhs, op, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            AstCondition::Divisible { expr, divisor } => write!(f, "{} % {} == 0", operand(expr), divisor),
            AstCondition::And(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|c| match c {
                        AstCondition::Or(_) => format!("({})", c),
                        _ => c.to_string(),
                    })
                    .collect();
                write!(f, "{}", parts.join(" && "))
            }
            AstCondition::Or(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|c| match c {
                        AstCondition::And(_) => format!("({})", c),
                        _ => c.to_string(),
                    })
                    .collect();
                write!(f, "{}", parts.join(" || "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<AstExpr>) -> AstNode {
        AstNode::Call {
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn test_print_loop() {
        let ast = AstNode::For {
            iterator: "i".to_string(),
            lower: AstExpr::int(0),
            upper: AstExpr::int(4),
            stride: 1,
            body: Box::new(call("S", vec![AstExpr::var("i")])),
        };
        assert_eq!(print_ast(&ast), "for (i = 0; i <= 4; i += 1) {\n  S(i);\n}\n");
    }

    #[test]
    fn test_print_bounds() {
        let i0 = || AstExpr::var("i0");
        let lower = AstExpr::Max(vec![AstExpr::int(0), i0().mul(32)]);
        let upper = AstExpr::Min(vec![
            AstExpr::int(99),
            AstExpr::linear(vec![(32, "i0".to_string())], 31),
        ]);
        assert_eq!(lower.to_string(), "max(0, 32*i0)");
        assert_eq!(upper.to_string(), "min(99, 32*i0 + 31)");

        let three = AstExpr::Min(vec![AstExpr::int(1), i0(), AstExpr::var("n")]);
        assert_eq!(three.to_string(), "min(min(1, i0), n)");

        let n = AstExpr::linear(vec![(1, "n".to_string())], -1);
        assert_eq!(AstExpr::FloorDiv(Box::new(n.clone()), 32).to_string(), "floord(n - 1, 32)");
        assert_eq!(AstExpr::Div(Box::new(n), 2).to_string(), "(n - 1) / 2");
        assert_eq!(AstExpr::Div(Box::new(i0()), 2).to_string(), "i0 / 2");
    }

    #[test]
    fn test_print_guard() {
        let cond = AstCondition::And(vec![
            AstCondition::Compare {
                lhs: AstExpr::var("i0"),
                op: CmpOp::Le,
                rhs: AstExpr::int(9),
            },
            AstCondition::Divisible {
                expr: AstExpr::linear(vec![(1, "i0".to_string())], 1),
                divisor: 2,
            },
        ]);
        let ast = AstNode::If {
            condition: cond,
            body: Box::new(call("S", vec![AstExpr::var("i0")])),
        };
        assert_eq!(
            print_ast(&ast),
            "if (i0 <= 9 && (i0 + 1) % 2 == 0) {\n  S(i0);\n}\n"
        );
    }

    #[test]
    fn test_empty_block_prints_nothing() {
        assert_eq!(print_ast(&AstNode::Block(Vec::new())), "");
    }
}
