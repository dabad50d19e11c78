//! Schedule tree printing.
//!
//! Trees print as nested s-expressions, one node per line:
//!
//! ```text
//! (domain "{ S[i] : i >= 0 and 9 >= i }"
//!   (band "{ S[i] -> [floor(i/4)] }" coincident=[1]
//!     (band "{ S[i] -> [i - 4*floor(i/4)] }" coincident=[1]
//!       (leaf))))
//! ```

use crate::schedule::{ScheduleNode, ScheduleTree};
use crate::utils::pretty::{format_list, PrettyPrint};
use pretty::{DocAllocator, DocBuilder};

/// Render a schedule tree.
pub fn print_schedule(tree: &ScheduleTree) -> String {
    tree.pretty()
}

fn quoted(text: impl std::fmt::Display) -> String {
    format!("\"{}\"", text)
}

fn head(node: &ScheduleNode) -> String {
    match node {
        ScheduleNode::Domain { domain, .. } => format!("(domain {}", quoted(domain)),
        ScheduleNode::Band { band, .. } => {
            let mut text = format!("(band {}", quoted(&band.partial));
            if band.coincident.iter().any(|&c| c) {
                let flags: Vec<u8> = band.coincident.iter().map(|&c| u8::from(c)).collect();
                text.push_str(&format!(" coincident=[{}]", format_list(&flags, ", ")));
            }
            text
        }
        ScheduleNode::Sequence { .. } => "(sequence".to_string(),
        ScheduleNode::Filter { filter, .. } => format!("(filter {}", quoted(filter)),
        ScheduleNode::Leaf => "(leaf".to_string(),
    }
}

impl PrettyPrint for ScheduleNode {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        let mut doc = allocator.text(head(self));
        for child in self.children() {
            doc = doc.append(allocator.hardline().append(child.to_doc(allocator)).nest(2));
        }
        doc.append(allocator.text(")"))
    }
}

impl PrettyPrint for ScheduleTree {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        self.root_node().to_doc(allocator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedral::{UnionMap, UnionSet};

    #[test]
    fn test_print_domain_and_leaf() {
        let domain: UnionSet = "{ S[i] : 0 <= i < 10 }".parse().unwrap();
        let tree = ScheduleTree::from_domain(domain.clone());
        assert_eq!(
            print_schedule(&tree),
            format!("(domain \"{}\"\n  (leaf))", domain)
        );
    }

    #[test]
    fn test_print_band_with_coincidence() {
        let domain: UnionSet = "{ S[i, j] : 0 <= i, j < 10 }".parse().unwrap();
        let map: UnionMap = "{ S[i, j] -> [i, j] }".parse().unwrap();
        let tree = ScheduleTree::from_domain(domain).insert_band(&map).unwrap();
        let band = tree.first_band().unwrap();
        let tree = tree.set_coincident(&band, 0, true).unwrap();

        let text = print_schedule(&tree);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "  (band \"{ S[i, j] -> [i, j] }\" coincident=[1, 0]");
        assert_eq!(lines[2], "    (leaf)))");
        assert_eq!(print_schedule(&tree), text);
    }
}
