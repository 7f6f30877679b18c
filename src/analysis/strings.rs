//! # Static Strings
//!
//! @title String Value Recovery
//! @author Ramprasad
//!
//! Recovers string values of literals, templates and `+` concatenation.
//!
//! Parts whose value cannot be recovered are written as `*`.

use super::tree::{Field, NodeId, NodeKind, Tree};

/// Placeholder for an unknown part of a concatenated string.
pub const UNKNOWN_PART: &str = "*";

/// Static string value of `node`, delegating operands to `part`.
///
/// Returns `None` when the node is not string-valued at all, for example a
/// sum of two unknown operands.
pub fn concatenation(
    tree: &Tree,
    node: NodeId,
    part: &mut dyn FnMut(NodeId) -> Option<String>,
) -> Option<String> {
    match tree.kind(node) {
        NodeKind::String => tree.text(node).map(str::to_string),
        NodeKind::TemplateString => {
            let mut value = String::new();
            for child in tree.code_children(node) {
                match tree.kind(child) {
                    NodeKind::String => value.push_str(tree.text(child).unwrap_or_default()),
                    _ => match part(child) {
                        Some(text) => value.push_str(&text),
                        None => value.push_str(UNKNOWN_PART),
                    },
                }
            }
            Some(value)
        }
        NodeKind::Binary if tree.text(node) == Some("+") => {
            let left = tree.child_by_field(node, Field::Left).and_then(|n| part(n));
            let right = tree.child_by_field(node, Field::Right).and_then(|n| part(n));
            if left.is_none() && right.is_none() {
                return None;
            }
            Some(format!(
                "{}{}",
                left.as_deref().unwrap_or(UNKNOWN_PART),
                right.as_deref().unwrap_or(UNKNOWN_PART)
            ))
        }
        _ => None,
    }
}
