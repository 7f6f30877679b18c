//! # Access Chains
//!
//! @title Member and Index Chain Resolution
//! @author Ramprasad
//!
//! Turns expressions like `user.address["city"]` into a root plus an ordered
//! list of segments. Names bound through destructuring expand to the chain
//! they alias, so `const { address } = user; address.city` resolves to
//! `user.address.city`.

use std::fmt;

use super::scope::{BindingId, Resolution, ScopeTree};
use super::shape::{FieldKey, ShapeId, ShapeStore};
use super::tree::{Field, NodeId, NodeKind, Tree};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Field(String),
    Element(u64),
}

impl Segment {
    pub fn name(&self) -> Option<&str> {
        match self {
            Segment::Field(name) => Some(name),
            Segment::Element(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainRoot {
    Binding { id: BindingId, name: String },
    Undeclared(String),
    /// Value returned by a call. Starts a new, opaque chain.
    CallResult(NodeId),
    /// Any other expression, such as a literal or a parenthesized operation.
    Expression(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chain {
    pub root: ChainRoot,
    pub segments: Vec<Segment>,
    /// A computed index with no static value cut the chain short.
    pub unknown_tail: bool,
}

impl Chain {
    pub fn root_name(&self) -> Option<&str> {
        match &self.root {
            ChainRoot::Binding { name, .. } => Some(name),
            ChainRoot::Undeclared(name) => Some(name),
            _ => None,
        }
    }

    /// Name of the last named segment.
    pub fn field_name(&self) -> Option<&str> {
        self.segments.last().and_then(Segment::name)
    }

    /// Name of whatever holds the last segment: the previous segment, or the root.
    pub fn object_name(&self) -> Option<&str> {
        match self.segments.len() {
            0 => None,
            1 => self.root_name(),
            n => self.segments[n - 2].name(),
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(
            self.root,
            ChainRoot::CallResult(_) | ChainRoot::Expression(_)
        )
    }

    pub fn with_segment(&self, segment: Segment) -> Chain {
        let mut chain = self.clone();
        chain.segments.push(segment);
        chain
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            ChainRoot::Binding { name, .. } | ChainRoot::Undeclared(name) => write!(f, "{}", name)?,
            ChainRoot::CallResult(_) => write!(f, "<call>")?,
            ChainRoot::Expression(_) => write!(f, "<expr>")?,
        }
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => write!(f, ".{}", name)?,
                Segment::Element(i) => write!(f, "[{}]", i)?,
            }
        }
        if self.unknown_tail {
            write!(f, "[?]")?;
        }
        Ok(())
    }
}

/// Static key of a subscript, if it has one.
pub fn index_segment(tree: &Tree, index: NodeId) -> Option<Segment> {
    match tree.kind(index) {
        NodeKind::String => tree.text(index).map(|s| Segment::Field(s.to_string())),
        NodeKind::Number => tree
            .text(index)
            .and_then(|s| s.parse::<u64>().ok())
            .map(Segment::Element),
        _ => None,
    }
}

/// Resolves `node` to an access chain using already recorded references.
///
/// Returns `None` for nodes that are not identifiers, member accesses or
/// subscripts.
pub fn resolve(tree: &Tree, scopes: &ScopeTree, node: NodeId) -> Option<Chain> {
    if !matches!(
        tree.kind(node),
        NodeKind::Identifier | NodeKind::Member | NodeKind::Index
    ) {
        return None;
    }

    let mut segments = Vec::new();
    let mut unknown_tail = false;
    let mut current = node;

    let root = loop {
        match tree.kind(current) {
            NodeKind::Member => {
                let property = tree.child_by_field(current, Field::Property)?;
                segments.push(Segment::Field(tree.text(property)?.to_string()));
                current = tree.child_by_field(current, Field::Object)?;
            }
            NodeKind::Index => {
                let index = tree.child_by_field(current, Field::Index)?;
                match index_segment(tree, index) {
                    Some(segment) => segments.push(segment),
                    None => {
                        segments.clear();
                        unknown_tail = true;
                    }
                }
                current = tree.child_by_field(current, Field::Object)?;
            }
            NodeKind::Identifier => {
                let name = tree.text(current)?.to_string();
                break match scopes.resolution(current) {
                    Some(Resolution::Bound(id)) => ChainRoot::Binding { id, name },
                    _ => ChainRoot::Undeclared(name),
                };
            }
            NodeKind::Call => break ChainRoot::CallResult(current),
            _ => break ChainRoot::Expression(current),
        }
    };
    segments.reverse();

    let chain = Chain {
        root,
        segments,
        unknown_tail,
    };
    Some(expand_alias(scopes, chain))
}

/// Replaces an alias root with the chain it stands for.
pub fn expand_alias(scopes: &ScopeTree, chain: Chain) -> Chain {
    let ChainRoot::Binding { id, .. } = &chain.root else {
        return chain;
    };
    match &scopes.binding(*id).alias {
        Some(alias) => {
            let mut segments = alias.segments.clone();
            segments.extend(chain.segments);
            Chain {
                root: alias.root.clone(),
                segments,
                unknown_tail: alias.unknown_tail || chain.unknown_tail,
            }
        }
        None => chain,
    }
}

/// Shape at the end of `chain` as seen at `epoch`.
///
/// `None` when the root carries no shape, a segment was never written, or
/// the chain ends in an unknown index.
pub fn terminus_shape(
    scopes: &ScopeTree,
    shapes: &ShapeStore,
    chain: &Chain,
    epoch: u32,
) -> Option<ShapeId> {
    if chain.unknown_tail {
        return None;
    }
    let ChainRoot::Binding { id, .. } = &chain.root else {
        return None;
    };
    let mut current = scopes.binding(*id).shape?;
    for segment in &chain.segments {
        let key = match segment {
            Segment::Field(name) => FieldKey::Name(name.clone()),
            Segment::Element(i) => FieldKey::Element(*i),
        };
        current = shapes.field_at(current, &key, epoch)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_and_field_names() {
        let chain = Chain {
            root: ChainRoot::Undeclared("user".into()),
            segments: vec![
                Segment::Field("address".into()),
                Segment::Field("city".into()),
            ],
            unknown_tail: false,
        };
        assert_eq!(chain.field_name(), Some("city"));
        assert_eq!(chain.object_name(), Some("address"));
        assert_eq!(chain.to_string(), "user.address.city");
    }

    #[test]
    fn test_single_segment_object_is_root() {
        let chain = Chain {
            root: ChainRoot::Undeclared("user".into()),
            segments: vec![Segment::Field("email".into())],
            unknown_tail: false,
        };
        assert_eq!(chain.object_name(), Some("user"));
        assert!(!chain.is_opaque());
    }
}
