//! # Uniform Syntax Tree
//!
//! @title Language-Neutral Node Arena
//! @author Ramprasad
//!
//! Every syntax adapter lowers its native parse tree into this shape. Nodes
//! live in a flat arena addressed by [`NodeId`]; children are stored in
//! source order and carry the field role they play in their parent
//! (`object` vs `property` of a member access, `key` vs `value` of a pair).
//!
//! The tree is immutable once [`TreeBuilder::finish`] has run.

use serde::{Deserialize, Serialize};

/// Handle into a [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Closed set of node kinds every adapter maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Program,
    Block,
    Function,
    Class,
    Parameter,
    Identifier,
    Member,
    Index,
    Call,
    Arguments,
    Object,
    Pair,
    Spread,
    Array,
    ObjectPattern,
    Assignment,
    Declaration,
    Statement,
    Return,
    String,
    TemplateString,
    Number,
    Boolean,
    Null,
    Binary,
    Comment,
    Error,
    Other,
}

impl NodeKind {
    /// Name used in placeholder type lists (`$<X:identifier|member>`).
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Program => "program",
            NodeKind::Block => "block",
            NodeKind::Function => "function",
            NodeKind::Class => "class",
            NodeKind::Parameter => "parameter",
            NodeKind::Identifier => "identifier",
            NodeKind::Member => "member",
            NodeKind::Index => "index",
            NodeKind::Call => "call",
            NodeKind::Arguments => "arguments",
            NodeKind::Object => "object",
            NodeKind::Pair => "pair",
            NodeKind::Spread => "spread",
            NodeKind::Array => "array",
            NodeKind::ObjectPattern => "object_pattern",
            NodeKind::Assignment => "assignment",
            NodeKind::Declaration => "declaration",
            NodeKind::Statement => "statement",
            NodeKind::Return => "return",
            NodeKind::String => "string",
            NodeKind::TemplateString => "template_string",
            NodeKind::Number => "number",
            NodeKind::Boolean => "boolean",
            NodeKind::Null => "null",
            NodeKind::Binary => "binary",
            NodeKind::Comment => "comment",
            NodeKind::Error => "error",
            NodeKind::Other => "other",
        }
    }

    /// Inverse of [`NodeKind::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.trim().to_lowercase().as_str() {
            "program" => NodeKind::Program,
            "block" => NodeKind::Block,
            "function" => NodeKind::Function,
            "class" => NodeKind::Class,
            "parameter" => NodeKind::Parameter,
            "identifier" => NodeKind::Identifier,
            "member" => NodeKind::Member,
            "index" => NodeKind::Index,
            "call" => NodeKind::Call,
            "arguments" => NodeKind::Arguments,
            "object" => NodeKind::Object,
            "pair" => NodeKind::Pair,
            "spread" => NodeKind::Spread,
            "array" => NodeKind::Array,
            "object_pattern" => NodeKind::ObjectPattern,
            "assignment" => NodeKind::Assignment,
            "declaration" => NodeKind::Declaration,
            "statement" => NodeKind::Statement,
            "return" => NodeKind::Return,
            "string" => NodeKind::String,
            "template_string" => NodeKind::TemplateString,
            "number" => NodeKind::Number,
            "boolean" => NodeKind::Boolean,
            "null" => NodeKind::Null,
            "binary" => NodeKind::Binary,
            "comment" => NodeKind::Comment,
            "error" => NodeKind::Error,
            "other" => NodeKind::Other,
            _ => return None,
        };
        Some(kind)
    }

    /// Kinds whose `text` takes part in structural equality.
    pub fn has_significant_text(&self) -> bool {
        matches!(
            self,
            NodeKind::Identifier
                | NodeKind::String
                | NodeKind::Number
                | NodeKind::Boolean
                | NodeKind::Binary
                | NodeKind::Object
                | NodeKind::Assignment
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            NodeKind::String | NodeKind::Number | NodeKind::Boolean | NodeKind::Null
        )
    }

    /// Containers whose children are matched as an unanchored subsequence.
    pub fn is_unordered_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Program
                | NodeKind::Block
                | NodeKind::Class
                | NodeKind::Object
                | NodeKind::ObjectPattern
        )
    }
}

/// Role a child plays inside its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Object,
    Property,
    Index,
    Function,
    Arguments,
    Left,
    Right,
    Key,
    Value,
    Name,
    Parameters,
    Body,
    Condition,
}

/// Source position of a node. Lines and columns are 1-based.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Span {
    /// Smallest span covering both `self` and `other`.
    pub fn cover(self, other: Span) -> Span {
        let (start, end) = (
            if self.start_byte <= other.start_byte { self } else { other },
            if self.end_byte >= other.end_byte { self } else { other },
        );
        Span {
            start_byte: start.start_byte,
            line: start.line,
            column: start.column,
            end_byte: end.end_byte,
            end_line: end.end_line,
            end_column: end.end_column,
        }
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub field: Option<Field>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub span: Span,
    /// Identifier name, unquoted string value, operator or struct name.
    pub text: Option<String>,
}

/// A parsed file in uniform form.
#[derive(Debug, Clone)]
pub struct Tree {
    file: String,
    language: String,
    source: String,
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.node(id).text.as_deref()
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Children with comments filtered out.
    pub fn code_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.kind(*c) != NodeKind::Comment)
            .collect()
    }

    pub fn child_by_field(&self, id: NodeId, field: Field) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.node(*c).field == Some(field))
    }

    /// Raw source text covered by the node.
    pub fn content(&self, id: NodeId) -> &str {
        let span = self.span(id);
        self.source.get(span.start_byte..span.end_byte).unwrap_or("")
    }

    /// Parent chain starting at the node's parent.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        ancestor == node || self.ancestors(node).any(|a| a == ancestor)
    }

    /// All nodes in source order (pre-order, children left to right).
    pub fn preorder(&self) -> Vec<NodeId> {
        self.subtree(self.root)
    }

    /// `id` and its descendants, in source order.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }
}

pub struct Ancestors<'t> {
    tree: &'t Tree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

/// Bottom-up builder used by syntax adapters.
///
/// Children are created before their parent; [`TreeBuilder::node`] wires up
/// parent links and field roles.
pub struct TreeBuilder {
    file: String,
    language: String,
    source: String,
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new(file: &str, language: &str, source: &str) -> Self {
        Self {
            file: file.to_string(),
            language: language.to_string(),
            source: source.to_string(),
            nodes: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn leaf(&mut self, kind: NodeKind, span: Span, text: Option<String>) -> NodeId {
        self.node(kind, span, text, Vec::new())
    }

    /// Creates a node owning `children`, each tagged with an optional field.
    pub fn node(
        &mut self,
        kind: NodeKind,
        span: Span,
        text: Option<String>,
        children: Vec<(Option<Field>, NodeId)>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let mut ids = Vec::with_capacity(children.len());
        for (field, child) in children {
            let node = &mut self.nodes[child.index()];
            node.parent = Some(id);
            node.field = field;
            ids.push(child);
        }
        self.nodes.push(Node {
            kind,
            field: None,
            parent: None,
            children: ids,
            span,
            text,
        });
        id
    }

    pub fn span_of(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    pub fn finish(self, root: NodeId) -> Tree {
        Tree {
            file: self.file,
            language: self.language,
            source: self.source,
            nodes: self.nodes,
            root,
        }
    }
}

/// Converts between byte offsets and 1-based line/column positions.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Byte offset of a 1-based line and 0-based character column.
    pub fn offset(&self, source: &str, line: usize, char_column: usize) -> usize {
        let Some(start) = self.line_starts.get(line.saturating_sub(1)).copied() else {
            return source.len();
        };
        let rest = source.get(start..).unwrap_or("");
        let within = rest
            .char_indices()
            .take_while(|(_, c)| *c != '\n')
            .nth(char_column)
            .map(|(i, _)| i)
            .unwrap_or_else(|| rest.find('\n').unwrap_or(rest.len()));
        start + within
    }

    /// 1-based line and column for a byte offset.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }

    pub fn span(&self, start_byte: usize, end_byte: usize) -> Span {
        let (line, column) = self.position(start_byte);
        let (end_line, end_column) = self.position(end_byte);
        Span {
            start_byte,
            end_byte,
            line,
            column,
            end_line,
            end_column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tree {
        let source = "user.email";
        let index = LineIndex::new(source);
        let mut b = TreeBuilder::new("a.js", "javascript", source);
        let object = b.leaf(NodeKind::Identifier, index.span(0, 4), Some("user".into()));
        let property = b.leaf(NodeKind::Identifier, index.span(5, 10), Some("email".into()));
        let member = b.node(
            NodeKind::Member,
            index.span(0, 10),
            None,
            vec![(Some(Field::Object), object), (Some(Field::Property), property)],
        );
        let root = b.node(NodeKind::Program, index.span(0, 10), None, vec![(None, member)]);
        b.finish(root)
    }

    #[test]
    fn test_builder_links_parents_and_fields() {
        let tree = sample();
        let member = tree.children(tree.root())[0];
        let property = tree.child_by_field(member, Field::Property).unwrap();
        assert_eq!(tree.text(property), Some("email"));
        assert_eq!(tree.parent(property), Some(member));
        assert_eq!(tree.content(member), "user.email");
    }

    #[test]
    fn test_preorder_is_source_order() {
        let tree = sample();
        let kinds: Vec<_> = tree.preorder().into_iter().map(|id| tree.kind(id)).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Program,
                NodeKind::Member,
                NodeKind::Identifier,
                NodeKind::Identifier
            ]
        );
    }

    #[test]
    fn test_line_index_positions() {
        let source = "a\nbc\n  d";
        let index = LineIndex::new(source);
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(3), (2, 2));
        assert_eq!(index.position(7), (3, 3));
        assert_eq!(index.offset(source, 3, 2), 7);
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in [NodeKind::Identifier, NodeKind::ObjectPattern, NodeKind::TemplateString] {
            assert_eq!(NodeKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(NodeKind::from_name("nope"), None);
    }
}
