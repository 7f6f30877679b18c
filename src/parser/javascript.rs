//! # JavaScript Adapter
//!
//! @title tree-sitter Lowering for JavaScript
//! @author Ramprasad
//!
//! Parses JavaScript with `tree-sitter-javascript` and lowers the concrete
//! syntax tree into the uniform tree. Only named nodes are kept; operators
//! survive as node text. Parenthesized and `await` expressions are
//! transparent. `ERROR` regions become opaque `error` leaves.
//!
//! JavaScript is function scoped: blocks do not open scopes.

use tree_sitter::{Node, Parser};

use super::SyntaxAdapter;
use crate::analysis::{Capabilities, Field, LineIndex, NodeId, NodeKind, Tree, TreeBuilder};
use crate::error::AnalysisError;

/// Deeper subtrees are cut off as opaque error leaves.
const MAX_LOWERING_DEPTH: usize = 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct JavaScriptAdapter;

impl JavaScriptAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl SyntaxAdapter for JavaScriptAdapter {
    fn language(&self) -> &'static str {
        "javascript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "mjs", "cjs"]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            block_scoped: false,
        }
    }

    fn parse(&self, file_path: &str, source: &str) -> Result<Tree, AnalysisError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .map_err(|e| AnalysisError::Parse {
                file: file_path.to_string(),
                message: e.to_string(),
            })?;
        let parsed = parser
            .parse(source, None)
            .ok_or_else(|| AnalysisError::Parse {
                file: file_path.to_string(),
                message: "tree-sitter returned no tree".to_string(),
            })?;

        let root_node = parsed.root_node();
        if root_node.has_error() {
            log::debug!("{}: syntax errors lowered to error nodes", file_path);
        }

        let mut lowering = Lowering::new(file_path, source);
        let root = lowering.lower(root_node, 0);
        Ok(lowering.builder.finish(root))
    }
}

fn field_for(name: &str) -> Option<Field> {
    let field = match name {
        "object" => Field::Object,
        "property" => Field::Property,
        "index" => Field::Index,
        "function" | "constructor" => Field::Function,
        "arguments" => Field::Arguments,
        "left" => Field::Left,
        "right" => Field::Right,
        "key" => Field::Key,
        "value" => Field::Value,
        "name" => Field::Name,
        "parameters" | "parameter" => Field::Parameters,
        "body" => Field::Body,
        "condition" => Field::Condition,
        _ => return None,
    };
    Some(field)
}

/// Named children of `node` with the grammar field each one fills.
fn named_children<'a>(node: Node<'a>) -> Vec<(Option<&'static str>, Node<'a>)> {
    let mut children = Vec::new();
    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            let child = cursor.node();
            if child.is_named() {
                children.push((cursor.field_name(), child));
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    children
}

struct Lowering<'s> {
    source: &'s str,
    lines: LineIndex,
    builder: TreeBuilder,
}

impl<'s> Lowering<'s> {
    fn new(file_path: &str, source: &'s str) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
            builder: TreeBuilder::new(file_path, "javascript", source),
        }
    }

    fn text(&self, node: &Node<'_>) -> String {
        node.utf8_text(self.source.as_bytes())
            .unwrap_or("")
            .to_string()
    }

    fn leaf(&mut self, kind: NodeKind, node: &Node<'_>, text: Option<String>) -> NodeId {
        let span = self.lines.span(node.start_byte(), node.end_byte());
        self.builder.leaf(kind, span, text)
    }

    fn lower(&mut self, node: Node<'_>, depth: usize) -> NodeId {
        if depth > MAX_LOWERING_DEPTH || node.is_error() || node.is_missing() {
            return self.leaf(NodeKind::Error, &node, None);
        }

        match node.kind() {
            "program" => self.container(node, NodeKind::Program, None, depth),
            "statement_block" | "class_body" => self.container(node, NodeKind::Block, None, depth),
            "expression_statement" | "lexical_declaration" | "variable_declaration" => {
                self.container(node, NodeKind::Statement, None, depth)
            }
            "variable_declarator" => self.container(node, NodeKind::Declaration, None, depth),
            "function_declaration"
            | "function_expression"
            | "function"
            | "generator_function_declaration"
            | "generator_function"
            | "arrow_function"
            | "method_definition" => self.function(node, depth),
            "class_declaration" | "class" => self.container(node, NodeKind::Class, None, depth),
            "identifier"
            | "property_identifier"
            | "shorthand_property_identifier"
            | "shorthand_property_identifier_pattern"
            | "private_property_identifier"
            | "this"
            | "super" => {
                let text = self.text(&node);
                self.leaf(NodeKind::Identifier, &node, Some(text))
            }
            "member_expression" => self.container(node, NodeKind::Member, None, depth),
            "subscript_expression" => self.container(node, NodeKind::Index, None, depth),
            "call_expression" | "new_expression" => self.call(node, depth),
            "arguments" => self.container(node, NodeKind::Arguments, None, depth),
            "object" => self.object(node, NodeKind::Object, depth),
            "object_pattern" => self.object(node, NodeKind::ObjectPattern, depth),
            "pair" | "pair_pattern" => self.container(node, NodeKind::Pair, None, depth),
            "spread_element" | "rest_pattern" => self.container(node, NodeKind::Spread, None, depth),
            "array" | "array_pattern" => self.container(node, NodeKind::Array, None, depth),
            "assignment_expression" | "assignment_pattern" => {
                self.container(node, NodeKind::Assignment, Some("=".to_string()), depth)
            }
            "augmented_assignment_expression" => {
                let operator = self.operator(&node);
                self.container(node, NodeKind::Assignment, operator, depth)
            }
            "binary_expression" => {
                let operator = self.operator(&node);
                self.container(node, NodeKind::Binary, operator, depth)
            }
            "string" => {
                let raw = self.text(&node);
                let value = strip_quotes(&raw).to_string();
                self.leaf(NodeKind::String, &node, Some(value))
            }
            "template_string" => self.template(node, depth),
            "number" => {
                let text = self.text(&node);
                self.leaf(NodeKind::Number, &node, Some(text))
            }
            "true" | "false" => {
                let text = self.text(&node);
                self.leaf(NodeKind::Boolean, &node, Some(text))
            }
            "null" | "undefined" => self.leaf(NodeKind::Null, &node, None),
            "parenthesized_expression" | "await_expression" => {
                let inner = named_children(node)
                    .into_iter()
                    .map(|(_, c)| c)
                    .find(|c| c.kind() != "comment");
                match inner {
                    Some(inner) => self.lower(inner, depth + 1),
                    None => self.leaf(NodeKind::Other, &node, None),
                }
            }
            "return_statement" => self.container(node, NodeKind::Return, None, depth),
            "comment" => {
                let text = self.text(&node);
                self.leaf(NodeKind::Comment, &node, Some(text))
            }
            _ => self.container(node, NodeKind::Other, None, depth),
        }
    }

    fn operator(&self, node: &Node<'_>) -> Option<String> {
        node.child_by_field_name("operator")
            .map(|op| op.kind().to_string())
    }

    /// Lowers every named child, keeping grammar fields.
    fn container(
        &mut self,
        node: Node<'_>,
        kind: NodeKind,
        text: Option<String>,
        depth: usize,
    ) -> NodeId {
        let mut children = Vec::new();
        for (field, child) in named_children(node) {
            let lowered = self.lower(child, depth + 1);
            children.push((field.and_then(field_for), lowered));
        }
        let span = self.lines.span(node.start_byte(), node.end_byte());
        self.builder.node(kind, span, text, children)
    }

    fn function(&mut self, node: Node<'_>, depth: usize) -> NodeId {
        let mut children = Vec::new();
        for (field, child) in named_children(node) {
            match field {
                Some("parameters") => {
                    for (_, param) in named_children(child) {
                        if param.kind() != "comment" {
                            let lowered = self.parameter(param, depth + 1);
                            children.push((Some(Field::Parameters), lowered));
                        }
                    }
                }
                Some("parameter") => {
                    let lowered = self.parameter(child, depth + 1);
                    children.push((Some(Field::Parameters), lowered));
                }
                Some("name") => {
                    let lowered = self.lower(child, depth + 1);
                    children.push((Some(Field::Name), lowered));
                }
                Some("body") => {
                    let lowered = self.lower(child, depth + 1);
                    children.push((Some(Field::Body), lowered));
                }
                _ => {}
            }
        }
        let span = self.lines.span(node.start_byte(), node.end_byte());
        self.builder.node(NodeKind::Function, span, None, children)
    }

    fn parameter(&mut self, node: Node<'_>, depth: usize) -> NodeId {
        let mut children = Vec::new();
        if node.kind() == "assignment_pattern" {
            if let Some(left) = node.child_by_field_name("left") {
                let lowered = self.lower(left, depth + 1);
                children.push((Some(Field::Name), lowered));
            }
            if let Some(right) = node.child_by_field_name("right") {
                let lowered = self.lower(right, depth + 1);
                children.push((Some(Field::Value), lowered));
            }
        } else {
            let lowered = self.lower(node, depth + 1);
            children.push((Some(Field::Name), lowered));
        }
        let span = self.lines.span(node.start_byte(), node.end_byte());
        self.builder.node(NodeKind::Parameter, span, None, children)
    }

    fn call(&mut self, node: Node<'_>, depth: usize) -> NodeId {
        let mut children = Vec::new();
        for (field, child) in named_children(node) {
            match field {
                Some("function") | Some("constructor") => {
                    let lowered = self.lower(child, depth + 1);
                    children.push((Some(Field::Function), lowered));
                }
                Some("arguments") if child.kind() == "arguments" => {
                    let lowered = self.lower(child, depth + 1);
                    children.push((Some(Field::Arguments), lowered));
                }
                Some("arguments") => {
                    // Tagged template: the template is the only argument.
                    let inner = self.lower(child, depth + 2);
                    let span = self.lines.span(child.start_byte(), child.end_byte());
                    let arguments =
                        self.builder
                            .node(NodeKind::Arguments, span, None, vec![(None, inner)]);
                    children.push((Some(Field::Arguments), arguments));
                }
                _ => {}
            }
        }
        let span = self.lines.span(node.start_byte(), node.end_byte());
        self.builder.node(NodeKind::Call, span, None, children)
    }

    fn object(&mut self, node: Node<'_>, kind: NodeKind, depth: usize) -> NodeId {
        let mut children = Vec::new();
        for (_, child) in named_children(node) {
            let lowered = match child.kind() {
                "shorthand_property_identifier" | "shorthand_property_identifier_pattern" => {
                    self.shorthand_pair(child, None, depth + 1)
                }
                "object_assignment_pattern" => {
                    let left = child.child_by_field_name("left");
                    let right = child.child_by_field_name("right");
                    match left {
                        Some(left) if left.kind() == "shorthand_property_identifier_pattern" => {
                            self.shorthand_pair(left, right, depth + 1)
                        }
                        _ => self.container(child, NodeKind::Assignment, Some("=".into()), depth + 1),
                    }
                }
                _ => self.lower(child, depth + 1),
            };
            children.push((None, lowered));
        }
        let span = self.lines.span(node.start_byte(), node.end_byte());
        self.builder.node(kind, span, None, children)
    }

    /// `{ email }` becomes a pair whose key and value are both `email`.
    fn shorthand_pair(&mut self, ident: Node<'_>, default: Option<Node<'_>>, depth: usize) -> NodeId {
        let name = self.text(&ident);
        let key = self.leaf(NodeKind::Identifier, &ident, Some(name.clone()));
        let mut value = self.leaf(NodeKind::Identifier, &ident, Some(name));
        if let Some(default) = default {
            let right = self.lower(default, depth + 1);
            let span = self
                .lines
                .span(ident.start_byte(), default.end_byte());
            value = self.builder.node(
                NodeKind::Assignment,
                span,
                Some("=".to_string()),
                vec![(Some(Field::Left), value), (Some(Field::Right), right)],
            );
        }
        let span = self.builder.span_of(value);
        self.builder.node(
            NodeKind::Pair,
            span,
            None,
            vec![(Some(Field::Key), key), (Some(Field::Value), value)],
        )
    }

    /// Splits a template into literal chunks and substituted expressions.
    fn template(&mut self, node: Node<'_>, depth: usize) -> NodeId {
        let start = node.start_byte() + 1;
        let end = node.end_byte().saturating_sub(1).max(start);
        let mut position = start;
        let mut children = Vec::new();

        for (_, child) in named_children(node) {
            if child.kind() != "template_substitution" {
                continue;
            }
            if child.start_byte() > position {
                let chunk = self.chunk(position, child.start_byte());
                children.push((None, chunk));
            }
            let inner = named_children(child)
                .into_iter()
                .map(|(_, c)| c)
                .find(|c| c.kind() != "comment");
            if let Some(inner) = inner {
                let lowered = self.lower(inner, depth + 1);
                children.push((None, lowered));
            }
            position = child.end_byte();
        }
        if position < end {
            let chunk = self.chunk(position, end);
            children.push((None, chunk));
        }

        let span = self.lines.span(node.start_byte(), node.end_byte());
        self.builder
            .node(NodeKind::TemplateString, span, None, children)
    }

    fn chunk(&mut self, start: usize, end: usize) -> NodeId {
        let text = self.source.get(start..end).unwrap_or("").to_string();
        let span = self.lines.span(start, end);
        self.builder.leaf(NodeKind::String, span, Some(text))
    }
}

fn strip_quotes(raw: &str) -> &str {
    let mut chars = raw.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open), Some(close)) if open == close && matches!(open, '"' | '\'' | '`') => {
            &raw[open.len_utf8()..raw.len() - close.len_utf8()]
        }
        _ => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Tree {
        JavaScriptAdapter::new().parse("test.js", source).unwrap()
    }

    fn kinds(tree: &Tree) -> Vec<NodeKind> {
        tree.preorder().into_iter().map(|n| tree.kind(n)).collect()
    }

    #[test]
    fn test_member_call_lowering() {
        let tree = parse("logger.info(user);");
        let call = tree
            .preorder()
            .into_iter()
            .find(|n| tree.kind(*n) == NodeKind::Call)
            .unwrap();
        let function = tree.child_by_field(call, Field::Function).unwrap();
        assert_eq!(tree.kind(function), NodeKind::Member);
        let property = tree.child_by_field(function, Field::Property).unwrap();
        assert_eq!(tree.text(property), Some("info"));
        let arguments = tree.child_by_field(call, Field::Arguments).unwrap();
        assert_eq!(tree.children(arguments).len(), 1);
    }

    #[test]
    fn test_shorthand_property_becomes_pair() {
        let tree = parse("const o = { email };");
        let pair = tree
            .preorder()
            .into_iter()
            .find(|n| tree.kind(*n) == NodeKind::Pair)
            .unwrap();
        let key = tree.child_by_field(pair, Field::Key).unwrap();
        let value = tree.child_by_field(pair, Field::Value).unwrap();
        assert_eq!(tree.text(key), Some("email"));
        assert_eq!(tree.text(value), Some("email"));
    }

    #[test]
    fn test_string_quotes_are_stripped() {
        let tree = parse("x = 'first name';");
        let string = tree
            .preorder()
            .into_iter()
            .find(|n| tree.kind(*n) == NodeKind::String)
            .unwrap();
        assert_eq!(tree.text(string), Some("first name"));
    }

    #[test]
    fn test_template_string_chunks() {
        let tree = parse("x = `Hi ${name}!`;");
        let template = tree
            .preorder()
            .into_iter()
            .find(|n| tree.kind(*n) == NodeKind::TemplateString)
            .unwrap();
        let parts: Vec<_> = tree
            .children(template)
            .iter()
            .map(|c| (tree.kind(*c), tree.text(*c).map(str::to_string)))
            .collect();
        assert_eq!(
            parts,
            vec![
                (NodeKind::String, Some("Hi ".to_string())),
                (NodeKind::Identifier, Some("name".to_string())),
                (NodeKind::String, Some("!".to_string())),
            ]
        );
    }

    #[test]
    fn test_parentheses_are_transparent() {
        let tree = parse("((user));");
        assert_eq!(
            kinds(&tree),
            vec![NodeKind::Program, NodeKind::Statement, NodeKind::Identifier]
        );
    }

    #[test]
    fn test_syntax_error_is_opaque_not_fatal() {
        let tree = parse("const = ;\nlogger.info(user);\n");
        assert!(kinds(&tree).contains(&NodeKind::Error));
        assert!(kinds(&tree).contains(&NodeKind::Call));
    }

    #[test]
    fn test_arrow_function_parameters() {
        let tree = parse("const f = (user, { email }) => send(user);");
        let params: Vec<_> = tree
            .preorder()
            .into_iter()
            .filter(|n| tree.kind(*n) == NodeKind::Parameter)
            .collect();
        assert_eq!(params.len(), 2);
        let pattern = tree.child_by_field(params[1], Field::Name).unwrap();
        assert_eq!(tree.kind(pattern), NodeKind::ObjectPattern);
    }
}
