//! # Analysis Module
//!
//! @title Semantic Model
//! @author Ramprasad
//!
//! Language-neutral semantic layer built on top of the uniform syntax tree.
//! One call to [`analyze`] runs the flow pass and returns a read-only
//! [`SemanticModel`] that the matcher, filters and classifier query.
//!
//! ## Components
//!
//! - **Tree**: node arena every syntax adapter lowers into
//! - **Scope**: lexical scopes and versioned bindings
//! - **Shape**: structural summaries of values with epoch-versioned fields
//! - **Chain**: member/index access paths with alias expansion
//! - **Flow**: the single source-order pass that builds all of the above

pub mod chain;
mod flow;
pub mod scope;
pub mod shape;
pub mod strings;
pub mod suppression;
pub mod tree;

use std::collections::HashMap;

pub use chain::{Chain, ChainRoot, Segment};
pub use scope::{Binding, BindingId, BindingKind, Resolution, ScopeId, ScopeKind, ScopeTree};
pub use shape::{FieldKey, Literal, OpaqueOrigin, Shape, ShapeId, ShapeStore};
pub use suppression::Suppressions;
pub use tree::{Field, LineIndex, Node, NodeId, NodeKind, Span, Tree, TreeBuilder};

use crate::error::AnalysisError;

/// Language properties the core needs from a syntax adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Blocks open their own scope (Rust), rather than only functions (JavaScript).
    pub block_scoped: bool,
}

/// Resource caps that turn pathological input into a per-file error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            max_depth: 512,
            max_nodes: 250_000,
        }
    }
}

/// Scopes, bindings and shapes of one file.
pub struct SemanticModel<'t> {
    tree: &'t Tree,
    scopes: ScopeTree,
    shapes: ShapeStore,
    epochs: Vec<u32>,
    node_scopes: Vec<Option<ScopeId>>,
    node_shapes: HashMap<NodeId, ShapeId>,
    suppressions: Suppressions,
}

/// Builds the semantic model of a parsed file.
///
/// # Arguments
///
/// * `tree` - The uniform tree produced by a syntax adapter
/// * `capabilities` - Scoping behaviour of the source language
/// * `limits` - Recursion and node caps
///
/// # Returns
///
/// The model, or an [`AnalysisError`] when a cap is exceeded.
pub fn analyze<'t>(
    tree: &'t Tree,
    capabilities: Capabilities,
    limits: AnalysisLimits,
) -> Result<SemanticModel<'t>, AnalysisError> {
    let result = flow::FlowBuilder::new(tree, capabilities, limits).run()?;
    log::debug!(
        "{}: {} scopes, {} bindings, {} shapes",
        tree.file(),
        result.scopes.scopes().len(),
        result.scopes.bindings().len(),
        result.shapes.len()
    );
    Ok(SemanticModel {
        tree,
        scopes: result.scopes,
        shapes: result.shapes,
        epochs: result.epochs,
        node_scopes: result.node_scopes,
        node_shapes: result.node_shapes,
        suppressions: Suppressions::scan(tree.source()),
    })
}

impl<'t> SemanticModel<'t> {
    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    pub fn scopes(&self) -> &ScopeTree {
        &self.scopes
    }

    pub fn shapes(&self) -> &ShapeStore {
        &self.shapes
    }

    /// Epoch at which the node was visited. Unvisited nodes inherit from
    /// their closest visited ancestor.
    pub fn epoch_of(&self, node: NodeId) -> u32 {
        std::iter::once(node)
            .chain(self.tree.ancestors(node))
            .map(|n| self.epochs[n.index()])
            .find(|e| *e > 0)
            .unwrap_or(0)
    }

    /// Scope the node was visited in.
    pub fn scope_of(&self, node: NodeId) -> ScopeId {
        std::iter::once(node)
            .chain(self.tree.ancestors(node))
            .find_map(|n| self.node_scopes[n.index()])
            .unwrap_or_else(|| self.scopes.root())
    }

    pub fn resolution(&self, node: NodeId) -> Resolution {
        self.scopes
            .resolution(node)
            .unwrap_or(Resolution::Undeclared)
    }

    pub fn chain(&self, node: NodeId) -> Option<Chain> {
        chain::resolve(self.tree, &self.scopes, node)
    }

    /// Shape held by a binding when read at `epoch`.
    pub fn binding_shape(&self, binding: BindingId, epoch: u32) -> Option<ShapeId> {
        let binding = self.scopes.binding(binding);
        match &binding.alias {
            Some(alias) => chain::terminus_shape(&self.scopes, &self.shapes, alias, epoch),
            None => binding.shape,
        }
    }

    /// Shape of an expression as seen where it appears.
    pub fn shape_of(&self, node: NodeId) -> Option<ShapeId> {
        if let Some(shape) = self.node_shapes.get(&node) {
            return Some(*shape);
        }
        match self.tree.kind(node) {
            NodeKind::Identifier | NodeKind::Member | NodeKind::Index => {
                let chain = self.chain(node)?;
                chain::terminus_shape(&self.scopes, &self.shapes, &chain, self.epoch_of(node))
            }
            NodeKind::Assignment => self
                .tree
                .child_by_field(node, Field::Right)
                .and_then(|r| self.shape_of(r)),
            _ => None,
        }
    }

    /// Static string value of an expression, with `*` for unknown parts.
    pub fn string_value(&self, node: NodeId) -> Option<String> {
        match self.tree.kind(node) {
            NodeKind::Identifier | NodeKind::Member | NodeKind::Index => {
                match self.shape_of(node).map(|s| self.shapes.get(s)) {
                    Some(Shape::Leaf(Literal::String(text))) => Some(text.clone()),
                    _ => None,
                }
            }
            _ => strings::concatenation(self.tree, node, &mut |child| self.string_value(child)),
        }
    }

    /// Statement-level node containing `node`: the ancestor-or-self whose
    /// parent is a program or block.
    pub fn statement_of(&self, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(parent) = self.tree.parent(current) {
            if matches!(self.tree.kind(parent), NodeKind::Program | NodeKind::Block) {
                return current;
            }
            current = parent;
        }
        current
    }

    /// Name of the innermost class or impl block enclosing `node`.
    pub fn enclosing_class_name(&self, node: NodeId) -> Option<&'t str> {
        let tree = self.tree;
        tree.ancestors(node)
            .find(|a| tree.kind(*a) == NodeKind::Class)
            .and_then(|class| tree.child_by_field(class, Field::Name))
            .and_then(|name| tree.text(name))
    }

    /// True when a disable comment before the enclosing statement names `rule_id`.
    pub fn is_suppressed(&self, node: NodeId, rule_id: &str) -> bool {
        if self.suppressions.is_empty() {
            return false;
        }
        let statement = self.statement_of(node);
        self.suppressions
            .covers(self.tree.span(statement).line, rule_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{JavaScriptAdapter, RustAdapter, SyntaxAdapter};

    fn js(source: &str) -> Tree {
        JavaScriptAdapter::new().parse("test.js", source).unwrap()
    }

    fn find_last(tree: &Tree, kind: NodeKind, text: &str) -> NodeId {
        tree.preorder()
            .into_iter()
            .filter(|n| tree.kind(*n) == kind && tree.text(*n) == Some(text))
            .last()
            .unwrap()
    }

    fn field_names(model: &SemanticModel, shape: ShapeId, epoch: u32) -> Vec<String> {
        model
            .shapes()
            .visible_fields(shape, epoch)
            .iter()
            .filter_map(|f| f.key.name().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_late_mutation_is_visible_to_later_reference() {
        let tree = js("const user = {};\nuser.email = \"a@b.com\";\nlogger.info(user);\n");
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();
        let reference = find_last(&tree, NodeKind::Identifier, "user");
        let shape = model.shape_of(reference).unwrap();
        assert_eq!(field_names(&model, shape, model.epoch_of(reference)), vec!["email"]);
    }

    #[test]
    fn test_earlier_reference_does_not_see_later_write() {
        let tree = js("const user = {};\nlogger.info(user);\nuser.email = \"a@b.com\";\n");
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();
        let reference = tree
            .preorder()
            .into_iter()
            .filter(|n| tree.text(*n) == Some("user") && tree.kind(*n) == NodeKind::Identifier)
            .nth(1)
            .unwrap();
        let shape = model.shape_of(reference).unwrap();
        assert!(field_names(&model, shape, model.epoch_of(reference)).is_empty());
    }

    #[test]
    fn test_undeclared_root_gets_implicit_binding() {
        let tree = js("user.email = \"a@b.com\";\nlogger.info(user);\n");
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();
        let reference = find_last(&tree, NodeKind::Identifier, "user");
        assert!(matches!(model.resolution(reference), Resolution::Bound(_)));
        let shape = model.shape_of(reference).unwrap();
        assert_eq!(field_names(&model, shape, model.epoch_of(reference)), vec!["email"]);
    }

    #[test]
    fn test_destructuring_aliases_member_chain() {
        let tree = js("function f(user) {\n  const { address } = user;\n  log(address.city);\n}\n");
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();
        let member = tree
            .preorder()
            .into_iter()
            .find(|n| tree.kind(*n) == NodeKind::Member)
            .unwrap();
        let chain = model.chain(member).unwrap();
        assert_eq!(chain.to_string(), "user.address.city");
        assert_eq!(chain.field_name(), Some("city"));
    }

    #[test]
    fn test_function_parameter_shadows_outer_binding() {
        let tree = js("const email = \"x\";\nfunction f(email) { log(email); }\n");
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();
        let reference = find_last(&tree, NodeKind::Identifier, "email");
        let Resolution::Bound(binding) = model.resolution(reference) else {
            panic!("expected a binding");
        };
        assert_eq!(model.scopes().binding(binding).kind, BindingKind::Parameter);
    }

    #[test]
    fn test_javascript_blocks_share_function_scope() {
        let tree = js("if (ok) { var token = 1; }\nlog(token);\n");
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();
        let reference = find_last(&tree, NodeKind::Identifier, "token");
        assert!(matches!(model.resolution(reference), Resolution::Bound(_)));
    }

    #[test]
    fn test_rust_blocks_are_scoped() {
        let source = "fn main() {\n    {\n        let token = 1;\n    }\n    log(token);\n}\n";
        let tree = RustAdapter::new().parse("main.rs", source).unwrap();
        let model = analyze(
            &tree,
            RustAdapter::new().capabilities(),
            AnalysisLimits::default(),
        )
        .unwrap();
        let reference = find_last(&tree, NodeKind::Identifier, "token");
        assert_eq!(model.resolution(reference), Resolution::Undeclared);
    }

    fn argument_members(tree: &Tree) -> Vec<NodeId> {
        tree.preorder()
            .into_iter()
            .filter(|n| {
                tree.kind(*n) == NodeKind::Member
                    && tree.parent(*n).map(|p| tree.kind(p)) == Some(NodeKind::Arguments)
            })
            .collect()
    }

    #[test]
    fn test_closure_mutation_is_visible_in_enclosing_scope() {
        let tree = js("const user = {};\nfunction f() { user.email = \"a\"; }\nlogger.info(user);\n");
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();
        let reference = find_last(&tree, NodeKind::Identifier, "user");
        let shape = model.shape_of(reference).unwrap();
        assert_eq!(field_names(&model, shape, model.epoch_of(reference)), vec!["email"]);
    }

    #[test]
    fn test_sibling_functions_do_not_share_bindings() {
        let tree = js("function f() { var x = { email: \"a\" }; }\nfunction g() { log(x); }\n");
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();
        let reference = find_last(&tree, NodeKind::Identifier, "x");
        assert_eq!(model.resolution(reference), Resolution::Undeclared);
    }

    #[test]
    fn test_string_index_equals_member_access() {
        let tree = js("const a = { b: { c: 1 } };\nlog(a.b.c);\nlog(a[\"b\"].c);\n");
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();
        let members = argument_members(&tree);
        assert_eq!(members.len(), 2);

        let dotted = model.chain(members[0]).unwrap();
        let indexed = model.chain(members[1]).unwrap();
        assert_eq!(dotted, indexed);
        assert_eq!(indexed.to_string(), "a.b.c");
        assert_eq!(model.shape_of(members[0]), model.shape_of(members[1]));
    }

    #[test]
    fn test_call_truncates_chain() {
        let tree = js("const obj = { x: make };\nlog(obj.x().a);\n");
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();

        let after_call = model.chain(argument_members(&tree)[0]).unwrap();
        assert_eq!(after_call.to_string(), "<call>.a");
        assert!(after_call.is_opaque());

        let callee = tree
            .preorder()
            .into_iter()
            .find(|n| tree.kind(*n) == NodeKind::Member && tree.content(*n) == "obj.x")
            .unwrap();
        let before_call = model.chain(callee).unwrap();
        assert_eq!(before_call.to_string(), "obj.x");
        assert!(!before_call.is_opaque());
        assert_eq!(before_call.root_name(), Some("obj"));
    }

    #[test]
    fn test_string_concatenation_marks_unknown_parts() {
        let tree = js("const greeting = \"Hello \" + name;\nsend(greeting);\n");
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();
        let reference = find_last(&tree, NodeKind::Identifier, "greeting");
        assert_eq!(model.string_value(reference).as_deref(), Some("Hello *"));
    }

    #[test]
    fn test_depth_cap_reports_error() {
        let nested = (0..40).fold(String::from("1"), |acc, _| format!("[{}]", acc));
        let tree = js(&format!("y = {};", nested));
        let limits = AnalysisLimits {
            max_depth: 16,
            max_nodes: 250_000,
        };
        let result = analyze(&tree, Capabilities::default(), limits);
        assert!(matches!(result, Err(AnalysisError::DepthExceeded { limit: 16 })));
    }

    #[test]
    fn test_node_cap_reports_error() {
        let tree = js("a(1, 2, 3, 4, 5, 6, 7, 8, 9);");
        let limits = AnalysisLimits {
            max_depth: 512,
            max_nodes: 4,
        };
        let result = analyze(&tree, Capabilities::default(), limits);
        assert!(matches!(result, Err(AnalysisError::NodeBudgetExceeded { limit: 4 })));
    }
}
