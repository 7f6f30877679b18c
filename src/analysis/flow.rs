//! # Flow Pass
//!
//! @title Single-Pass Scope and Shape Builder
//! @author Ramprasad
//!
//! Walks the uniform tree once, in source order, and builds everything the
//! matcher and classifier later query:
//!
//! - the scope tree and its bindings
//! - the resolution of every identifier reference
//! - object shapes, including property writes made after construction
//! - an epoch per visited node, so later reads see earlier writes only
//!
//! ## Binding rules
//!
//! - Functions open a scope; their parameters bind inside it.
//! - Blocks open a scope only when the language is block scoped.
//! - A declaration binds in the current scope. A bare `name = value`
//!   assignment also binds a new version in the current scope.
//! - Destructured names become aliases of `value.key`.
//! - Writing a property on a name nothing declared creates an implicit
//!   binding in the program scope.

use std::collections::HashMap;

use super::chain::{self, Chain, ChainRoot, Segment};
use super::scope::{BindingKind, Resolution, ScopeId, ScopeKind, ScopeTree};
use super::shape::{FieldKey, Literal, OpaqueOrigin, Shape, ShapeId, ShapeStore};
use super::strings;
use super::tree::{Field, NodeId, NodeKind, Tree};
use super::{AnalysisLimits, Capabilities};
use crate::error::AnalysisError;

/// Everything the pass produces.
pub(crate) struct FlowResult {
    pub scopes: ScopeTree,
    pub shapes: ShapeStore,
    pub epochs: Vec<u32>,
    pub node_scopes: Vec<Option<ScopeId>>,
    pub node_shapes: HashMap<NodeId, ShapeId>,
}

pub(crate) struct FlowBuilder<'t> {
    tree: &'t Tree,
    capabilities: Capabilities,
    limits: AnalysisLimits,
    scopes: ScopeTree,
    shapes: ShapeStore,
    epochs: Vec<u32>,
    node_scopes: Vec<Option<ScopeId>>,
    node_shapes: HashMap<NodeId, ShapeId>,
    current: ScopeId,
    epoch: u32,
}

impl<'t> FlowBuilder<'t> {
    pub fn new(tree: &'t Tree, capabilities: Capabilities, limits: AnalysisLimits) -> Self {
        let scopes = ScopeTree::new(tree.root());
        let current = scopes.root();
        Self {
            tree,
            capabilities,
            limits,
            scopes,
            shapes: ShapeStore::new(),
            epochs: vec![0; tree.len()],
            node_scopes: vec![None; tree.len()],
            node_shapes: HashMap::new(),
            current,
            epoch: 0,
        }
    }

    /// Runs the pass over the whole tree.
    pub fn run(mut self) -> Result<FlowResult, AnalysisError> {
        if self.tree.len() > self.limits.max_nodes {
            return Err(AnalysisError::NodeBudgetExceeded {
                limit: self.limits.max_nodes,
            });
        }
        self.visit(self.tree.root(), 0)?;
        Ok(FlowResult {
            scopes: self.scopes,
            shapes: self.shapes,
            epochs: self.epochs,
            node_scopes: self.node_scopes,
            node_shapes: self.node_shapes,
        })
    }

    fn mark(&mut self, node: NodeId) {
        self.epoch += 1;
        self.epochs[node.index()] = self.epoch;
        self.node_scopes[node.index()] = Some(self.current);
    }

    fn visit(&mut self, node: NodeId, depth: usize) -> Result<(), AnalysisError> {
        if depth > self.limits.max_depth {
            return Err(AnalysisError::DepthExceeded {
                limit: self.limits.max_depth,
            });
        }
        self.mark(node);

        match self.tree.kind(node) {
            NodeKind::Function => self.visit_function(node, depth)?,
            NodeKind::Class => self.visit_class(node, depth)?,
            NodeKind::Block => self.visit_block(node, depth)?,
            NodeKind::Declaration => self.visit_declaration(node, depth)?,
            NodeKind::Assignment => self.visit_assignment(node, depth)?,
            NodeKind::Parameter => self.visit_parameter(node, depth)?,
            NodeKind::Identifier => self.reference(node),
            NodeKind::Member => {
                if let Some(object) = self.tree.child_by_field(node, Field::Object) {
                    self.visit(object, depth + 1)?;
                }
            }
            NodeKind::Pair => {
                for child in self.tree.children(node).to_vec() {
                    let static_key = self.tree.node(child).field == Some(Field::Key)
                        && matches!(
                            self.tree.kind(child),
                            NodeKind::Identifier | NodeKind::String | NodeKind::Number
                        );
                    if !static_key {
                        self.visit(child, depth + 1)?;
                    }
                }
            }
            // Malformed regions stay opaque.
            NodeKind::Error | NodeKind::Comment => {}
            _ => self.visit_children(node, depth)?,
        }

        self.memoize(node);
        Ok(())
    }

    fn visit_children(&mut self, node: NodeId, depth: usize) -> Result<(), AnalysisError> {
        for child in self.tree.children(node).to_vec() {
            self.visit(child, depth + 1)?;
        }
        Ok(())
    }

    fn reference(&mut self, node: NodeId) {
        let Some(name) = self.tree.text(node) else {
            return;
        };
        let resolution = match self.scopes.lookup(self.current, name) {
            Some(binding) => Resolution::Bound(binding),
            None => Resolution::Undeclared,
        };
        self.scopes.record_reference(node, resolution);
    }

    fn visit_function(&mut self, node: NodeId, depth: usize) -> Result<(), AnalysisError> {
        let name = self
            .tree
            .child_by_field(node, Field::Name)
            .filter(|_| !self.is_member_function(node));
        if let Some(name) = name {
            if let Some(text) = self.tree.text(name) {
                self.mark(name);
                let shape = self.shapes.opaque(OpaqueOrigin::Function);
                let binding =
                    self.scopes
                        .declare(self.current, text, BindingKind::Function, node, Some(shape));
                self.scopes.record_reference(name, Resolution::Bound(binding));
            }
        }

        let outer = self.current;
        self.current = self.scopes.open(outer, ScopeKind::Function, node);
        let result = self.visit_function_parts(node, depth);
        self.current = outer;
        result
    }

    /// Methods of object literals and classes do not bind their name.
    fn is_member_function(&self, node: NodeId) -> bool {
        match self.tree.parent(node) {
            Some(parent) if self.tree.kind(parent) == NodeKind::Object => true,
            Some(parent) if self.tree.kind(parent) == NodeKind::Block => self
                .tree
                .parent(parent)
                .is_some_and(|p| self.tree.kind(p) == NodeKind::Class),
            _ => false,
        }
    }

    fn visit_function_parts(&mut self, node: NodeId, depth: usize) -> Result<(), AnalysisError> {
        for child in self.tree.children(node).to_vec() {
            if self.tree.node(child).field == Some(Field::Name) {
                continue;
            }
            self.visit(child, depth + 1)?;
        }
        Ok(())
    }

    fn visit_class(&mut self, node: NodeId, depth: usize) -> Result<(), AnalysisError> {
        if let Some(name) = self.tree.child_by_field(node, Field::Name) {
            if let Some(text) = self.tree.text(name) {
                self.mark(name);
                let shape = self.shapes.object(Some(text.to_string()));
                let binding =
                    self.scopes
                        .declare(self.current, text, BindingKind::Class, node, Some(shape));
                self.scopes.record_reference(name, Resolution::Bound(binding));
            }
        }
        for child in self.tree.children(node).to_vec() {
            if self.tree.node(child).field != Some(Field::Name) {
                self.visit(child, depth + 1)?;
            }
        }
        Ok(())
    }

    fn visit_block(&mut self, node: NodeId, depth: usize) -> Result<(), AnalysisError> {
        let function_body = self
            .tree
            .parent(node)
            .is_some_and(|p| self.tree.kind(p) == NodeKind::Function);
        if !self.capabilities.block_scoped || function_body {
            return self.visit_children(node, depth);
        }
        let outer = self.current;
        self.current = self.scopes.open(outer, ScopeKind::Block, node);
        let result = self.visit_children(node, depth);
        self.current = outer;
        result
    }

    fn visit_parameter(&mut self, node: NodeId, depth: usize) -> Result<(), AnalysisError> {
        let value = self.tree.child_by_field(node, Field::Value);
        if let Some(value) = value {
            self.visit(value, depth + 1)?;
        }
        let shape = match value {
            Some(value) => self.shape_of(value),
            None => self.shapes.opaque(OpaqueOrigin::Parameter),
        };
        let chain = value.and_then(|v| self.pattern_chain(v));
        if let Some(pattern) = self.tree.child_by_field(node, Field::Name) {
            self.bind_pattern(pattern, Some(shape), chain, BindingKind::Parameter, node, depth)?;
        }
        Ok(())
    }

    fn visit_declaration(&mut self, node: NodeId, depth: usize) -> Result<(), AnalysisError> {
        let value = self.tree.child_by_field(node, Field::Value);
        if let Some(value) = value {
            self.visit(value, depth + 1)?;
        }
        let Some(pattern) = self.tree.child_by_field(node, Field::Name) else {
            return Ok(());
        };

        match self.tree.kind(pattern) {
            NodeKind::Identifier => {
                let (shape, alias) = match value {
                    Some(value) => self.value_binding(value),
                    None => (Some(self.shapes.opaque(OpaqueOrigin::Expression)), None),
                };
                self.bind_identifier(pattern, shape, alias, BindingKind::Declaration, node);
            }
            _ => {
                let shape = value.map(|v| self.shape_of(v));
                let chain = value.and_then(|v| self.pattern_chain(v));
                self.bind_pattern(pattern, shape, chain, BindingKind::Destructured, node, depth)?;
            }
        }
        Ok(())
    }

    fn visit_assignment(&mut self, node: NodeId, depth: usize) -> Result<(), AnalysisError> {
        let left = self.tree.child_by_field(node, Field::Left);
        let right = self.tree.child_by_field(node, Field::Right);
        if let Some(right) = right {
            self.visit(right, depth + 1)?;
        }
        let Some(left) = left else {
            return Ok(());
        };
        let compound = self.tree.text(node).is_some_and(|op| op != "=");

        match self.tree.kind(left) {
            NodeKind::Identifier => {
                self.mark(left);
                let (shape, alias) = match right {
                    Some(right) if !compound => self.value_binding(right),
                    _ => (Some(self.shapes.opaque(OpaqueOrigin::Expression)), None),
                };
                self.bind_identifier(left, shape, alias, BindingKind::Assignment, node);
            }
            NodeKind::Member | NodeKind::Index => {
                self.visit(left, depth + 1)?;
                let value = match right {
                    Some(right) if !compound => self.shape_of(right),
                    _ => self.shapes.opaque(OpaqueOrigin::Expression),
                };
                self.write_through(left, value, node);
            }
            NodeKind::ObjectPattern | NodeKind::Array => {
                let shape = right.map(|r| self.shape_of(r));
                let chain = right.and_then(|r| self.pattern_chain(r));
                self.bind_pattern(left, shape, chain, BindingKind::Assignment, node, depth)?;
            }
            _ => self.visit(left, depth + 1)?,
        }
        Ok(())
    }

    /// Shape or alias a simple `name = value` binding should carry.
    fn value_binding(&mut self, value: NodeId) -> (Option<ShapeId>, Option<Chain>) {
        match self.tree.kind(value) {
            NodeKind::Identifier | NodeKind::Member | NodeKind::Index => {
                match chain::resolve(self.tree, &self.scopes, value) {
                    Some(chain) if chain.segments.is_empty() && !chain.unknown_tail => {
                        match &chain.root {
                            ChainRoot::Binding { id, .. } => {
                                let shape = self.scopes.binding(*id).shape;
                                (shape.or_else(|| Some(self.shape_of(value))), None)
                            }
                            _ => (Some(self.shape_of(value)), None),
                        }
                    }
                    Some(chain) if !chain.is_opaque() && !chain.unknown_tail => (None, Some(chain)),
                    _ => (Some(self.shape_of(value)), None),
                }
            }
            _ => (Some(self.shape_of(value)), None),
        }
    }

    /// Chain a destructuring pattern should extend, if the value has one.
    fn pattern_chain(&self, value: NodeId) -> Option<Chain> {
        chain::resolve(self.tree, &self.scopes, value).filter(|c| !c.unknown_tail)
    }

    fn bind_identifier(
        &mut self,
        pattern: NodeId,
        shape: Option<ShapeId>,
        alias: Option<Chain>,
        kind: BindingKind,
        site: NodeId,
    ) {
        let Some(name) = self.tree.text(pattern) else {
            return;
        };
        let shape = match (&alias, shape) {
            (Some(_), shape) => shape,
            (None, Some(shape)) => Some(shape),
            (None, None) => Some(self.shapes.opaque(OpaqueOrigin::Expression)),
        };
        let binding = self.scopes.declare(self.current, name, kind, site, shape);
        self.scopes.binding_mut(binding).alias = alias;
        self.scopes.record_reference(pattern, Resolution::Bound(binding));
    }

    fn bind_pattern(
        &mut self,
        pattern: NodeId,
        shape: Option<ShapeId>,
        chain: Option<Chain>,
        kind: BindingKind,
        site: NodeId,
        depth: usize,
    ) -> Result<(), AnalysisError> {
        if depth > self.limits.max_depth {
            return Err(AnalysisError::DepthExceeded {
                limit: self.limits.max_depth,
            });
        }
        self.mark(pattern);

        match self.tree.kind(pattern) {
            NodeKind::Identifier => {
                let alias = chain.filter(|c| !c.segments.is_empty() && !c.is_opaque());
                self.bind_identifier(pattern, shape, alias, kind, site);
            }
            NodeKind::ObjectPattern => {
                for child in self.tree.code_children(pattern) {
                    match self.tree.kind(child) {
                        NodeKind::Pair => {
                            self.mark(child);
                            let key = self
                                .tree
                                .child_by_field(child, Field::Key)
                                .and_then(|k| self.static_key(k));
                            let Some(value) = self.tree.child_by_field(child, Field::Value) else {
                                continue;
                            };
                            let (sub_shape, sub_chain) = match key {
                                Some(key) => (
                                    shape.and_then(|s| self.shapes.field_at(s, &key, self.epoch)),
                                    chain.as_ref().map(|c| c.with_segment(segment_for(&key))),
                                ),
                                None => (None, None),
                            };
                            self.bind_pattern(value, sub_shape, sub_chain, kind, site, depth + 1)?;
                        }
                        NodeKind::Identifier => {
                            let key = self.tree.text(child).map(|t| FieldKey::Name(t.to_string()));
                            let sub_chain = match (&chain, &key) {
                                (Some(c), Some(k)) => Some(c.with_segment(segment_for(k))),
                                _ => None,
                            };
                            let sub_shape = match key {
                                Some(k) => shape.and_then(|s| self.shapes.field_at(s, &k, self.epoch)),
                                None => None,
                            };
                            self.bind_pattern(child, sub_shape, sub_chain, kind, site, depth + 1)?;
                        }
                        _ => {
                            for inner in self.tree.code_children(child) {
                                self.bind_pattern(inner, None, None, kind, site, depth + 1)?;
                            }
                        }
                    }
                }
            }
            NodeKind::Array => {
                for (i, child) in self.tree.code_children(pattern).into_iter().enumerate() {
                    let key = FieldKey::Element(i as u64);
                    let sub_shape = shape.and_then(|s| self.shapes.field_at(s, &key, self.epoch));
                    self.bind_pattern(child, sub_shape, None, kind, site, depth + 1)?;
                }
            }
            NodeKind::Assignment => {
                if let Some(right) = self.tree.child_by_field(pattern, Field::Right) {
                    self.visit(right, depth + 1)?;
                }
                if let Some(left) = self.tree.child_by_field(pattern, Field::Left) {
                    self.bind_pattern(left, shape, chain, kind, site, depth + 1)?;
                }
            }
            NodeKind::Spread | NodeKind::Parameter => {
                for inner in self.tree.code_children(pattern) {
                    self.bind_pattern(inner, None, None, kind, site, depth + 1)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Records a write of `value` through the access path `target`.
    fn write_through(&mut self, target: NodeId, value: ShapeId, site: NodeId) {
        let Some(mut chain) = chain::resolve(self.tree, &self.scopes, target) else {
            return;
        };
        if chain.unknown_tail || chain.is_opaque() || chain.segments.is_empty() {
            return;
        }

        if let ChainRoot::Undeclared(name) = &chain.root {
            let name = name.clone();
            let shape = self.shapes.object(None);
            let root_scope = self.scopes.root();
            let binding =
                self.scopes
                    .declare(root_scope, &name, BindingKind::Implicit, site, Some(shape));
            if let Some(identifier) = root_identifier(self.tree, target) {
                self.scopes
                    .record_reference(identifier, Resolution::Bound(binding));
            }
            log::trace!("implicit binding for '{}' in {}", name, self.tree.file());
            chain.root = ChainRoot::Binding { id: binding, name };
        }

        let ChainRoot::Binding { id, .. } = chain.root else {
            return;
        };
        let mut current = match self.scopes.binding(id).shape {
            Some(shape) => shape,
            None => {
                let shape = self.shapes.object(None);
                self.scopes.binding_mut(id).shape = Some(shape);
                shape
            }
        };
        self.shapes.ensure_object(current);

        let Some((last, prefix)) = chain.segments.split_last() else {
            return;
        };
        for segment in prefix {
            let key = key_for(segment);
            current = match self.shapes.field_at(current, &key, self.epoch) {
                Some(inner) => {
                    self.shapes.ensure_object(inner);
                    inner
                }
                None => {
                    let inner = self.shapes.object(None);
                    self.shapes.set_field(current, key, inner, self.epoch, site);
                    inner
                }
            };
        }
        self.shapes
            .set_field(current, key_for(last), value, self.epoch, site);
    }

    fn static_key(&self, key: NodeId) -> Option<FieldKey> {
        let text = self.tree.text(key)?;
        match self.tree.kind(key) {
            NodeKind::Identifier | NodeKind::String => Some(FieldKey::Name(text.to_string())),
            NodeKind::Number => Some(match text.parse::<u64>() {
                Ok(i) => FieldKey::Element(i),
                Err(_) => FieldKey::Name(text.to_string()),
            }),
            _ => None,
        }
    }

    /// Stores shapes of nodes whose value is fixed at construction.
    fn memoize(&mut self, node: NodeId) {
        let shape = match self.tree.kind(node) {
            NodeKind::Object => self.build_object(node),
            NodeKind::Array => self.build_array(node),
            NodeKind::String => {
                let text = self.tree.text(node).unwrap_or_default().to_string();
                self.shapes.leaf(Literal::String(text))
            }
            NodeKind::Number => {
                let text = self.tree.text(node).unwrap_or_default().to_string();
                self.shapes.leaf(Literal::Number(text))
            }
            NodeKind::Boolean => {
                let value = self.tree.text(node) == Some("true");
                self.shapes.leaf(Literal::Boolean(value))
            }
            NodeKind::Null => self.shapes.leaf(Literal::Null),
            NodeKind::TemplateString | NodeKind::Binary => {
                let (shapes, memo) = (&self.shapes, &self.node_shapes);
                let text = strings::concatenation(self.tree, node, &mut |child| {
                    match memo.get(&child).map(|s| shapes.get(*s)) {
                        Some(Shape::Leaf(Literal::String(text))) => Some(text.clone()),
                        _ => None,
                    }
                });
                match text {
                    Some(text) => self.shapes.leaf(Literal::String(text)),
                    None => return,
                }
            }
            NodeKind::Call => self.shapes.opaque(OpaqueOrigin::CallResult),
            NodeKind::Function => self.shapes.opaque(OpaqueOrigin::Function),
            NodeKind::Error => self.shapes.opaque(OpaqueOrigin::Malformed),
            _ => return,
        };
        self.node_shapes.insert(node, shape);
    }

    fn build_object(&mut self, node: NodeId) -> ShapeId {
        let name = self.tree.text(node).map(str::to_string);
        let object = self.shapes.object(name);
        for child in self.tree.code_children(node) {
            match self.tree.kind(child) {
                NodeKind::Pair => {
                    let key = self
                        .tree
                        .child_by_field(child, Field::Key)
                        .and_then(|k| self.static_key(k));
                    let value = self.tree.child_by_field(child, Field::Value);
                    if let (Some(key), Some(value)) = (key, value) {
                        let shape = self.shape_of(value);
                        self.shapes.set_field(object, key, shape, self.epoch, child);
                    }
                }
                NodeKind::Spread => {
                    if let Some(inner) = self.tree.code_children(child).first().copied() {
                        let shape = self.shape_of(inner);
                        if self.shapes.is_object(shape) {
                            self.shapes
                                .spread_into(shape, object, self.epoch, self.epoch);
                        }
                    }
                }
                NodeKind::Function => {
                    let key = self
                        .tree
                        .child_by_field(child, Field::Name)
                        .and_then(|k| self.static_key(k));
                    if let Some(key) = key {
                        let shape = self.shape_of(child);
                        self.shapes.set_field(object, key, shape, self.epoch, child);
                    }
                }
                _ => {}
            }
        }
        object
    }

    fn build_array(&mut self, node: NodeId) -> ShapeId {
        let object = self.shapes.object(None);
        for (i, child) in self.tree.code_children(node).into_iter().enumerate() {
            let shape = self.shape_of(child);
            self.shapes
                .set_field(object, FieldKey::Element(i as u64), shape, self.epoch, child);
        }
        object
    }

    /// Shape of an expression at the current epoch.
    fn shape_of(&mut self, node: NodeId) -> ShapeId {
        if let Some(shape) = self.node_shapes.get(&node) {
            return *shape;
        }
        match self.tree.kind(node) {
            NodeKind::Identifier | NodeKind::Member | NodeKind::Index => {
                let chain = chain::resolve(self.tree, &self.scopes, node);
                if let Some(chain) = &chain {
                    if let Some(shape) =
                        chain::terminus_shape(&self.scopes, &self.shapes, chain, self.epoch)
                    {
                        return shape;
                    }
                }
                let origin = match chain.as_ref().map(|c| &c.root) {
                    Some(ChainRoot::Undeclared(_)) => OpaqueOrigin::Undeclared,
                    Some(ChainRoot::CallResult(_)) => OpaqueOrigin::CallResult,
                    _ => OpaqueOrigin::Expression,
                };
                self.shapes.opaque(origin)
            }
            NodeKind::Assignment => match self.tree.child_by_field(node, Field::Right) {
                Some(right) => self.shape_of(right),
                None => self.shapes.opaque(OpaqueOrigin::Expression),
            },
            _ => self.shapes.opaque(OpaqueOrigin::Expression),
        }
    }
}

fn segment_for(key: &FieldKey) -> Segment {
    match key {
        FieldKey::Name(name) => Segment::Field(name.clone()),
        FieldKey::Element(i) => Segment::Element(*i),
    }
}

fn key_for(segment: &Segment) -> FieldKey {
    match segment {
        Segment::Field(name) => FieldKey::Name(name.clone()),
        Segment::Element(i) => FieldKey::Element(*i),
    }
}

/// Innermost identifier an access path hangs off.
fn root_identifier(tree: &Tree, mut node: NodeId) -> Option<NodeId> {
    loop {
        match tree.kind(node) {
            NodeKind::Identifier => return Some(node),
            NodeKind::Member | NodeKind::Index => {
                node = tree.child_by_field(node, Field::Object)?;
            }
            _ => return None,
        }
    }
}
