//! # Lexical Scopes
//!
//! @title Scope Tree and Bindings
//! @author Ramprasad
//!
//! Scopes form a tree stored in an arena. Each scope maps a name to the
//! binding currently visible under it. Re-declaring or re-assigning a name
//! pushes a new binding version; earlier references keep pointing at the
//! version that was current when they were visited.

use std::collections::HashMap;

use super::chain::Chain;
use super::shape::ShapeId;
use super::tree::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Program,
    Function,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Declaration,
    Assignment,
    Parameter,
    Function,
    Class,
    /// Introduced by an object destructuring pattern.
    Destructured,
    /// Created when a property is written on a name nothing declared.
    Implicit,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub node: NodeId,
    pub children: Vec<ScopeId>,
    current: HashMap<String, BindingId>,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub id: BindingId,
    pub name: String,
    pub kind: BindingKind,
    pub scope: ScopeId,
    /// Node that introduced the binding.
    pub node: NodeId,
    pub shape: Option<ShapeId>,
    /// Canonical access path this binding stands for, if it is an alias.
    pub alias: Option<Chain>,
}

/// Outcome of resolving one identifier reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Bound(BindingId),
    Undeclared,
}

#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    bindings: Vec<Binding>,
    references: HashMap<NodeId, Resolution>,
}

impl ScopeTree {
    /// Creates a tree holding only the program scope rooted at `node`.
    pub fn new(node: NodeId) -> Self {
        Self {
            scopes: vec![Scope {
                id: ScopeId(0),
                kind: ScopeKind::Program,
                parent: None,
                node,
                children: Vec::new(),
                current: HashMap::new(),
            }],
            bindings: Vec::new(),
            references: HashMap::new(),
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn open(&mut self, parent: ScopeId, kind: ScopeKind, node: NodeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            id,
            kind,
            parent: Some(parent),
            node,
            children: Vec::new(),
            current: HashMap::new(),
        });
        self.scopes[parent.0 as usize].children.push(id);
        id
    }

    /// Binds `name` in `scope`, shadowing any earlier version there.
    pub fn declare(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: BindingKind,
        node: NodeId,
        shape: Option<ShapeId>,
    ) -> BindingId {
        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(Binding {
            id,
            name: name.to_string(),
            kind,
            scope,
            node,
            shape,
            alias: None,
        });
        self.scopes[scope.0 as usize]
            .current
            .insert(name.to_string(), id);
        id
    }

    /// Walks outward from `scope` and returns the first visible binding.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<BindingId> {
        let mut next = Some(scope);
        while let Some(id) = next {
            let scope = self.scope(id);
            if let Some(binding) = scope.current.get(name) {
                return Some(*binding);
            }
            next = scope.parent;
        }
        None
    }

    pub fn record_reference(&mut self, node: NodeId, resolution: Resolution) {
        self.references.insert(node, resolution);
    }

    pub fn resolution(&self, node: NodeId) -> Option<Resolution> {
        self.references.get(&node).copied()
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.0 as usize]
    }

    pub fn binding_mut(&mut self, id: BindingId) -> &mut Binding {
        &mut self.bindings[id.0 as usize]
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// True when `inner` is `outer` or nested somewhere below it.
    pub fn is_within(&self, inner: ScopeId, outer: ScopeId) -> bool {
        let mut next = Some(inner);
        while let Some(id) = next {
            if id == outer {
                return true;
            }
            next = self.scope(id).parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_outward() {
        let mut tree = ScopeTree::new(NodeId(0));
        let root = tree.root();
        let outer = tree.declare(root, "user", BindingKind::Declaration, NodeId(1), None);
        let inner = tree.open(root, ScopeKind::Function, NodeId(2));
        assert_eq!(tree.lookup(inner, "user"), Some(outer));
        assert_eq!(tree.lookup(inner, "missing"), None);
    }

    #[test]
    fn test_shadowing_is_local_to_scope() {
        let mut tree = ScopeTree::new(NodeId(0));
        let root = tree.root();
        let outer = tree.declare(root, "x", BindingKind::Declaration, NodeId(1), None);
        let inner = tree.open(root, ScopeKind::Function, NodeId(2));
        let shadow = tree.declare(inner, "x", BindingKind::Parameter, NodeId(3), None);
        assert_eq!(tree.lookup(inner, "x"), Some(shadow));
        assert_eq!(tree.lookup(root, "x"), Some(outer));
        assert!(tree.is_within(inner, root));
        assert!(!tree.is_within(root, inner));
    }

    #[test]
    fn test_redeclaration_creates_new_version() {
        let mut tree = ScopeTree::new(NodeId(0));
        let root = tree.root();
        let first = tree.declare(root, "x", BindingKind::Declaration, NodeId(1), None);
        let second = tree.declare(root, "x", BindingKind::Assignment, NodeId(2), None);
        assert_ne!(first, second);
        assert_eq!(tree.lookup(root, "x"), Some(second));
        assert_eq!(tree.binding(first).name, "x");
    }
}
