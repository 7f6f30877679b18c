//! # Value Shapes
//!
//! @title Structural Value Summaries
//! @author Ramprasad
//!
//! A shape records what is statically known about a value: a literal, an
//! object with named or positional fields, or an opaque value whose content
//! cannot be recovered. Shapes live in a [`ShapeStore`] arena so that two
//! bindings holding the same object share one handle, and a property write
//! through either one is visible through both.
//!
//! Field writes are versioned by the epoch of the pass at which they
//! happened. Reading at epoch `e` sees only writes made at or before `e`, so
//! a mutation is visible to textually later references and invisible to
//! earlier ones.

use super::tree::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Name(String),
    Element(u64),
}

impl FieldKey {
    pub fn name(&self) -> Option<&str> {
        match self {
            FieldKey::Name(name) => Some(name),
            FieldKey::Element(_) => None,
        }
    }
}

/// Why a value is opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpaqueOrigin {
    Undeclared,
    CallResult,
    Parameter,
    Function,
    Expression,
    Malformed,
}

#[derive(Debug, Clone)]
pub struct FieldEntry {
    pub key: FieldKey,
    pub shape: ShapeId,
    pub epoch: u32,
    pub node: NodeId,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectShape {
    /// Struct or class name when the literal carries one.
    pub name: Option<String>,
    /// Field writes in the order they happened.
    pub entries: Vec<FieldEntry>,
}

#[derive(Debug, Clone)]
pub enum Shape {
    Leaf(Literal),
    Object(ObjectShape),
    Opaque(OpaqueOrigin),
}

/// A field as seen at a given epoch.
#[derive(Debug, Clone)]
pub struct VisibleField<'s> {
    pub key: &'s FieldKey,
    pub shape: ShapeId,
    pub node: NodeId,
}

#[derive(Debug, Clone, Default)]
pub struct ShapeStore {
    shapes: Vec<Shape>,
}

impl ShapeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, shape: Shape) -> ShapeId {
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(shape);
        id
    }

    pub fn leaf(&mut self, literal: Literal) -> ShapeId {
        self.push(Shape::Leaf(literal))
    }

    pub fn object(&mut self, name: Option<String>) -> ShapeId {
        self.push(Shape::Object(ObjectShape {
            name,
            entries: Vec::new(),
        }))
    }

    pub fn opaque(&mut self, origin: OpaqueOrigin) -> ShapeId {
        self.push(Shape::Opaque(origin))
    }

    pub fn get(&self, id: ShapeId) -> &Shape {
        &self.shapes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn is_object(&self, id: ShapeId) -> bool {
        matches!(self.get(id), Shape::Object(_))
    }

    /// Turns a leaf or opaque shape into an empty object, in place, so every
    /// holder of the handle observes the upgrade.
    pub fn ensure_object(&mut self, id: ShapeId) {
        let slot = &mut self.shapes[id.0 as usize];
        if !matches!(slot, Shape::Object(_)) {
            *slot = Shape::Object(ObjectShape::default());
        }
    }

    /// Records a write of `value` into `key` of `object` at `epoch`.
    pub fn set_field(
        &mut self,
        object: ShapeId,
        key: FieldKey,
        value: ShapeId,
        epoch: u32,
        node: NodeId,
    ) {
        self.ensure_object(object);
        if let Shape::Object(obj) = &mut self.shapes[object.0 as usize] {
            obj.entries.push(FieldEntry {
                key,
                shape: value,
                epoch,
                node,
            });
        }
    }

    /// Latest value written to `key` at or before `epoch`.
    pub fn field_at(&self, object: ShapeId, key: &FieldKey, epoch: u32) -> Option<ShapeId> {
        match self.get(object) {
            Shape::Object(obj) => obj
                .entries
                .iter()
                .rev()
                .find(|e| e.epoch <= epoch && &e.key == key)
                .map(|e| e.shape),
            _ => None,
        }
    }

    /// Fields visible at `epoch`, ordered by first write, each with its latest value.
    pub fn visible_fields(&self, object: ShapeId, epoch: u32) -> Vec<VisibleField<'_>> {
        let Shape::Object(obj) = self.get(object) else {
            return Vec::new();
        };
        let mut fields: Vec<VisibleField<'_>> = Vec::new();
        for entry in obj.entries.iter().filter(|e| e.epoch <= epoch) {
            match fields.iter_mut().find(|f| f.key == &entry.key) {
                Some(field) => {
                    field.shape = entry.shape;
                    field.node = entry.node;
                }
                None => fields.push(VisibleField {
                    key: &entry.key,
                    shape: entry.shape,
                    node: entry.node,
                }),
            }
        }
        fields
    }

    /// Copies every field of `from` visible at `read_epoch` into `into`.
    pub fn spread_into(&mut self, from: ShapeId, into: ShapeId, read_epoch: u32, write_epoch: u32) {
        let copied: Vec<(FieldKey, ShapeId, NodeId)> = self
            .visible_fields(from, read_epoch)
            .into_iter()
            .map(|f| (f.key.clone(), f.shape, f.node))
            .collect();
        for (key, shape, node) in copied {
            self.set_field(into, key, shape, write_epoch, node);
        }
    }

    pub fn object_name(&self, id: ShapeId) -> Option<&str> {
        match self.get(id) {
            Shape::Object(obj) => obj.name.as_deref(),
            _ => None,
        }
    }
}
