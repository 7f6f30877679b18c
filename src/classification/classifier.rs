//! # Data Type Classifier
//!
//! @title Name and Shape Classification
//! @author Ramprasad
//!
//! Classifies names and value shapes against the catalog.
//!
//! The classifier is shared read-only by every worker. It never walks the
//! syntax tree itself: callers hand it a name, or a shape from the file's
//! [`ShapeStore`] together with the epoch the shape is read at.

use std::sync::Arc;

use super::catalog::Catalog;
use super::{Classification, ClassifiedNode, Decision, Reason};
use crate::analysis::{Shape, ShapeId, ShapeStore};

/// Where the subject of a classification lives.
#[derive(Debug, Clone, Copy, Default)]
pub struct Subject<'a> {
    /// Name of the object that holds the subject, if any.
    pub object_name: Option<&'a str>,
    /// The file sits under a vendor directory.
    pub vendored: bool,
}

pub struct Classifier {
    catalog: Arc<Catalog>,
    depth: usize,
}

impl Classifier {
    /// Creates a classifier that inspects `depth` levels of object properties.
    /// A depth of 1 classifies first-level properties only.
    pub fn new(catalog: Arc<Catalog>, depth: usize) -> Self {
        Self {
            catalog,
            depth: depth.max(1),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Classifies a name whose value is known to be a plain value.
    pub fn classify_name(&self, name: &str, subject: Subject<'_>) -> Classification {
        if let Some(decision) = self.container_gate(subject) {
            return unclassified(name, decision);
        }
        match self.catalog.match_name(name) {
            Some(found) if !found.identifier => Classification {
                name: name.to_string(),
                data_type: Some(found.data_type.clone()),
                decision: Decision::valid(Reason::KnownPattern),
            },
            Some(found)
                if subject
                    .object_name
                    .is_some_and(|o| self.catalog.is_known_object(o)) =>
            {
                Classification {
                    name: name.to_string(),
                    data_type: Some(found.data_type.clone()),
                    decision: Decision::valid(Reason::KnownDatabaseIdentifier),
                }
            }
            _ => unclassified(name, Decision::invalid(Reason::NoDetectablePattern)),
        }
    }

    /// Classifies a name whose value could not be resolved.
    ///
    /// Falls back to the name alone when the catalog allows it.
    pub fn classify_unresolved(&self, name: &str, subject: Subject<'_>) -> Classification {
        if self.catalog.fallback_on_unresolved() {
            self.classify_name(name, subject)
        } else {
            unclassified(name, Decision::invalid(Reason::NoDetectablePattern))
        }
    }

    /// Classifies a value shape reached under `name`.
    ///
    /// # Arguments
    ///
    /// * `name` - Binding or field name the shape was reached through
    /// * `shape` - The shape to classify
    /// * `shapes` - The file's shape store
    /// * `epoch` - Read point; later field writes are ignored
    /// * `subject` - Holder name and vendor flag
    ///
    /// # Returns
    ///
    /// A classification tree. Objects carry one node per visible named field.
    pub fn classify_shape(
        &self,
        name: &str,
        shape: ShapeId,
        shapes: &ShapeStore,
        epoch: u32,
        subject: Subject<'_>,
    ) -> ClassifiedNode {
        match shapes.get(shape) {
            Shape::Object(_) => self.classify_object(name, shape, shapes, epoch, subject, self.depth),
            Shape::Leaf(_) => ClassifiedNode::leaf(self.classify_name(name, subject)),
            Shape::Opaque(_) => ClassifiedNode::leaf(self.classify_unresolved(name, subject)),
        }
    }

    fn classify_object(
        &self,
        name: &str,
        shape: ShapeId,
        shapes: &ShapeStore,
        epoch: u32,
        subject: Subject<'_>,
        depth: usize,
    ) -> ClassifiedNode {
        let fields = shapes.visible_fields(shape, epoch);
        let named = fields
            .iter()
            .filter_map(|f| f.key.name().map(|n| (n, f.shape)));

        let gate = if subject.vendored {
            Some(Reason::IncludedInVendorFolder)
        } else if self.catalog.is_stop_word(name) {
            Some(Reason::StopWord)
        } else {
            None
        };
        if let Some(reason) = gate {
            let properties = named
                .map(|(field, _)| {
                    ClassifiedNode::leaf(unclassified(
                        field,
                        Decision::invalid(Reason::BelongsToInvalidObject),
                    ))
                })
                .collect();
            return ClassifiedNode {
                name: name.to_string(),
                classification: unclassified(name, Decision::invalid(reason)),
                properties,
            };
        }

        let known = self.catalog.is_known_object(name);
        let property_subject = Subject {
            object_name: Some(name),
            vendored: false,
        };
        let properties: Vec<ClassifiedNode> = named
            .map(|(field, field_shape)| {
                self.classify_property(field, field_shape, shapes, epoch, property_subject, depth)
            })
            .collect();

        let decision = if properties.iter().any(ClassifiedNode::is_valid) {
            Decision::valid(Reason::ValidObjectWithValidProperties)
        } else if known {
            Decision::invalid(Reason::ValidObjectWithInvalidProperties)
        } else {
            Decision::invalid(Reason::NoDetectablePattern)
        };

        ClassifiedNode {
            name: name.to_string(),
            classification: unclassified(name, decision),
            properties,
        }
    }

    fn classify_property(
        &self,
        field: &str,
        shape: ShapeId,
        shapes: &ShapeStore,
        epoch: u32,
        subject: Subject<'_>,
        depth: usize,
    ) -> ClassifiedNode {
        let mut classification = self.classify_name(field, subject);
        if !classification.decision.is_valid() {
            classification.decision = Decision::invalid(Reason::InvalidProperty);
        }

        if depth <= 1 || !shapes.is_object(shape) {
            return ClassifiedNode::leaf(classification);
        }

        let nested = self.classify_object(field, shape, shapes, epoch, Subject::default(), depth - 1);
        if nested.is_valid() && !classification.decision.is_valid() {
            classification.decision = Decision::valid(Reason::ValidObjectWithValidProperties);
        }
        ClassifiedNode {
            name: field.to_string(),
            classification,
            properties: nested.properties,
        }
    }

    /// Object-level gates that invalidate everything held by the subject.
    fn container_gate(&self, subject: Subject<'_>) -> Option<Decision> {
        if subject.vendored {
            return Some(Decision::invalid(Reason::IncludedInVendorFolder));
        }
        subject
            .object_name
            .filter(|o| self.catalog.is_stop_word(o))
            .map(|_| Decision::invalid(Reason::BelongsToInvalidObject))
    }
}

fn unclassified(name: &str, decision: Decision) -> Classification {
    Classification {
        name: name.to_string(),
        data_type: None,
        decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{FieldKey, Literal, NodeId};
    use crate::classification::DecisionState;

    const CATALOG: &str = r#"
data_types:
  - { name: First Name, id: first_name, category_id: personal, patterns: ['\bfirst name\b'] }
  - { name: Last Name, id: last_name, category_id: personal, patterns: ['\blast name\b'] }
  - { name: Email Address, id: email_address, category_id: contact, patterns: ['\bemail\b'] }
  - { name: Postal Code, id: postal_code, category_id: location, patterns: ['\bzip\b'] }
  - name: Unique Identifier
    id: unique_identifier
    category_id: identification
    patterns: ['\b(uu)?id\z']
    allow_identifier: true
known_objects: ['\buser\b', '\bcustomer\b']
stop_words: [props, this]
fallback_on_unresolved: true
"#;

    fn classifier(depth: usize) -> Classifier {
        Classifier::new(Arc::new(Catalog::from_yaml_str(CATALOG, "test").unwrap()), depth)
    }

    fn object(store: &mut ShapeStore, fields: &[(&str, ShapeId)]) -> ShapeId {
        let id = store.object(None);
        for (i, (name, shape)) in fields.iter().enumerate() {
            store.set_field(id, FieldKey::Name(name.to_string()), *shape, 1, NodeId(i as u32));
        }
        id
    }

    fn string(store: &mut ShapeStore) -> ShapeId {
        store.leaf(Literal::String("x".into()))
    }

    #[test]
    fn test_object_with_one_sensitive_field_is_valid() {
        let mut store = ShapeStore::new();
        let george = string(&mut store);
        let one = store.leaf(Literal::Number("1".into()));
        let shape = object(&mut store, &[("first_name", george), ("other", one)]);

        let node = classifier(1).classify_shape("data", shape, &store, 5, Subject::default());
        assert_eq!(node.classification.decision.reason, Reason::ValidObjectWithValidProperties);
        assert_eq!(node.properties.len(), 2);
        assert_eq!(node.properties[1].classification.decision.reason, Reason::InvalidProperty);
    }

    #[test]
    fn test_object_without_matches_has_no_pattern() {
        let mut store = ShapeStore::new();
        let one = store.leaf(Literal::Number("1".into()));
        let shape = object(&mut store, &[("color", one)]);

        let node = classifier(1).classify_shape("settings", shape, &store, 5, Subject::default());
        assert_eq!(node.classification.decision, Decision::invalid(Reason::NoDetectablePattern));
    }

    #[test]
    fn test_known_object_without_matches_is_invalid() {
        let mut store = ShapeStore::new();
        let one = store.leaf(Literal::Number("1".into()));
        let shape = object(&mut store, &[("color", one)]);

        let node = classifier(1).classify_shape("user", shape, &store, 5, Subject::default());
        assert_eq!(
            node.classification.decision,
            Decision::invalid(Reason::ValidObjectWithInvalidProperties)
        );
    }

    #[test]
    fn test_nested_objects_follow_depth() {
        let mut store = ShapeStore::new();
        let zip = string(&mut store);
        let address = object(&mut store, &[("zip", zip)]);
        let first = string(&mut store);
        let shape = object(&mut store, &[("first_name", first), ("address", address)]);

        let shallow = classifier(1).classify_shape("user", shape, &store, 5, Subject::default());
        assert!(shallow.properties[1].properties.is_empty());
        assert!(!shallow.properties[1].is_valid());

        let deep = classifier(2).classify_shape("user", shape, &store, 5, Subject::default());
        assert!(deep.properties[1].is_valid());
        assert_eq!(deep.properties[1].properties[0].name, "zip");
        assert!(deep.properties[1].properties[0].is_valid());
    }

    #[test]
    fn test_stop_word_object_is_never_valid() {
        let mut store = ShapeStore::new();
        let email = string(&mut store);
        let shape = object(&mut store, &[("email", email)]);

        let node = classifier(1).classify_shape("props", shape, &store, 5, Subject::default());
        assert_eq!(node.classification.decision.reason, Reason::StopWord);
        assert_eq!(
            node.properties[0].classification.decision.reason,
            Reason::BelongsToInvalidObject
        );
        assert!(node.valid_data_types().is_empty());
    }

    #[test]
    fn test_vendored_file_invalidates_everything() {
        let classifier = classifier(1);
        let subject = Subject {
            object_name: Some("user"),
            vendored: true,
        };
        let result = classifier.classify_name("email", subject);
        assert_eq!(result.decision.state, DecisionState::Invalid);
        assert_eq!(result.decision.reason, Reason::IncludedInVendorFolder);
    }

    #[test]
    fn test_identifier_needs_known_object() {
        let classifier = classifier(1);
        let on_user = classifier.classify_name(
            "id",
            Subject {
                object_name: Some("user"),
                vendored: false,
            },
        );
        assert_eq!(on_user.decision, Decision::valid(Reason::KnownDatabaseIdentifier));

        let on_request = classifier.classify_name(
            "id",
            Subject {
                object_name: Some("request"),
                vendored: false,
            },
        );
        assert!(!on_request.decision.is_valid());
    }

    #[test]
    fn test_unresolved_respects_fallback_flag() {
        let text = CATALOG.replace("fallback_on_unresolved: true", "fallback_on_unresolved: false");
        let strict = Classifier::new(Arc::new(Catalog::from_yaml_str(&text, "t").unwrap()), 1);
        assert!(!strict.classify_unresolved("email", Subject::default()).decision.is_valid());
        assert!(classifier(1)
            .classify_unresolved("email", Subject::default())
            .decision
            .is_valid());
    }
}
