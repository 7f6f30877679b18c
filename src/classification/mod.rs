//! # Classification Module
//!
//! @title Sensitive Data Classification
//! @author Ramprasad
//!
//! Decides whether names and value shapes carry sensitive data, by matching
//! normalized field names against the data type [`Catalog`].
//!
//! ## Decisions
//!
//! Every classified name gets a [`Decision`]: a valid/invalid state plus a
//! [`Reason`] code. Objects aggregate their properties: one valid property
//! is enough to make the object valid, and invalid properties are kept in
//! the tree with their own reason rather than dropped.

pub mod catalog;
pub mod classifier;
pub mod normalize;

pub use catalog::{Catalog, CatalogDefinition, DataType, DataTypeDefinition};
pub use classifier::Classifier;
pub use normalize::normalize_key;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    Valid,
    Invalid,
}

/// Why a name or object was classified the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// The name matched a catalog pattern.
    KnownPattern,
    /// An identifier-like property of a known object (`user.id`).
    KnownDatabaseIdentifier,
    ValidObjectWithValidProperties,
    /// A known object none of whose properties matched.
    ValidObjectWithInvalidProperties,
    NoDetectablePattern,
    /// A property that matched nothing.
    InvalidProperty,
    BelongsToInvalidObject,
    StopWord,
    IncludedInVendorFolder,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::KnownPattern => "known_pattern",
            Reason::KnownDatabaseIdentifier => "known_database_identifier",
            Reason::ValidObjectWithValidProperties => "valid_object_with_valid_properties",
            Reason::ValidObjectWithInvalidProperties => "valid_object_with_invalid_properties",
            Reason::NoDetectablePattern => "no_detectable_pattern",
            Reason::InvalidProperty => "invalid_property",
            Reason::BelongsToInvalidObject => "belongs_to_invalid_object",
            Reason::StopWord => "stop_word",
            Reason::IncludedInVendorFolder => "included_in_vendor_folder",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decision {
    pub state: DecisionState,
    pub reason: Reason,
}

impl Decision {
    pub fn valid(reason: Reason) -> Self {
        Self {
            state: DecisionState::Valid,
            reason,
        }
    }

    pub fn invalid(reason: Reason) -> Self {
        Self {
            state: DecisionState::Invalid,
            reason,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state == DecisionState::Valid
    }
}

/// Outcome of classifying one name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    pub decision: Decision,
}

/// A classified name together with its classified properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedNode {
    pub name: String,
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<ClassifiedNode>,
}

impl ClassifiedNode {
    pub fn leaf(classification: Classification) -> Self {
        Self {
            name: classification.name.clone(),
            classification,
            properties: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.classification.decision.is_valid()
    }

    /// Valid classifications carrying a data type, depth first, each paired
    /// with the name of the object that holds it.
    pub fn valid_data_types(&self) -> Vec<(Option<&str>, &Classification)> {
        let mut found = Vec::new();
        self.collect_valid(None, &mut found);
        found
    }

    fn collect_valid<'a>(
        &'a self,
        parent: Option<&'a str>,
        found: &mut Vec<(Option<&'a str>, &'a Classification)>,
    ) {
        if self.classification.decision.is_valid() && self.classification.data_type.is_some() {
            found.push((parent, &self.classification));
        }
        for property in &self.properties {
            property.collect_valid(Some(self.name.as_str()), found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_serializes_as_code() {
        let json = serde_json::to_string(&Reason::ValidObjectWithValidProperties).unwrap();
        assert_eq!(json, "\"valid_object_with_valid_properties\"");
        assert_eq!(Reason::KnownPattern.to_string(), "known_pattern");
    }

    #[test]
    fn test_valid_data_types_keep_parent_name() {
        let email = DataType {
            name: "Email Address".into(),
            id: "email_address".into(),
            category_id: "contact".into(),
        };
        let node = ClassifiedNode {
            name: "user".into(),
            classification: Classification {
                name: "user".into(),
                data_type: None,
                decision: Decision::valid(Reason::ValidObjectWithValidProperties),
            },
            properties: vec![
                ClassifiedNode::leaf(Classification {
                    name: "email".into(),
                    data_type: Some(email.clone()),
                    decision: Decision::valid(Reason::KnownPattern),
                }),
                ClassifiedNode::leaf(Classification {
                    name: "other".into(),
                    data_type: None,
                    decision: Decision::invalid(Reason::InvalidProperty),
                }),
            ],
        };
        let found = node.valid_data_types();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, Some("user"));
        assert_eq!(found[0].1.data_type.as_ref(), Some(&email));
    }
}
