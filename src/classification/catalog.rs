//! # Data Type Catalog
//!
//! @title Sensitive Data Type Definitions
//! @author Ramprasad
//!
//! The catalog lists the sensitive data types the classifier knows about,
//! each with include and exclude regular expressions matched against
//! normalized names. It also carries the object-level word lists: known
//! objects (things like `user` or `customer`), stop words whose properties
//! are never classified, and vendor directory names.
//!
//! ## File Format
//!
//! ```yaml
//! data_types:
//!   - name: Email Address
//!     id: email_address
//!     category_id: contact
//!     patterns: ['\bemail\b']
//!     exclude_patterns: ['\bemail (template|subject)\b']
//! known_objects: ['\buser\b']
//! stop_words: [this, props]
//! fallback_on_unresolved: true
//! vendor_directories: [vendor, node_modules]
//! ```

use std::collections::HashSet;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::normalize::normalize_key;
use crate::error::ConfigError;

const BUILTIN_CATALOG: &str = include_str!("../../data/default_catalog.yaml");

/// Names ending in `id` or `uuid` only match entries that allow identifiers.
const IDENTIFIER_SUFFIX: &str = r"\b(uu)?id\z";

/// A sensitive data type as reported in detections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub name: String,
    pub id: String,
    pub category_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataTypeDefinition {
    pub name: String,
    pub id: String,
    pub category_id: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Match the raw name instead of the normalized one.
    #[serde(default)]
    pub case_sensitive: bool,
    /// May match names that look like database identifiers (`user_id`).
    #[serde(default)]
    pub allow_identifier: bool,
}

fn default_true() -> bool {
    true
}

fn default_vendor_directories() -> Vec<String> {
    vec![
        "vendor".to_string(),
        "node_modules".to_string(),
        "third_party".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogDefinition {
    pub data_types: Vec<DataTypeDefinition>,
    #[serde(default)]
    pub known_objects: Vec<String>,
    #[serde(default)]
    pub stop_words: Vec<String>,
    /// Classify unresolved values by their field name.
    #[serde(default = "default_true")]
    pub fallback_on_unresolved: bool,
    #[serde(default = "default_vendor_directories")]
    pub vendor_directories: Vec<String>,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    data_type: DataType,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    case_sensitive: bool,
    allow_identifier: bool,
}

/// Result of matching one name against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameMatch<'c> {
    pub data_type: &'c DataType,
    /// The name looks like a database identifier.
    pub identifier: bool,
}

/// Compiled, immutable catalog shared by every worker.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    known_objects: Vec<Regex>,
    stop_words: HashSet<String>,
    vendor_directories: Vec<String>,
    fallback_on_unresolved: bool,
    identifier_suffix: Regex,
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| ConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

impl Catalog {
    /// Compiles a parsed catalog definition.
    ///
    /// # Errors
    ///
    /// Fails on duplicate data type ids and on patterns that do not compile.
    pub fn from_definition(definition: CatalogDefinition) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(definition.data_types.len());

        for def in definition.data_types {
            if !seen.insert(def.id.clone()) {
                return Err(ConfigError::DuplicateDataType(def.id));
            }
            let insensitive = !def.case_sensitive;
            let include = def
                .patterns
                .iter()
                .map(|p| compile(p, insensitive))
                .collect::<Result<Vec<_>, _>>()?;
            let exclude = def
                .exclude_patterns
                .iter()
                .map(|p| compile(p, insensitive))
                .collect::<Result<Vec<_>, _>>()?;
            entries.push(CatalogEntry {
                data_type: DataType {
                    name: def.name,
                    id: def.id,
                    category_id: def.category_id,
                },
                include,
                exclude,
                case_sensitive: def.case_sensitive,
                allow_identifier: def.allow_identifier,
            });
        }

        let known_objects = definition
            .known_objects
            .iter()
            .map(|p| compile(p, true))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            entries,
            known_objects,
            stop_words: definition
                .stop_words
                .iter()
                .map(|w| normalize_key(w))
                .collect(),
            vendor_directories: definition.vendor_directories,
            fallback_on_unresolved: definition.fallback_on_unresolved,
            identifier_suffix: compile(IDENTIFIER_SUFFIX, true)?,
        })
    }

    /// Parses a YAML catalog.
    pub fn from_yaml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let definition: CatalogDefinition =
            serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
                origin: origin.to_string(),
                source,
            })?;
        Self::from_definition(definition)
    }

    /// Parses a JSON catalog.
    pub fn from_json_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let definition: CatalogDefinition =
            serde_json::from_str(text).map_err(|source| ConfigError::Json {
                origin: origin.to_string(),
                source,
            })?;
        Self::from_definition(definition)
    }

    /// Loads a catalog file; `.json` files are read as JSON, anything else as YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let origin = path.display().to_string();
        let catalog = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text, &origin)?,
            _ => Self::from_yaml_str(&text, &origin)?,
        };
        log::info!("Loaded {} data types from {}", catalog.len(), origin);
        Ok(catalog)
    }

    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml_str(BUILTIN_CATALOG, "<builtin catalog>")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn data_types(&self) -> impl Iterator<Item = &DataType> {
        self.entries.iter().map(|e| &e.data_type)
    }

    pub fn fallback_on_unresolved(&self) -> bool {
        self.fallback_on_unresolved
    }

    /// First data type whose patterns match `raw_name`.
    ///
    /// Names that look like identifiers (`user id`, `account uuid`) only
    /// match entries with `allow_identifier`.
    pub fn match_name(&self, raw_name: &str) -> Option<NameMatch<'_>> {
        let normalized = normalize_key(raw_name);
        if normalized.is_empty() {
            return None;
        }
        let identifier = self.identifier_suffix.is_match(&normalized);

        self.entries
            .iter()
            .filter(|entry| !identifier || entry.allow_identifier)
            .find(|entry| {
                let subject = if entry.case_sensitive {
                    raw_name
                } else {
                    normalized.as_str()
                };
                entry.include.iter().any(|r| r.is_match(subject))
                    && !entry.exclude.iter().any(|r| r.is_match(subject))
            })
            .map(|entry| NameMatch {
                data_type: &entry.data_type,
                identifier,
            })
    }

    pub fn is_known_object(&self, name: &str) -> bool {
        let normalized = normalize_key(name);
        !normalized.is_empty() && self.known_objects.iter().any(|r| r.is_match(&normalized))
    }

    pub fn is_stop_word(&self, name: &str) -> bool {
        self.stop_words.contains(&normalize_key(name))
    }

    /// True when any directory component of `path` is a vendor directory.
    pub fn is_vendored(&self, path: &str) -> bool {
        Path::new(path)
            .parent()
            .map(|dir| {
                dir.components().any(|c| {
                    let part = c.as_os_str().to_string_lossy();
                    self.vendor_directories.iter().any(|v| v == part.as_ref())
                })
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
data_types:
  - name: Email Address
    id: email_address
    category_id: contact
    patterns: ['\bemail\b']
    exclude_patterns: ['\bemail template\b']
  - name: Unique Identifier
    id: unique_identifier
    category_id: identification
    patterns: ['\b(uu)?id\z']
    allow_identifier: true
  - name: Passport Number
    id: passport_number
    category_id: government_id
    patterns: ['passport']
known_objects: ['\buser\b']
stop_words: [this, props]
"#;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        assert!(!catalog.is_empty());
        assert!(catalog.match_name("email").is_some());
    }

    #[test]
    fn test_match_uses_normalized_name() {
        let catalog = Catalog::from_yaml_str(SAMPLE, "sample").unwrap();
        let found = catalog.match_name("userEmail").unwrap();
        assert_eq!(found.data_type.id, "email_address");
        assert!(catalog.match_name("emailTemplate").is_none());
    }

    #[test]
    fn test_identifier_suffix_needs_permission() {
        let catalog = Catalog::from_yaml_str(SAMPLE, "sample").unwrap();
        let found = catalog.match_name("passport_id").unwrap();
        assert_eq!(found.data_type.id, "unique_identifier");
        assert!(found.identifier);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let text = r#"
data_types:
  - { name: A, id: dup, category_id: c, patterns: [a] }
  - { name: B, id: dup, category_id: c, patterns: [b] }
"#;
        let err = Catalog::from_yaml_str(text, "dup").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDataType(id) if id == "dup"));
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let text = "data_types:\n  - { name: A, id: a, category_id: c, patterns: ['(('] }\n";
        assert!(matches!(
            Catalog::from_yaml_str(text, "bad"),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_object_word_lists() {
        let catalog = Catalog::from_yaml_str(SAMPLE, "sample").unwrap();
        assert!(catalog.is_known_object("currentUser"));
        assert!(!catalog.is_known_object("request"));
        assert!(catalog.is_stop_word("this"));
        assert!(catalog.is_vendored("app/vendor/lib.js"));
        assert!(catalog.is_vendored("node_modules/pkg/index.js"));
        assert!(!catalog.is_vendored("src/vendors.js"));
    }
}
