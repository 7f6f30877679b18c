//! # Rule Loader
//!
//! @title Detection Rules
//! @author Ramprasad
//!
//! Loads rule files and compiles every pattern with the syntax adapter of
//! each language the rule targets. All validation happens here, so a rule
//! set that loads is guaranteed to run.
//!
//! ## File Format
//!
//! ```yaml
//! rules:
//!   - id: js_logger_leak
//!     title: Sensitive data sent to a logger
//!     description: ...
//!     remediation: ...
//!     severity: high
//!     cwe: CWE-532
//!     languages: [javascript]
//!     patterns:
//!       - pattern: logger.$<LEVEL>($<...>, $<DATA>)
//!         filters:
//!           - variable: LEVEL
//!             values: [info, warn, error, debug]
//!     data_types: [DATA]
//!     sanitizer: js_redacted_log
//!   - id: js_redacted_log
//!     title: Redacted log call
//!     description: ...
//!     severity: low
//!     languages: [javascript]
//!     auxiliary: true
//!     patterns:
//!       - pattern: logger.$<_>(redact($<_>))
//! ```
//!
//! ## Rule References
//!
//! A rule can run another rule in two places. A `detection` filter passes
//! when the referenced rule detects inside a captured node. A `sanitizer`
//! drops a match when the referenced rule matches at the same match node.
//! Auxiliary rules exist only to be referenced and never report on their
//! own. References must name a loaded rule and must not form a cycle.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::parser::AdapterRegistry;
use crate::patterns::{compile, CompiledPattern, Filter, FilterDefinition};
use crate::report::Severity;

const BUILTIN_RULES: &str = include_str!("../../data/default_rules.yaml");

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleFile {
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternDefinition {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub remediation: String,
    pub severity: Severity,
    #[serde(default)]
    pub cwe: Option<String>,
    pub languages: Vec<String>,
    pub patterns: Vec<PatternDefinition>,
    /// Captures whose values are classified for sensitive data.
    #[serde(default)]
    pub data_types: Vec<String>,
    /// Drop matches without a sensitive data type. Defaults to true when
    /// `data_types` is set.
    #[serde(default)]
    pub requires_data_types: Option<bool>,
    /// Rule whose match at the same node cancels this rule's match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitizer: Option<String>,
    /// Only referenced by other rules, never reported.
    #[serde(default)]
    pub auxiliary: bool,
}

/// A pattern compiled for one language.
#[derive(Debug, Clone)]
pub struct RulePattern {
    pub language: &'static str,
    pub compiled: CompiledPattern,
    pub filters: Vec<Filter>,
}

/// A validated, compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub title: String,
    pub description: String,
    pub remediation: String,
    pub severity: Severity,
    pub cwe: Option<String>,
    pub languages: Vec<&'static str>,
    pub patterns: Vec<RulePattern>,
    pub data_types: Vec<String>,
    pub requires_data_types: bool,
    pub sanitizer: Option<String>,
    pub auxiliary: bool,
}

impl Rule {
    /// Compiles one rule definition.
    ///
    /// # Errors
    ///
    /// Unsupported languages, invalid patterns or filters, and `data_types`
    /// entries that a pattern does not capture.
    pub fn compile(definition: RuleDefinition, adapters: &AdapterRegistry) -> Result<Self, ConfigError> {
        let id = definition.id;

        let mut languages = Vec::new();
        for language in &definition.languages {
            let adapter = adapters.for_language(language).ok_or_else(|| {
                ConfigError::UnsupportedLanguage {
                    rule: id.clone(),
                    language: language.clone(),
                }
            })?;
            if !languages.contains(&adapter.language()) {
                languages.push(adapter.language());
            }
        }
        if languages.is_empty() {
            return Err(ConfigError::UnsupportedLanguage {
                rule: id,
                language: String::new(),
            });
        }

        let mut patterns = Vec::new();
        for &language in &languages {
            let Some(adapter) = adapters.for_language(language) else {
                continue;
            };
            for definition_pattern in &definition.patterns {
                let compiled = compile(adapter, &id, &definition_pattern.pattern)?;
                for variable in &definition.data_types {
                    if !compiled.defines(variable) {
                        return Err(ConfigError::UnknownVariable {
                            rule: id.clone(),
                            variable: variable.clone(),
                        });
                    }
                }
                let filters = definition_pattern
                    .filters
                    .iter()
                    .map(|f| Filter::compile(&id, &compiled, f))
                    .collect::<Result<Vec<_>, _>>()?;
                patterns.push(RulePattern {
                    language,
                    compiled,
                    filters,
                });
            }
        }
        if patterns.is_empty() {
            return Err(ConfigError::InvalidPattern {
                rule: id,
                pattern: String::new(),
                message: "a rule needs at least one pattern".to_string(),
            });
        }

        let requires_data_types = match definition.requires_data_types {
            Some(true) if definition.data_types.is_empty() => {
                return Err(ConfigError::InvalidPattern {
                    rule: id,
                    pattern: String::new(),
                    message: "requires_data_types is set but data_types is empty".to_string(),
                });
            }
            Some(required) => required,
            None => !definition.data_types.is_empty(),
        };

        Ok(Self {
            id,
            title: definition.title,
            description: definition.description,
            remediation: definition.remediation,
            severity: definition.severity,
            cwe: definition.cwe,
            languages,
            patterns,
            data_types: definition.data_types,
            requires_data_types,
            sanitizer: definition.sanitizer,
            auxiliary: definition.auxiliary,
        })
    }

    /// Ids of the rules this rule runs through its sanitizer or filters.
    pub fn references(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.sanitizer.iter().map(String::as_str).collect();
        for pattern in &self.patterns {
            for filter in &pattern.filters {
                for id in filter.referenced_rules() {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }
        ids
    }

    pub fn applies_to(&self, language: &str) -> bool {
        self.languages.contains(&language)
    }

    pub fn patterns_for<'r>(&'r self, language: &'r str) -> impl Iterator<Item = &'r RulePattern> + 'r {
        self.patterns.iter().filter(move |p| p.language == language)
    }
}

/// Every rule of a run, loaded once and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compiles a list of definitions, rejecting duplicate ids and broken
    /// rule references.
    pub fn from_definitions(
        definitions: Vec<RuleDefinition>,
        adapters: &AdapterRegistry,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if !seen.insert(definition.id.clone()) {
                return Err(ConfigError::DuplicateRule(definition.id));
            }
            rules.push(Rule::compile(definition, adapters)?);
        }
        let set = Self { rules };
        set.check_references()?;
        Ok(set)
    }

    fn check_references(&self) -> Result<(), ConfigError> {
        for rule in &self.rules {
            for reference in rule.references() {
                if self.get(reference).is_none() {
                    return Err(ConfigError::UnknownRuleReference {
                        rule: rule.id.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for rule in &self.rules {
            if marks.contains_key(rule.id.as_str()) {
                continue;
            }
            // Iterative depth-first walk; a reference back to an active
            // rule closes a cycle.
            let mut stack: Vec<(&str, Vec<&str>)> = vec![(rule.id.as_str(), rule.references())];
            marks.insert(rule.id.as_str(), Mark::Active);
            while let Some((id, pending)) = stack.last_mut() {
                let id = *id;
                let Some(next) = pending.pop() else {
                    marks.insert(id, Mark::Done);
                    stack.pop();
                    continue;
                };
                match marks.get(next).copied() {
                    Some(Mark::Active) => return Err(ConfigError::RuleCycle(next.to_string())),
                    Some(Mark::Done) => {}
                    None => {
                        let references = self.get(next).map(Rule::references).unwrap_or_default();
                        marks.insert(next, Mark::Active);
                        stack.push((next, references));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn from_yaml_str(text: &str, origin: &str, adapters: &AdapterRegistry) -> Result<Self, ConfigError> {
        let file: RuleFile = serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            origin: origin.to_string(),
            source,
        })?;
        Self::from_definitions(file.rules, adapters)
    }

    pub fn from_json_str(text: &str, origin: &str, adapters: &AdapterRegistry) -> Result<Self, ConfigError> {
        let file: RuleFile = serde_json::from_str(text).map_err(|source| ConfigError::Json {
            origin: origin.to_string(),
            source,
        })?;
        Self::from_definitions(file.rules, adapters)
    }

    /// Loads a rule file, or every `.yml`, `.yaml` and `.json` file of a
    /// directory in name order.
    pub fn load(path: &Path, adapters: &AdapterRegistry) -> Result<Self, ConfigError> {
        let files = if path.is_dir() {
            let mut files: Vec<_> = walkdir::WalkDir::new(path)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| {
                    matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("yml" | "yaml" | "json")
                    )
                })
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut definitions = Vec::new();
        for file in &files {
            let text = std::fs::read_to_string(file).map_err(|source| ConfigError::Io {
                path: file.clone(),
                source,
            })?;
            let origin = file.display().to_string();
            let parsed: RuleFile = match file.extension().and_then(|e| e.to_str()) {
                Some("json") => serde_json::from_str(&text)
                    .map_err(|source| ConfigError::Json { origin, source })?,
                _ => serde_yaml::from_str(&text)
                    .map_err(|source| ConfigError::Yaml { origin, source })?,
            };
            definitions.extend(parsed.rules);
        }

        let rules = Self::from_definitions(definitions, adapters)?;
        log::info!("Loaded {} rules from {}", rules.len(), path.display());
        Ok(rules)
    }

    /// The rules shipped with the binary.
    pub fn builtin(adapters: &AdapterRegistry) -> Result<Self, ConfigError> {
        Self::from_yaml_str(BUILTIN_RULES, "<builtin rules>", adapters)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Rules that report detections, auxiliary rules left out.
    pub fn reported(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| !r.auxiliary)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn for_language<'r>(&'r self, language: &'r str) -> impl Iterator<Item = &'r Rule> + 'r {
        self.rules.iter().filter(move |r| r.applies_to(language))
    }

    /// Keeps rules listed in `only` (when non-empty) and not listed in
    /// `exclude`. Ids compare case-insensitively.
    ///
    /// Rules referenced by a kept rule stay loaded as auxiliary rules, so
    /// the kept rule still runs its filters and sanitizer.
    pub fn select(&mut self, only: &[String], exclude: &[String]) {
        let matches = |list: &[String], id: &str| list.iter().any(|x| x.eq_ignore_ascii_case(id));
        let selected: HashSet<String> = self
            .rules
            .iter()
            .filter(|r| (only.is_empty() || matches(only, &r.id)) && !matches(exclude, &r.id))
            .map(|r| r.id.clone())
            .collect();

        let mut needed = selected.clone();
        let mut queue: Vec<String> = selected.iter().cloned().collect();
        while let Some(id) = queue.pop() {
            let Some(rule) = self.get(&id) else {
                continue;
            };
            for reference in rule.references() {
                if needed.insert(reference.to_string()) {
                    queue.push(reference.to_string());
                }
            }
        }

        self.rules.retain(|r| needed.contains(&r.id));
        for rule in &mut self.rules {
            if !selected.contains(&rule.id) {
                rule.auxiliary = true;
            }
        }
    }
}
