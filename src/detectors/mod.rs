//! # Detector Module
//!
//! @title Rule-Driven Leak Detection
//! @author Ramprasad
//!
//! This module ties the analysis core to the rule set: it parses a file with
//! the right syntax adapter, builds the semantic model, runs the
//! [`Aggregator`] and hands the resulting detections to a [`RiskEvaluator`].
//!
//! ## Architecture
//!
//! - [`rules`] loads and compiles rule files
//! - [`aggregator`] turns pattern matches into [`Detection`] records
//! - [`RiskEvaluator`] grades detections into report findings;
//!   [`SeverityPolicy`] is the built-in grading
//!
//! ## Built-in Rules
//!
//! | ID | Sink | Severity |
//! |----|------|----------|
//! | javascript_logger_leak | `console`/`logger` calls | High |
//! | javascript_http_leak | `fetch`/`axios` bodies | High |
//! | javascript_analytics_leak | analytics SDK calls | Medium |
//! | javascript_storage_leak | `localStorage`/`sessionStorage` | Medium |
//! | javascript_insecure_http | plain `http://` requests | Low |
//! | rust_logger_leak | `log`/`tracing` macros | High |
//! | rust_print_leak | `println!`/`eprintln!` | Medium |
//! | rust_http_leak | `reqwest` bodies | High |

pub mod aggregator;
pub mod rules;
mod utils;

pub use aggregator::{Aggregator, DataTypeDetection, Detection, Stage};
pub use rules::{PatternDefinition, Rule, RuleDefinition, RuleFile, RulePattern, RuleSet};
pub use utils::{deduplicate_findings, describe_data_types, snippet};

use std::path::Path;
use std::sync::Arc;

use crate::analysis::{analyze, AnalysisLimits};
use crate::classification::{Catalog, Classifier};
use crate::error::{AnalysisError, ConfigError};
use crate::parser::{AdapterRegistry, AnalysisContext};
use crate::report::{Finding, Severity};

/// Grades detections into findings.
///
/// Detections are self-contained: an evaluator never needs the syntax tree.
///
/// # Example Implementation
///
/// ```rust,ignore
/// pub struct CredentialsOnly;
///
/// impl RiskEvaluator for CredentialsOnly {
///     fn evaluate(&self, rule: &Rule, detection: &Detection) -> Option<Finding> {
///         detection
///             .data_types
///             .iter()
///             .any(|d| d.data_type.category_id == "credentials")
///             .then(|| SeverityPolicy::default().finding(rule, detection, Severity::Critical))
///     }
/// }
/// ```
pub trait RiskEvaluator: Send + Sync {
    /// Returns a finding, or `None` when the detection is not reportable.
    fn evaluate(&self, rule: &Rule, detection: &Detection) -> Option<Finding>;
}

/// Grades a detection with its rule's severity.
///
/// Detections below `minimum` are dropped.
#[derive(Debug, Clone, Copy)]
pub struct SeverityPolicy {
    pub minimum: Severity,
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self {
            minimum: Severity::Info,
        }
    }
}

impl SeverityPolicy {
    pub fn new(minimum: Severity) -> Self {
        Self { minimum }
    }

    /// Builds the finding for `detection` at the given severity.
    ///
    /// # Arguments
    ///
    /// * `rule` - The rule that produced the detection
    /// * `detection` - The detection to report
    /// * `severity` - Severity to report it with
    ///
    /// # Returns
    ///
    /// A fully populated [`Finding`] whose id is stable across runs.
    pub fn finding(&self, rule: &Rule, detection: &Detection, severity: Severity) -> Finding {
        let mut description = rule.description.trim().to_string();
        if !detection.data_types.is_empty() {
            description.push_str("\nData types: ");
            description.push_str(&describe_data_types(&detection.data_types));
        }

        let location = match detection.data_types.first() {
            Some(first) => first
                .subject_name
                .clone()
                .unwrap_or_else(|| snippet(&detection.match_content, 1)),
            None => snippet(&detection.match_content, 1),
        };

        Finding {
            id: finding_id(&rule.id, &detection.file_path, detection.line(), detection.column()),
            rule_id: rule.id.clone(),
            title: rule.title.clone(),
            description,
            severity,
            file_path: detection.file_path.clone(),
            line: detection.line(),
            column: detection.column(),
            location,
            code_snippet: Some(snippet(
                detection
                    .context_content
                    .as_deref()
                    .unwrap_or(&detection.match_content),
                5,
            )),
            remediation: rule.remediation.clone(),
            cwe: rule.cwe.clone(),
            data_types: detection.data_types.clone(),
        }
    }
}

impl RiskEvaluator for SeverityPolicy {
    fn evaluate(&self, rule: &Rule, detection: &Detection) -> Option<Finding> {
        (rule.severity >= self.minimum).then(|| self.finding(rule, detection, rule.severity))
    }
}

/// Stable finding identifier: the rule id plus an FNV-1a hash of the location.
fn finding_id(rule_id: &str, file_path: &str, line: usize, column: usize) -> String {
    let location = format!("{}:{}:{}", file_path, line, column);
    let hash = location
        .bytes()
        .fold(0x811c_9dc5_u32, |hash, byte| (hash ^ byte as u32).wrapping_mul(0x0100_0193));
    format!("{}-{:08x}", rule_id, hash)
}

/// Everything needed to analyze one file: adapters, rules and classifier.
///
/// Shared read-only by every worker thread.
///
/// # Example
///
/// ```rust,ignore
/// let registry = DetectorRegistry::with_defaults()?;
/// let detections = registry.detect_source("app.js", source)?;
/// let findings = registry.evaluate(&SeverityPolicy::default(), &detections);
/// ```
pub struct DetectorRegistry {
    adapters: AdapterRegistry,
    rules: Arc<RuleSet>,
    classifier: Arc<Classifier>,
    limits: AnalysisLimits,
}

impl DetectorRegistry {
    pub fn new(
        adapters: AdapterRegistry,
        rules: Arc<RuleSet>,
        classifier: Arc<Classifier>,
        limits: AnalysisLimits,
    ) -> Self {
        Self {
            adapters,
            rules,
            classifier,
            limits,
        }
    }

    /// Creates a registry with the built-in rules and catalog.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the embedded rule or catalog files fail
    /// to load.
    pub fn with_defaults() -> Result<Self, ConfigError> {
        let adapters = AdapterRegistry::new();
        let rules = RuleSet::builtin(&adapters)?;
        let catalog = Catalog::builtin()?;
        Ok(Self::new(
            adapters,
            Arc::new(rules),
            Arc::new(Classifier::new(Arc::new(catalog), 1)),
            AnalysisLimits::default(),
        ))
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn limits(&self) -> AnalysisLimits {
        self.limits
    }

    /// True when some adapter handles the file's extension.
    pub fn supports(&self, path: &Path) -> bool {
        self.adapters.for_path(path).is_some()
    }

    /// Parses and analyzes one source file.
    ///
    /// # Arguments
    ///
    /// * `file_path` - Path used for adapter selection and reporting
    /// * `source` - File contents
    ///
    /// # Errors
    ///
    /// Returns an [`AnalysisError`] when no adapter handles the file, the
    /// parse fails outright, or a resource cap is exceeded.
    pub fn detect_source(&self, file_path: &str, source: &str) -> Result<Vec<Detection>, AnalysisError> {
        let adapter = self
            .adapters
            .for_path(Path::new(file_path))
            .ok_or_else(|| AnalysisError::UnsupportedLanguage(file_path.to_string()))?;
        let context = AnalysisContext::from_source(adapter, file_path, source)?;
        self.detect(&context)
    }

    /// Runs every applicable rule over an already parsed file.
    pub fn detect(&self, context: &AnalysisContext) -> Result<Vec<Detection>, AnalysisError> {
        log::debug!(
            "Analyzing {} ({}, {} nodes)",
            context.file_path,
            context.language,
            context.tree.len()
        );
        let model = analyze(&context.tree, context.capabilities, self.limits)?;
        let detections = Aggregator::new(&self.rules, &self.classifier).run(&model);
        log::debug!("{}: {} detections", context.file_path, detections.len());
        Ok(detections)
    }

    /// Grades detections with `evaluator`, sorted by severity (highest first)
    /// then location.
    pub fn evaluate(&self, evaluator: &dyn RiskEvaluator, detections: &[Detection]) -> Vec<Finding> {
        let findings: Vec<Finding> = detections
            .iter()
            .filter_map(|detection| {
                let rule = self.rules.get(&detection.rule_id)?;
                evaluator.evaluate(rule, detection)
            })
            .collect();
        let mut findings = deduplicate_findings(findings);
        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.file_path.cmp(&b.file_path))
                .then_with(|| (a.line, a.column).cmp(&(b.line, b.column)))
        });
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = DetectorRegistry::with_defaults().unwrap();
        assert!(!registry.rules().is_empty());
        assert!(registry.supports(Path::new("app.js")));
        assert!(!registry.supports(Path::new("notes.txt")));
    }

    #[test]
    fn test_rule_ids_unique() {
        let registry = DetectorRegistry::with_defaults().unwrap();
        let mut ids: Vec<_> = registry.rules().rules().iter().map(|r| r.id.as_str()).collect();
        let len_before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), len_before, "Rule IDs must be unique");
    }

    #[test]
    fn test_builtin_rules_find_logged_email() {
        let registry = DetectorRegistry::with_defaults().unwrap();
        let detections = registry
            .detect_source("app.js", "user.email = \"a@b.com\";\nlogger.info(user);\n")
            .unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].rule_id, "javascript_logger_leak");

        let findings = registry.evaluate(&SeverityPolicy::default(), &detections);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[0].description.contains("Email Address"));
    }

    #[test]
    fn test_unsupported_file_is_an_error() {
        let registry = DetectorRegistry::with_defaults().unwrap();
        let err = registry.detect_source("notes.txt", "hello").unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedLanguage(_)));
    }

    #[test]
    fn test_policy_minimum_drops_lower_severities() {
        let registry = DetectorRegistry::with_defaults().unwrap();
        let detections = registry
            .detect_source("app.js", "fetch(\"http://example.com/ping\");\n")
            .unwrap();
        assert_eq!(detections.len(), 1);
        assert!(registry
            .evaluate(&SeverityPolicy::new(Severity::High), &detections)
            .is_empty());
    }

    #[test]
    fn test_finding_ids_are_stable() {
        assert_eq!(
            finding_id("r", "a.js", 3, 1),
            finding_id("r", "a.js", 3, 1)
        );
        assert_ne!(finding_id("r", "a.js", 3, 1), finding_id("r", "a.js", 4, 1));
    }
}
