//! # Detection Aggregator
//!
//! @title Match to Detection Pipeline
//! @author Ramprasad
//!
//! Runs every rule of a language over one file's semantic model and turns
//! pattern matches into [`Detection`] records.
//!
//! ## Stages
//!
//! Each match moves through `New -> Matched -> Classified -> Emitted`:
//!
//! 1. **Matched**: the pattern filters pass, the rule's sanitizer does not
//!    match at the match node, and no disable comment covers the match.
//! 2. **Classified**: the rule's data type captures have been resolved
//!    through chains and shapes and classified against the catalog.
//! 3. **Emitted**: the detection is kept, unless the rule requires data
//!    types and none were found.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::rules::{Rule, RulePattern, RuleSet};
use crate::analysis::{Field, NodeId, NodeKind, SemanticModel, Span};
use crate::classification::classifier::Subject;
use crate::classification::{ClassifiedNode, Classifier, DataType, Decision};
use crate::patterns::filters::all_match;
use crate::patterns::{find_all, find_within, match_at, FilterContext, PatternMatch, RuleScan};

/// A sensitive data type found in a captured value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTypeDetection {
    /// Data type name, e.g. `Email Address`.
    pub name: String,
    pub data_type: DataType,
    /// Field or variable that holds the value.
    pub field_name: Option<String>,
    /// Object the field belongs to.
    pub object_name: Option<String>,
    /// Class or impl block around the match.
    pub subject_name: Option<String>,
    pub decision: Decision,
    pub line: usize,
    pub column: usize,
}

/// One rule match, with everything a policy needs to grade it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub rule_id: String,
    pub file_path: String,
    pub language: String,
    pub pattern: String,
    pub match_span: Span,
    pub match_content: String,
    /// Statement enclosing the match, when it differs from the match itself.
    pub context_span: Option<Span>,
    pub context_content: Option<String>,
    /// Source text of each capture.
    pub variables: BTreeMap<String, String>,
    pub data_types: Vec<DataTypeDetection>,
}

impl Detection {
    pub fn line(&self) -> usize {
        self.match_span.line
    }

    pub fn column(&self) -> usize {
        self.match_span.column
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    New,
    Matched,
    Classified,
    Emitted,
}

/// A match on its way to becoming a detection.
struct Pending<'r> {
    stage: Stage,
    rule: &'r Rule,
    pattern: &'r RulePattern,
    found: PatternMatch,
    data_types: Vec<DataTypeDetection>,
}

impl<'r> Pending<'r> {
    fn new(rule: &'r Rule, pattern: &'r RulePattern, found: PatternMatch) -> Self {
        Self {
            stage: Stage::New,
            rule,
            pattern,
            found,
            data_types: Vec::new(),
        }
    }

    fn advance(&mut self, from: Stage, to: Stage) {
        debug_assert_eq!(self.stage, from);
        self.stage = to;
    }
}

/// Turns pattern matches of one file into detections.
pub struct Aggregator<'a> {
    rules: &'a RuleSet,
    classifier: &'a Classifier,
}

impl<'a> Aggregator<'a> {
    pub fn new(rules: &'a RuleSet, classifier: &'a Classifier) -> Self {
        Self { rules, classifier }
    }

    /// Runs every applicable rule over `model`.
    ///
    /// # Returns
    ///
    /// Detections in source order of their match nodes. A rule reports a
    /// given match node once, even when several of its patterns hit it.
    pub fn run(&self, model: &SemanticModel<'_>) -> Vec<Detection> {
        let tree = model.tree();
        let language = tree.language();
        let mut seen: HashSet<(&str, NodeId)> = HashSet::new();
        let mut detections = Vec::new();

        for rule in self.rules.for_language(language).filter(|r| !r.auxiliary) {
            for pattern in rule.patterns_for(language) {
                for found in find_all(tree, &pattern.compiled) {
                    log::trace!(
                        "{}: rule {} matched at line {}",
                        tree.file(),
                        rule.id,
                        tree.span(found.match_node).line
                    );
                    if seen.contains(&(rule.id.as_str(), found.match_node)) {
                        continue;
                    }
                    let pending = Pending::new(rule, pattern, found);
                    let Some(pending) = self.matched(model, pending) else {
                        continue;
                    };
                    let pending = self.classified(model, pending);
                    if let Some(detection) = self.emitted(model, pending) {
                        seen.insert((rule.id.as_str(), detection.1));
                        detections.push(detection.0);
                    }
                }
            }
        }

        detections.sort_by(|a, b| {
            (a.match_span, &a.rule_id).cmp(&(b.match_span, &b.rule_id))
        });
        detections
    }

    fn matched<'r>(&self, model: &SemanticModel<'_>, mut pending: Pending<'r>) -> Option<Pending<'r>> {
        let context = FilterContext {
            model,
            captures: &pending.found.captures,
            file_path: model.tree().file(),
            rules: Some(self),
        };
        if !all_match(&pending.pattern.filters, &context) {
            return None;
        }
        if self.sanitized(model, pending.rule, pending.found.match_node) {
            log::debug!(
                "{}: rule {} sanitized at line {}",
                model.tree().file(),
                pending.rule.id,
                model.tree().span(pending.found.match_node).line
            );
            return None;
        }
        if model.is_suppressed(pending.found.match_node, &pending.rule.id) {
            log::debug!(
                "{}: rule {} suppressed at line {}",
                model.tree().file(),
                pending.rule.id,
                model.tree().span(pending.found.match_node).line
            );
            return None;
        }
        pending.advance(Stage::New, Stage::Matched);
        Some(pending)
    }

    /// True when the sanitizer of `rule` matches exactly at `node`.
    fn sanitized(&self, model: &SemanticModel<'_>, rule: &Rule, node: NodeId) -> bool {
        let Some(sanitizer) = rule.sanitizer.as_deref().and_then(|id| self.rules.get(id)) else {
            return false;
        };
        let tree = model.tree();
        sanitizer.patterns_for(tree.language()).any(|pattern| {
            match_at(tree, &pattern.compiled, node)
                .is_some_and(|found| self.accepts(model, sanitizer, pattern, &found))
        })
    }

    /// Filters and sanitizer of `rule` for a match found on behalf of
    /// another rule. Data types and suppressions play no part here.
    fn accepts(
        &self,
        model: &SemanticModel<'_>,
        rule: &Rule,
        pattern: &RulePattern,
        found: &PatternMatch,
    ) -> bool {
        let context = FilterContext {
            model,
            captures: &found.captures,
            file_path: model.tree().file(),
            rules: Some(self),
        };
        all_match(&pattern.filters, &context) && !self.sanitized(model, rule, found.match_node)
    }

    fn classified<'r>(&self, model: &SemanticModel<'_>, mut pending: Pending<'r>) -> Pending<'r> {
        let vendored = self
            .classifier
            .catalog()
            .is_vendored(model.tree().file());
        let subject_name = model.enclosing_class_name(pending.found.match_node);

        let mut found = Vec::new();
        for variable in &pending.rule.data_types {
            if let Some(node) = pending.found.captures.get(variable) {
                let mut collector = Collector {
                    model,
                    classifier: self.classifier,
                    vendored,
                    subject_name,
                    found: &mut found,
                };
                collector.capture(*node);
            }
        }

        let mut unique = HashSet::new();
        found.retain(|d: &DataTypeDetection| {
            unique.insert((d.data_type.id.clone(), d.field_name.clone(), d.object_name.clone()))
        });
        pending.data_types = found;
        pending.advance(Stage::Matched, Stage::Classified);
        pending
    }

    fn emitted(&self, model: &SemanticModel<'_>, mut pending: Pending<'_>) -> Option<(Detection, NodeId)> {
        if pending.rule.requires_data_types && pending.data_types.is_empty() {
            return None;
        }
        pending.advance(Stage::Classified, Stage::Emitted);

        let tree = model.tree();
        let match_node = pending.found.match_node;
        let statement = model.statement_of(match_node);
        let (context_span, context_content) = if statement != match_node {
            (
                Some(tree.span(statement)),
                Some(tree.content(statement).to_string()),
            )
        } else {
            (None, None)
        };

        let variables = pending
            .found
            .captures
            .iter()
            .map(|(name, node)| (name.clone(), tree.content(*node).to_string()))
            .collect();

        let detection = Detection {
            rule_id: pending.rule.id.clone(),
            file_path: tree.file().to_string(),
            language: tree.language().to_string(),
            pattern: pending.pattern.compiled.source.clone(),
            match_span: tree.span(match_node),
            match_content: tree.content(match_node).to_string(),
            context_span,
            context_content,
            variables,
            data_types: pending.data_types,
        };
        Some((detection, match_node))
    }
}

impl RuleScan for Aggregator<'_> {
    fn detects_within(&self, rule_id: &str, model: &SemanticModel<'_>, node: NodeId) -> bool {
        let Some(rule) = self.rules.get(rule_id) else {
            return false;
        };
        let tree = model.tree();
        rule.patterns_for(tree.language()).any(|pattern| {
            find_within(tree, &pattern.compiled, node)
                .iter()
                .any(|found| self.accepts(model, rule, pattern, found))
        })
    }
}

/// Walks a captured expression and classifies every value it carries.
struct Collector<'c, 'm, 't> {
    model: &'m SemanticModel<'t>,
    classifier: &'c Classifier,
    vendored: bool,
    subject_name: Option<&'t str>,
    found: &'c mut Vec<DataTypeDetection>,
}

impl<'c, 'm, 't> Collector<'c, 'm, 't> {
    fn capture(&mut self, node: NodeId) {
        let tree = self.model.tree();
        match tree.kind(node) {
            NodeKind::Identifier | NodeKind::Member | NodeKind::Index => self.chain(node),
            NodeKind::Object => self.object(node),
            NodeKind::Assignment => {
                if let Some(right) = tree.child_by_field(node, Field::Right) {
                    self.capture(right);
                }
            }
            // Arguments of a call, operands of concatenations and elements of arrays.
            NodeKind::Call
            | NodeKind::Arguments
            | NodeKind::Binary
            | NodeKind::TemplateString
            | NodeKind::Array
            | NodeKind::Spread => {
                let children = match tree.kind(node) {
                    NodeKind::Call => tree
                        .child_by_field(node, Field::Arguments)
                        .map(|args| tree.code_children(args))
                        .unwrap_or_default(),
                    _ => tree.code_children(node),
                };
                for child in children {
                    self.capture(child);
                }
            }
            _ => {}
        }
    }

    fn chain(&mut self, node: NodeId) {
        let model = self.model;
        let Some(chain) = model.chain(node) else {
            return;
        };
        let name = match chain.field_name() {
            Some(field) => field,
            None if chain.segments.is_empty() && !chain.unknown_tail => match chain.root_name() {
                Some(root) => root,
                None => return,
            },
            None => return,
        };
        let object_name = chain.object_name();
        let subject = Subject {
            object_name,
            vendored: self.vendored,
        };

        let classified = match model.shape_of(node) {
            Some(shape) => self.classifier.classify_shape(
                name,
                shape,
                model.shapes(),
                model.epoch_of(node),
                subject,
            ),
            None => ClassifiedNode::leaf(self.classifier.classify_unresolved(name, subject)),
        };
        self.record(node, &classified, object_name);
    }

    fn object(&mut self, node: NodeId) {
        let model = self.model;
        let Some(shape) = model.shape_of(node) else {
            return;
        };
        let name = model.shapes().object_name(shape).unwrap_or_default();
        let classified = self.classifier.classify_shape(
            name,
            shape,
            model.shapes(),
            model.epoch_of(node),
            Subject {
                object_name: None,
                vendored: self.vendored,
            },
        );
        self.record(node, &classified, None);
    }

    fn record(&mut self, node: NodeId, classified: &ClassifiedNode, holder: Option<&str>) {
        let span = self.model.tree().span(node);
        for (parent, classification) in classified.valid_data_types() {
            let Some(data_type) = &classification.data_type else {
                continue;
            };
            let object_name = match parent {
                Some(parent) if !parent.is_empty() => Some(parent.to_string()),
                Some(_) => None,
                None => holder.map(str::to_string),
            };
            self.found.push(DataTypeDetection {
                name: data_type.name.clone(),
                data_type: data_type.clone(),
                field_name: Some(classification.name.clone()),
                object_name,
                subject_name: self.subject_name.map(str::to_string),
                decision: classification.decision,
                line: span.line,
                column: span.column,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::analysis::{analyze, AnalysisLimits};
    use crate::classification::{Catalog, Reason};
    use crate::parser::{AdapterRegistry, JavaScriptAdapter, RustAdapter, SyntaxAdapter};

    const CATALOG: &str = r#"
data_types:
  - { name: Email Address, id: email_address, category_id: contact, patterns: ['\bemail\b'] }
  - { name: Firstname, id: firstname, category_id: personal, patterns: ['\bfirst name\b'] }
known_objects: ['\buser\b']
stop_words: [props, this]
"#;

    const RULES: &str = r#"
rules:
  - id: logger_leak
    title: Sensitive data in logs
    description: d
    severity: high
    languages: [javascript]
    patterns:
      - pattern: logger.info($<DATA>)
    data_types: [DATA]
  - id: rust_log_leak
    title: Sensitive data in logs
    description: d
    severity: high
    languages: [rust]
    patterns:
      - pattern: info!($<...>, $<DATA>)
    data_types: [DATA]
  - id: http_url
    title: Plain HTTP
    description: d
    severity: low
    languages: [javascript]
    patterns:
      - pattern: fetch($<URL>)
        filters:
          - { variable: URL, string_regex: '^http://' }
"#;

    const REFERENCING_RULES: &str = r#"
rules:
  - id: body_logged
    title: Request body in logs
    description: d
    severity: medium
    languages: [javascript]
    patterns:
      - pattern: logger.info($<DATA>)
        filters:
          - { variable: DATA, detection: request_body }
  - id: request_body
    title: Request body
    description: d
    severity: low
    auxiliary: true
    languages: [javascript]
    patterns:
      - pattern: req.body
  - id: logger_leak
    title: Sensitive data in logs
    description: d
    severity: high
    languages: [javascript]
    patterns:
      - pattern: logger.info($<DATA>)
    data_types: [DATA]
    sanitizer: redacted
  - id: redacted
    title: Redacted log call
    description: d
    severity: low
    auxiliary: true
    languages: [javascript]
    patterns:
      - pattern: logger.info(redact($<_>))
"#;

    fn detect_with(adapter: &dyn SyntaxAdapter, file: &str, source: &str) -> Vec<Detection> {
        detect_rules(RULES, adapter, file, source)
    }

    fn detect_rules(
        rules: &str,
        adapter: &dyn SyntaxAdapter,
        file: &str,
        source: &str,
    ) -> Vec<Detection> {
        let adapters = AdapterRegistry::new();
        let rules = RuleSet::from_yaml_str(rules, "test", &adapters).unwrap();
        let catalog = Arc::new(Catalog::from_yaml_str(CATALOG, "test").unwrap());
        let classifier = Classifier::new(catalog, 1);
        let tree = adapter.parse(file, source).unwrap();
        let model = analyze(&tree, adapter.capabilities(), AnalysisLimits::default()).unwrap();
        Aggregator::new(&rules, &classifier).run(&model)
    }

    fn detect(source: &str) -> Vec<Detection> {
        detect_with(&JavaScriptAdapter::new(), "app.js", source)
    }

    #[test]
    fn test_mutated_object_reaches_logger() {
        let detections = detect("user.email = \"a@b.com\";\nlogger.info(user);\n");
        assert_eq!(detections.len(), 1);
        let detection = &detections[0];
        assert_eq!(detection.match_content, "logger.info(user)");
        assert_eq!(detection.data_types.len(), 1);
        let found = &detection.data_types[0];
        assert_eq!(found.name, "Email Address");
        assert_eq!(found.field_name.as_deref(), Some("email"));
        assert_eq!(found.object_name.as_deref(), Some("user"));
    }

    #[test]
    fn test_match_without_data_types_is_dropped() {
        assert!(detect("logger.info(status);\n").is_empty());
    }

    #[test]
    fn test_rule_without_data_types_emits_empty_list() {
        let detections = detect("fetch(\"http://example.com\");\nfetch(\"https://example.com\");\n");
        assert_eq!(detections.len(), 1);
        assert!(detections[0].data_types.is_empty());
        assert_eq!(detections[0].variables["URL"], "\"http://example.com\"");
    }

    #[test]
    fn test_call_arguments_and_concatenation_contribute() {
        let detections = detect(
            "const user = { first_name: \"George\" };\nlogger.info(\"user: \" + JSON.stringify(user));\n",
        );
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].data_types[0].name, "Firstname");
    }

    #[test]
    fn test_stop_word_object_yields_nothing() {
        assert!(detect("function f(props) { logger.info(props.email); }\n").is_empty());
    }

    #[test]
    fn test_unresolved_root_falls_back_to_field_name() {
        let detections = detect("logger.info(request.email);\n");
        assert_eq!(detections.len(), 1);
        assert_eq!(
            detections[0].data_types[0].decision.reason,
            Reason::KnownPattern
        );
        assert_eq!(detections[0].data_types[0].object_name.as_deref(), Some("request"));
    }

    #[test]
    fn test_disable_comment_suppresses_named_rule() {
        let detections = detect(
            "// sentinel:disable logger_leak\nlogger.info(user.email);\nlogger.info(user.email);\n",
        );
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].line(), 3);
    }

    #[test]
    fn test_context_is_enclosing_statement() {
        let detections = detect("const x = logger.info(user.email);\n");
        assert_eq!(detections.len(), 1);
        assert_eq!(
            detections[0].context_content.as_deref(),
            Some("const x = logger.info(user.email);")
        );
    }

    #[test]
    fn test_rust_macro_with_subject_name() {
        let source = "impl Account {\n    fn log(&self, user: &User) {\n        info!(\"{}\", user.email);\n    }\n}\n";
        let detections = detect_with(&RustAdapter::new(), "src/account.rs", source);
        assert_eq!(detections.len(), 1);
        let found = &detections[0].data_types[0];
        assert_eq!(found.subject_name.as_deref(), Some("Account"));
        assert_eq!(found.object_name.as_deref(), Some("user"));
    }

    fn provenance(detections: &[Detection]) -> Vec<(String, Option<String>, Option<String>)> {
        detections
            .iter()
            .flat_map(|d| d.data_types.iter())
            .map(|t| (t.name.clone(), t.field_name.clone(), t.object_name.clone()))
            .collect()
    }

    #[test]
    fn test_write_in_nested_function_reaches_logger() {
        let detections = detect(
            "const user = {};\nfunction f() { user.email = \"a\"; }\nlogger.info(user);\n",
        );
        assert_eq!(detections.len(), 1);
        assert_eq!(
            provenance(&detections),
            vec![(
                "Email Address".to_string(),
                Some("email".to_string()),
                Some("user".to_string())
            )]
        );
    }

    #[test]
    fn test_string_index_classifies_like_member_access() {
        let dotted = detect("const user = { email: e };\nlogger.info(user.email);\n");
        let indexed = detect("const user = { email: e };\nlogger.info(user[\"email\"]);\n");
        assert_eq!(dotted.len(), 1);
        assert_eq!(provenance(&dotted), provenance(&indexed));
    }

    #[test]
    fn test_detection_filter_runs_referenced_rule() {
        let detections = detect_rules(
            REFERENCING_RULES,
            &JavaScriptAdapter::new(),
            "app.js",
            "logger.info(req.body.name);\nlogger.info(req.query);\n",
        );
        let hits: Vec<_> = detections
            .iter()
            .map(|d| (d.rule_id.as_str(), d.line()))
            .collect();
        assert_eq!(hits, vec![("body_logged", 1)]);
    }

    #[test]
    fn test_sanitizer_drops_match() {
        let detections = detect_rules(
            REFERENCING_RULES,
            &JavaScriptAdapter::new(),
            "app.js",
            "user.email = \"a@b.com\";\nlogger.info(user);\nlogger.info(redact(user));\n",
        );
        let hits: Vec<_> = detections
            .iter()
            .map(|d| (d.rule_id.as_str(), d.line()))
            .collect();
        assert_eq!(hits, vec![("logger_leak", 2)]);

        let unsanitized = REFERENCING_RULES.replace("    sanitizer: redacted\n", "");
        let detections = detect_rules(
            &unsanitized,
            &JavaScriptAdapter::new(),
            "app.js",
            "user.email = \"a@b.com\";\nlogger.info(redact(user));\n",
        );
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].rule_id, "logger_leak");
    }

    #[test]
    fn test_rerun_is_identical() {
        let source = "user.email = \"a\";\nlogger.info(user);\nlogger.info(user.email);\n";
        assert_eq!(detect(source), detect(source));
    }
}
