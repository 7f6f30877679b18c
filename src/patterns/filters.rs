//! # Pattern Filters
//!
//! @title Match Filters
//! @author Ramprasad
//!
//! Filters narrow a pattern match using the captured nodes. Each filter
//! evaluates to `Some(true)`, `Some(false)` or `None` when it does not apply
//! (for example a `string_regex` on a value with no static string). A match
//! survives only when every filter of its pattern evaluates to `Some(true)`.
//!
//! A `detection` filter runs another rule of the same rule set over the
//! captured node. The rule set is reached through [`RuleScan`], so this
//! module never depends on how rules are stored.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::CompiledPattern;
use crate::analysis::{NodeId, SemanticModel};
use crate::error::ConfigError;

/// Filter as written in a rule file.
///
/// Exactly one condition must be set. `variable` names the capture the
/// condition inspects.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilterDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<FilterDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub either: Option<Vec<FilterDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_less_than: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub less_than: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub less_than_or_equal: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greater_than: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greater_than_or_equal: Option<i64>,
    /// Id of a rule that must detect at or inside the captured node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Comparison {
    fn holds(self, value: i64, bound: i64) -> bool {
        match self {
            Comparison::LessThan => value < bound,
            Comparison::LessThanOrEqual => value <= bound,
            Comparison::GreaterThan => value > bound,
            Comparison::GreaterThanOrEqual => value >= bound,
        }
    }
}

/// Compiled filter.
#[derive(Debug, Clone)]
pub enum Filter {
    Not(Box<Filter>),
    Either(Vec<Filter>),
    FilenameRegex(Regex),
    Values { variable: String, values: Vec<String> },
    Regex { variable: String, regex: Regex },
    StringRegex { variable: String, regex: Regex },
    LengthLessThan { variable: String, length: usize },
    Compare {
        variable: String,
        comparison: Comparison,
        bound: i64,
    },
    Detection { variable: String, rule: String },
}

/// Runs a rule by id over part of a file.
pub trait RuleScan {
    /// True when rule `rule_id` matches at `node` or one of its
    /// descendants. Unknown ids never match.
    fn detects_within(&self, rule_id: &str, model: &SemanticModel<'_>, node: NodeId) -> bool;
}

/// What a filter can see of one match.
pub struct FilterContext<'a, 't> {
    pub model: &'a SemanticModel<'t>,
    pub captures: &'a BTreeMap<String, NodeId>,
    pub file_path: &'a str,
    /// Needed by `detection` filters, which evaluate to `None` without it.
    pub rules: Option<&'a dyn RuleScan>,
}

impl<'a, 't> FilterContext<'a, 't> {
    fn content(&self, variable: &str) -> Option<&'t str> {
        let node = self.captures.get(variable)?;
        Some(self.model.tree().content(*node))
    }

    fn string_value(&self, variable: &str) -> Option<String> {
        let node = self.captures.get(variable)?;
        self.model
            .string_value(*node)
            .filter(|value| !value.is_empty())
    }
}

impl Filter {
    /// Compiles `definition`, checking every variable against `pattern`.
    pub fn compile(
        rule_id: &str,
        pattern: &CompiledPattern,
        definition: &FilterDefinition,
    ) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidFilter {
            rule: rule_id.to_string(),
            message: message.to_string(),
        };
        let regex = |text: &str| {
            Regex::new(text).map_err(|e| ConfigError::InvalidRegex {
                pattern: text.to_string(),
                message: e.to_string(),
            })
        };

        let conditions = [
            definition.not.is_some(),
            definition.either.is_some(),
            definition.filename_regex.is_some(),
            definition.values.is_some(),
            definition.regex.is_some(),
            definition.string_regex.is_some(),
            definition.length_less_than.is_some(),
            definition.less_than.is_some(),
            definition.less_than_or_equal.is_some(),
            definition.greater_than.is_some(),
            definition.greater_than_or_equal.is_some(),
            definition.detection.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if conditions != 1 {
            return Err(invalid("a filter needs exactly one condition"));
        }

        if let Some(inner) = &definition.not {
            return Ok(Filter::Not(Box::new(Self::compile(rule_id, pattern, inner)?)));
        }
        if let Some(list) = &definition.either {
            if list.is_empty() {
                return Err(invalid("`either` needs at least one filter"));
            }
            let filters = list
                .iter()
                .map(|f| Self::compile(rule_id, pattern, f))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Filter::Either(filters));
        }
        if let Some(text) = &definition.filename_regex {
            return Ok(Filter::FilenameRegex(regex(text)?));
        }

        let variable = definition
            .variable
            .clone()
            .ok_or_else(|| invalid("this filter needs a `variable`"))?;
        if !pattern.defines(&variable) {
            return Err(ConfigError::UnknownVariable {
                rule: rule_id.to_string(),
                variable,
            });
        }

        let filter = if let Some(values) = &definition.values {
            Filter::Values {
                variable,
                values: values.clone(),
            }
        } else if let Some(text) = &definition.regex {
            Filter::Regex {
                variable,
                regex: regex(text)?,
            }
        } else if let Some(text) = &definition.string_regex {
            Filter::StringRegex {
                variable,
                regex: regex(text)?,
            }
        } else if let Some(length) = definition.length_less_than {
            Filter::LengthLessThan { variable, length }
        } else if let Some(rule) = &definition.detection {
            Filter::Detection {
                variable,
                rule: rule.clone(),
            }
        } else {
            let (comparison, bound) = [
                (Comparison::LessThan, definition.less_than),
                (Comparison::LessThanOrEqual, definition.less_than_or_equal),
                (Comparison::GreaterThan, definition.greater_than),
                (Comparison::GreaterThanOrEqual, definition.greater_than_or_equal),
            ]
            .into_iter()
            .find_map(|(c, b)| b.map(|b| (c, b)))
            .ok_or_else(|| invalid("unknown filter"))?;
            Filter::Compare {
                variable,
                comparison,
                bound,
            }
        };
        Ok(filter)
    }

    /// Three-valued evaluation against one match.
    pub fn evaluate(&self, context: &FilterContext<'_, '_>) -> Option<bool> {
        match self {
            Filter::Not(inner) => inner.evaluate(context).map(|b| !b),
            Filter::Either(filters) => {
                let results: Vec<Option<bool>> =
                    filters.iter().map(|f| f.evaluate(context)).collect();
                if results.contains(&Some(true)) {
                    Some(true)
                } else if results.contains(&Some(false)) {
                    Some(false)
                } else {
                    None
                }
            }
            Filter::FilenameRegex(regex) => Some(regex.is_match(context.file_path)),
            Filter::Values { variable, values } => {
                let content = context.content(variable)?;
                Some(values.iter().any(|v| v == content))
            }
            Filter::Regex { variable, regex } => Some(regex.is_match(context.content(variable)?)),
            Filter::StringRegex { variable, regex } => {
                Some(regex.is_match(&context.string_value(variable)?))
            }
            Filter::LengthLessThan { variable, length } => {
                Some(context.string_value(variable)?.chars().count() < *length)
            }
            Filter::Compare {
                variable,
                comparison,
                bound,
            } => {
                let value: i64 = context.content(variable)?.trim().parse().ok()?;
                Some(comparison.holds(value, *bound))
            }
            Filter::Detection { variable, rule } => {
                let node = context.captures.get(variable)?;
                let rules = context.rules?;
                Some(rules.detects_within(rule, context.model, *node))
            }
        }
    }

    /// Ids of the rules this filter runs, nested filters included.
    pub fn referenced_rules(&self) -> Vec<&str> {
        match self {
            Filter::Not(inner) => inner.referenced_rules(),
            Filter::Either(filters) => filters.iter().flat_map(|f| f.referenced_rules()).collect(),
            Filter::Detection { rule, .. } => vec![rule.as_str()],
            _ => Vec::new(),
        }
    }
}

/// True when every filter evaluates to `Some(true)`.
pub fn all_match(filters: &[Filter], context: &FilterContext<'_, '_>) -> bool {
    filters.iter().all(|f| f.evaluate(context) == Some(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{analyze, AnalysisLimits, Capabilities};
    use crate::parser::{JavaScriptAdapter, SyntaxAdapter};
    use crate::patterns::{compile, find_all};

    fn definition(yaml: &str) -> FilterDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    /// Detects inside any node whose text contains `needle`, for rule `known` only.
    struct TextScan {
        needle: &'static str,
    }

    impl RuleScan for TextScan {
        fn detects_within(&self, rule_id: &str, model: &SemanticModel<'_>, node: NodeId) -> bool {
            rule_id == "known" && model.tree().content(node).contains(self.needle)
        }
    }

    /// Results of `filter_yaml` on each match of `pattern` in `source`.
    fn evaluate(pattern: &str, filter_yaml: &str, file: &str, source: &str) -> Vec<Option<bool>> {
        evaluate_with(pattern, filter_yaml, file, source, None)
    }

    fn evaluate_with(
        pattern: &str,
        filter_yaml: &str,
        file: &str,
        source: &str,
        rules: Option<&dyn RuleScan>,
    ) -> Vec<Option<bool>> {
        let adapter = JavaScriptAdapter::new();
        let compiled = compile(&adapter, "test", pattern).unwrap();
        let filter = Filter::compile("test", &compiled, &definition(filter_yaml)).unwrap();
        let tree = adapter.parse(file, source).unwrap();
        let model = analyze(&tree, Capabilities::default(), AnalysisLimits::default()).unwrap();
        find_all(&tree, &compiled)
            .iter()
            .map(|m| {
                filter.evaluate(&FilterContext {
                    model: &model,
                    captures: &m.captures,
                    file_path: file,
                    rules,
                })
            })
            .collect()
    }

    #[test]
    fn test_not_values_rejects_listed_content() {
        let results = evaluate(
            "logger.$<LEVEL>($<DATA>)",
            "not: { variable: LEVEL, values: [debug] }",
            "a.js",
            "logger.debug(x);\nlogger.info(x);\n",
        );
        assert_eq!(results, vec![Some(false), Some(true)]);
    }

    #[test]
    fn test_string_regex_uses_resolved_value() {
        let results = evaluate(
            "fetch($<URL>)",
            "{ variable: URL, string_regex: '^http://' }",
            "a.js",
            "const base = \"http://api\";\nfetch(base + \"/users\");\nfetch(other);\n",
        );
        assert_eq!(results, vec![Some(true), None]);
    }

    #[test]
    fn test_length_and_comparison() {
        let length = evaluate(
            "setKey($<K>)",
            "{ variable: K, length_less_than: 4 }",
            "a.js",
            "setKey(\"abc\");\nsetKey(\"abcdef\");\n",
        );
        assert_eq!(length, vec![Some(true), Some(false)]);

        let compare = evaluate(
            "rounds($<N>)",
            "{ variable: N, less_than: 10 }",
            "a.js",
            "rounds(8);\nrounds(12);\nrounds(n);\n",
        );
        assert_eq!(compare, vec![Some(true), Some(false), None]);
    }

    #[test]
    fn test_either_and_filename() {
        let results = evaluate(
            "log($<X>)",
            "either: [ { filename_regex: 'test' }, { variable: X, values: [secret] } ]",
            "src/app.js",
            "log(secret);\nlog(other);\n",
        );
        assert_eq!(results, vec![Some(true), Some(false)]);
    }

    #[test]
    fn test_detection_delegates_to_rule_scan() {
        let source = "log(req.body);\nlog(status);\n";
        let scan = TextScan { needle: "req" };
        let results = evaluate_with(
            "log($<X>)",
            "{ variable: X, detection: known }",
            "a.js",
            source,
            Some(&scan),
        );
        assert_eq!(results, vec![Some(true), Some(false)]);

        let other = evaluate_with(
            "log($<X>)",
            "not: { variable: X, detection: missing }",
            "a.js",
            source,
            Some(&scan),
        );
        assert_eq!(other, vec![Some(true), Some(true)]);

        let unscanned = evaluate("log($<X>)", "{ variable: X, detection: known }", "a.js", source);
        assert_eq!(unscanned, vec![None, None]);
    }

    #[test]
    fn test_detection_references_are_collected() {
        let compiled = compile(&JavaScriptAdapter::new(), "r", "log($<X>)").unwrap();
        let filter = Filter::compile(
            "r",
            &compiled,
            &definition("either: [ { variable: X, detection: a }, { not: { variable: X, detection: b } } ]"),
        )
        .unwrap();
        assert_eq!(filter.referenced_rules(), vec!["a", "b"]);

        let err = Filter::compile("r", &compiled, &definition("{ detection: a }")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFilter { .. }));
    }

    #[test]
    fn test_unknown_variable_is_rejected() {
        let compiled = compile(&JavaScriptAdapter::new(), "r", "log($<X>)").unwrap();
        let err = Filter::compile("r", &compiled, &definition("{ variable: Y, values: [a] }"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVariable { variable, .. } if variable == "Y"));
    }

    #[test]
    fn test_two_conditions_are_rejected() {
        let compiled = compile(&JavaScriptAdapter::new(), "r", "log($<X>)").unwrap();
        let err = Filter::compile(
            "r",
            &compiled,
            &definition("{ variable: X, values: [a], regex: b }"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFilter { .. }));
    }
}
