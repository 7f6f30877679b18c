//! # Suppression Directives
//!
//! @title Inline Disable Comments
//! @author Ramprasad
//!
//! Collects inline `sentinel:disable` comments.
//!
//! A comment line such as
//!
//! ```text
//! // sentinel:disable javascript_logger_leak,javascript_http_leak
//! ```
//!
//! suppresses the listed rules for the statement starting on the next
//! non-blank line. With no rule list it suppresses every rule.

use std::collections::HashMap;

const DIRECTIVE: &str = "sentinel:disable";
const COMMENT_MARKERS: [&str; 4] = ["//", "/*", "*", "#"];

#[derive(Debug, Clone, Default)]
pub struct Suppressions {
    /// Target line to the rule ids it suppresses. An empty list means all rules.
    lines: HashMap<usize, Vec<String>>,
}

impl Suppressions {
    pub fn scan(source: &str) -> Self {
        let lines: Vec<&str> = source.lines().collect();
        let mut suppressions = HashMap::new();

        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            if !COMMENT_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
                continue;
            }
            let Some(position) = trimmed.find(DIRECTIVE) else {
                continue;
            };
            let rules: Vec<String> = trimmed[position + DIRECTIVE.len()..]
                .trim_end_matches("*/")
                .split([',', ' '])
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();

            let target = lines
                .iter()
                .enumerate()
                .skip(i + 1)
                .find(|(_, l)| !l.trim().is_empty())
                .map(|(j, _)| j + 1);
            if let Some(target) = target {
                suppressions.insert(target, rules);
            }
        }

        Self {
            lines: suppressions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// True when a statement starting on `line` is suppressed for `rule_id`.
    pub fn covers(&self, line: usize, rule_id: &str) -> bool {
        match self.lines.get(&line) {
            Some(rules) => rules.is_empty() || rules.iter().any(|r| r == rule_id),
            None => false,
        }
    }
}
