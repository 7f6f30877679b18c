//! # Detector Utilities
//!
//! @title Finding Helpers
//! @author Ramprasad
//!
//! Shared helpers for turning detections into readable findings.

use std::collections::HashSet;

use super::DataTypeDetection;
use crate::report::Finding;

/// First `max_lines` lines of `content`, each trimmed on the right, with an
/// ellipsis line when something was cut.
///
/// # Example
///
/// ```rust,ignore
/// snippet("a();\nb();\nc();", 2) // "a();\nb();\n..."
/// ```
pub fn snippet(content: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut out: Vec<&str> = lines
        .iter()
        .take(max_lines.max(1))
        .map(|l| l.trim_end())
        .collect();
    if lines.len() > out.len() {
        out.push("...");
    }
    out.join("\n")
}

/// One-line summary such as `Email Address (user.email), Firstname (first_name)`.
pub fn describe_data_types(data_types: &[DataTypeDetection]) -> String {
    data_types
        .iter()
        .map(|d| {
            let field = d.field_name.as_deref().unwrap_or("?");
            match &d.object_name {
                Some(object) => format!("{} ({}.{})", d.name, object, field),
                None => format!("{} ({})", d.name, field),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Deduplicates findings that point to the same location with the same rule.
///
/// Removes duplicate findings based on file path, line, column and rule id.
///
/// # Arguments
///
/// * `findings` - Vector of findings to deduplicate
///
/// # Returns
///
/// A new vector with duplicates removed, first occurrence kept.
pub fn deduplicate_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen = HashSet::new();
    findings
        .into_iter()
        .filter(|f| {
            let key = format!("{}:{}:{}:{}", f.file_path, f.line, f.column, f.rule_id);
            seen.insert(key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{DataType, Decision, Reason};
    use crate::report::Severity;

    fn finding(rule_id: &str, line: usize) -> Finding {
        Finding {
            id: format!("{}-{}", rule_id, line),
            rule_id: rule_id.to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            severity: Severity::High,
            file_path: "a.js".to_string(),
            line,
            column: 1,
            location: "x".to_string(),
            code_snippet: None,
            remediation: String::new(),
            cwe: None,
            data_types: Vec::new(),
        }
    }

    #[test]
    fn test_snippet_truncates() {
        assert_eq!(snippet("a();  \nb();\nc();", 2), "a();\nb();\n...");
        assert_eq!(snippet("a();", 3), "a();");
    }

    #[test]
    fn test_describe_data_types() {
        let email = DataTypeDetection {
            name: "Email Address".to_string(),
            data_type: DataType {
                name: "Email Address".to_string(),
                id: "email_address".to_string(),
                category_id: "contact".to_string(),
            },
            field_name: Some("email".to_string()),
            object_name: Some("user".to_string()),
            subject_name: None,
            decision: Decision::valid(Reason::KnownPattern),
            line: 1,
            column: 1,
        };
        let mut bare = email.clone();
        bare.object_name = None;
        assert_eq!(
            describe_data_types(&[email, bare]),
            "Email Address (user.email), Email Address (email)"
        );
    }

    #[test]
    fn test_deduplicate_findings() {
        let findings = vec![finding("a", 1), finding("a", 1), finding("b", 1), finding("a", 2)];
        assert_eq!(deduplicate_findings(findings).len(), 3);
    }
}
