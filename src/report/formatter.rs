//! # Report Formatters
//!
//! @title Markdown and CI Output
//! @author Ramprasad
//!
//! Renders a [`Report`] as a Markdown document through a Handlebars
//! template, and as GitHub Actions workflow commands.

use handlebars::Handlebars;
use serde::Serialize;

use super::{Finding, Report, SkippedFile};
use crate::detectors::describe_data_types;

/// Markdown report layout.
pub const MARKDOWN_TEMPLATE: &str = r#"# Leak-Sentinel Report

| | |
|---|---|
| Scanned path | `{{metadata.scanned_path}}` |
| Version | {{metadata.version}} |
| Timestamp | {{metadata.timestamp}} |
| Files analyzed | {{metadata.files_analyzed}} |
| Rules | {{metadata.rules_loaded}} |

## Summary

| Critical | High | Medium | Low | Info | Total |
|---|---|---|---|---|---|
| {{summary.critical}} | {{summary.high}} | {{summary.medium}} | {{summary.low}} | {{summary.info}} | {{summary.total}} |

{{#if findings}}
## Findings
{{#each findings}}

### {{number}}. {{title}}

{{badge}} `{{rule_id}}`{{#if cwe}} ({{cwe}}){{/if}}

**Location:** `{{file_path}}:{{line}}:{{column}}`

{{#if data_types}}
**Data types:** {{data_types}}

{{/if}}
{{description}}

{{#if code_snippet}}
```{{language}}
{{code_snippet}}
```

{{/if}}
**Remediation:** {{remediation}}
{{/each}}
{{else}}
No sensitive data leaks found.
{{/if}}
{{#if skipped}}

## Skipped Files

| File | Reason |
|---|---|
{{#each skipped}}
| `{{path}}` | {{reason}} |
{{/each}}
{{/if}}
"#;

#[derive(Debug, Serialize)]
struct MarkdownData<'a> {
    metadata: &'a super::ReportMetadata,
    summary: &'a super::ReportSummary,
    findings: Vec<FindingData<'a>>,
    skipped: &'a [SkippedFile],
}

/// Per-finding values precomputed for the template.
#[derive(Debug, Serialize)]
struct FindingData<'a> {
    number: usize,
    title: &'a str,
    badge: &'static str,
    rule_id: &'a str,
    cwe: Option<&'a str>,
    file_path: &'a str,
    line: usize,
    column: usize,
    description: &'a str,
    data_types: String,
    code_snippet: Option<&'a str>,
    language: &'static str,
    remediation: String,
}

impl<'a> FindingData<'a> {
    fn new(number: usize, finding: &'a Finding) -> Self {
        let description = finding
            .description
            .split("\nData types:")
            .next()
            .unwrap_or(&finding.description);
        Self {
            number,
            title: &finding.title,
            badge: finding.severity.markdown_badge(),
            rule_id: &finding.rule_id,
            cwe: finding.cwe.as_deref(),
            file_path: &finding.file_path,
            line: finding.line,
            column: finding.column,
            description,
            data_types: describe_data_types(&finding.data_types),
            code_snippet: finding.code_snippet.as_deref(),
            language: fence_language(&finding.file_path),
            remediation: finding.remediation.trim().replace('\n', " "),
        }
    }
}

fn fence_language(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("rs") => "rust",
        Some("js" | "jsx" | "mjs" | "cjs") => "javascript",
        _ => "",
    }
}

/// Renders `report` as Markdown.
///
/// # Errors
///
/// Returns a [`handlebars::RenderError`] if the template fails to render.
pub fn to_markdown(report: &Report) -> Result<String, handlebars::RenderError> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(false);
    handlebars.register_escape_fn(handlebars::no_escape);

    let data = MarkdownData {
        metadata: &report.metadata,
        summary: &report.summary,
        findings: report
            .findings
            .iter()
            .enumerate()
            .map(|(i, f)| FindingData::new(i + 1, f))
            .collect(),
        skipped: &report.skipped,
    };
    handlebars.render_template(MARKDOWN_TEMPLATE, &data)
}

/// One `::error`/`::warning`/`::notice` workflow command per finding.
///
/// Format: `::{level} file={name},line={line},col={col},title={title}::{message}`
pub fn to_github_annotations(report: &Report) -> String {
    report
        .findings
        .iter()
        .map(|finding| {
            format!(
                "::{} file={},line={},col={},title={}::{}",
                finding.severity.annotation_level(),
                escape_property(&finding.file_path),
                finding.line,
                finding.column,
                escape_property(&format!("{} [{}]", finding.title, finding.rule_id)),
                escape_data(&finding.description)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escaping for the message part of a workflow command.
fn escape_data(text: &str) -> String {
    text.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Escaping for `key=value` properties of a workflow command.
fn escape_property(text: &str) -> String {
    escape_data(text).replace(':', "%3A").replace(',', "%2C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_finding;
    use crate::report::Severity;
    use std::path::Path;

    fn report() -> Report {
        Report::new(
            vec![sample_finding(Severity::High)],
            Path::new("./app"),
            1,
            8,
            vec![SkippedFile {
                path: "big.js".to_string(),
                reason: "file is 9 bytes, limit is 1".to_string(),
            }],
        )
    }

    #[test]
    fn test_markdown_lists_findings_and_skipped_files() {
        let markdown = to_markdown(&report()).unwrap();
        assert!(markdown.contains("### 1. Sensitive data sent to a logger"));
        assert!(markdown.contains("`src/app.js:10:3`"));
        assert!(markdown.contains("```javascript"));
        assert!(markdown.contains("| `big.js` |"));
        assert!(!markdown.contains("No sensitive data leaks found."));
    }

    #[test]
    fn test_markdown_without_findings() {
        let empty = Report::new(Vec::new(), Path::new("."), 0, 8, Vec::new());
        let markdown = to_markdown(&empty).unwrap();
        assert!(markdown.contains("No sensitive data leaks found."));
        assert!(!markdown.contains("Skipped Files"));
    }

    #[test]
    fn test_github_annotations_escape_newlines() {
        let annotations = to_github_annotations(&report());
        assert!(annotations.starts_with("::error file=src/app.js,line=10,col=3,"));
        assert!(annotations.contains("Logs personal data%0AData types"));
        assert_eq!(annotations.lines().count(), 1);
    }
}
