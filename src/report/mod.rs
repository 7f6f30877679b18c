//! # Report Generation Module
//!
//! @title Leak Report Generator
//! @author Ramprasad
//!
//! Generates scan reports in multiple formats: terminal output, Markdown
//! documents, JSON, and GitHub Actions annotations for CI/CD integration.
//!
//! ## Key Types
//!
//! - [`Report`] - Complete scan report
//! - [`Finding`] - Individual leak finding
//! - [`Severity`] - Severity classification for findings
//! - [`SkippedFile`] - A file the scan could not analyze

mod finding;
mod formatter;

pub use finding::{Finding, Severity};
pub use formatter::*;

use colored::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete scan report.
///
/// Contains metadata about the scan, all findings, summary statistics and
/// the files that were skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Metadata about the scan operation.
    pub metadata: ReportMetadata,

    /// All findings from the analysis.
    pub findings: Vec<Finding>,

    /// Summary statistics by severity.
    pub summary: ReportSummary,

    /// Files that could not be analyzed, with the reason.
    #[serde(default)]
    pub skipped: Vec<SkippedFile>,
}

/// Metadata about the scan operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Tool version used for the scan.
    pub version: String,

    /// Timestamp when the scan was performed.
    pub timestamp: String,

    /// Path that was scanned.
    pub scanned_path: String,

    /// Number of files analyzed.
    pub files_analyzed: usize,

    /// Number of rules that ran.
    pub rules_loaded: usize,
}

/// Summary of findings by severity level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Count of critical severity findings.
    pub critical: usize,

    /// Count of high severity findings.
    pub high: usize,

    /// Count of medium severity findings.
    pub medium: usize,

    /// Count of low severity findings.
    pub low: usize,

    /// Count of informational findings.
    pub info: usize,

    /// Total count of all findings.
    pub total: usize,
}

/// A file left out of the report because its analysis failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

impl Report {
    /// Creates a new report from a collection of findings.
    ///
    /// Automatically calculates summary statistics from the findings.
    ///
    /// # Arguments
    ///
    /// * `findings` - Vector of graded findings
    /// * `scanned_path` - Path that was analyzed
    /// * `files_analyzed` - Number of files that produced a result
    /// * `rules_loaded` - Number of rules that ran
    /// * `skipped` - Files whose analysis failed
    ///
    /// # Returns
    ///
    /// A fully populated `Report` instance.
    pub fn new(
        findings: Vec<Finding>,
        scanned_path: &Path,
        files_analyzed: usize,
        rules_loaded: usize,
        skipped: Vec<SkippedFile>,
    ) -> Self {
        let summary = ReportSummary::from_findings(&findings);

        let metadata = ReportMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono_lite_timestamp(),
            scanned_path: scanned_path.display().to_string(),
            files_analyzed,
            rules_loaded,
        };

        Self {
            metadata,
            findings,
            summary,
            skipped,
        }
    }

    /// Prints colorized output to the terminal.
    ///
    /// Displays each finding with appropriate color coding based on severity.
    pub fn print_terminal(&self) {
        if !self.skipped.is_empty() {
            println!("\n{}", "[~] Skipped files:".yellow().bold());
            for skipped in &self.skipped {
                println!("    {} {}", skipped.path.yellow(), skipped.reason.dimmed());
            }
        }

        if self.findings.is_empty() {
            println!("\n{}", "[+] No sensitive data leaks found.".green().bold());
            return;
        }

        println!("\n{}", "[!] Leak Findings:".red().bold());
        println!("{}", "=".repeat(60).cyan());

        for (i, finding) in self.findings.iter().enumerate() {
            finding.print_terminal(i + 1);
        }
    }

    /// Prints summary statistics to the terminal.
    pub fn print_summary(&self) {
        println!(
            "{}",
            format!(
                "[*] Summary: {} Critical | {} High | {} Medium | {} Low | {} Info",
                self.summary.critical,
                self.summary.high,
                self.summary.medium,
                self.summary.low,
                self.summary.info
            )
            .bold()
        );
        println!(
            "{}",
            format!(
                "[*] {} file(s) analyzed, {} skipped, {} rule(s)",
                self.metadata.files_analyzed,
                self.skipped.len(),
                self.metadata.rules_loaded
            )
            .dimmed()
        );

        if self.summary.total == 0 {
            println!("{}", "[+] No issues found.".green().bold());
        } else {
            let message = format!("[!] Total: {} issue(s) found", self.summary.total);
            if self.summary.critical > 0 {
                println!("{}", message.red().bold());
            } else if self.summary.high > 0 {
                println!("{}", message.yellow().bold());
            } else {
                println!("{}", message.blue().bold());
            }
        }
    }

    /// Converts the report to Markdown format.
    ///
    /// # Errors
    ///
    /// Returns an error if the template fails to render.
    pub fn to_markdown(&self) -> Result<String, handlebars::RenderError> {
        formatter::to_markdown(self)
    }

    /// Converts the report to GitHub Actions workflow commands.
    pub fn to_github_annotations(&self) -> String {
        formatter::to_github_annotations(self)
    }

    /// Keeps findings at or above `minimum`, recomputing the summary.
    pub fn retain_min_severity(&mut self, minimum: Severity) {
        self.findings.retain(|f| f.severity >= minimum);
        self.summary = ReportSummary::from_findings(&self.findings);
    }
}

impl ReportSummary {
    /// Creates a summary from a collection of findings.
    fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = ReportSummary {
            total: findings.len(),
            ..Default::default()
        };

        for finding in findings {
            match finding.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
            }
        }

        summary
    }
}

/// Generates a simple timestamp without external dependencies.
fn chrono_lite_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    format!("{}", duration.as_secs())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_finding(severity: Severity) -> Finding {
        Finding {
            id: "javascript_logger_leak-0000abcd".to_string(),
            rule_id: "javascript_logger_leak".to_string(),
            title: "Sensitive data sent to a logger".to_string(),
            description: "Logs personal data\nData types: Email Address (user.email)".to_string(),
            severity,
            file_path: "src/app.js".to_string(),
            line: 10,
            column: 3,
            location: "logger.info(user)".to_string(),
            code_snippet: Some("logger.info(user);".to_string()),
            remediation: "Log an identifier instead.".to_string(),
            cwe: Some("CWE-532".to_string()),
            data_types: Vec::new(),
        }
    }

    #[test]
    fn test_report_creation() {
        let findings = vec![sample_finding(Severity::High)];
        let skipped = vec![SkippedFile {
            path: "huge.js".to_string(),
            reason: "node budget of 10 exceeded".to_string(),
        }];

        let report = Report::new(findings, Path::new("./test"), 2, 5, skipped);

        assert_eq!(report.summary.high, 1);
        assert_eq!(report.summary.total, 1);
        assert_eq!(report.metadata.files_analyzed, 2);
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn test_min_severity_recomputes_summary() {
        let findings = vec![sample_finding(Severity::High), sample_finding(Severity::Low)];
        let mut report = Report::new(findings, Path::new("."), 1, 1, Vec::new());
        report.retain_min_severity(Severity::Medium);
        assert_eq!(report.summary.total, 1);
        assert_eq!(report.summary.low, 0);
    }

    #[test]
    fn test_report_json_lists_skipped() {
        let report = Report::new(Vec::new(), Path::new("."), 0, 0, Vec::new());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"skipped\":[]"));
    }
}
