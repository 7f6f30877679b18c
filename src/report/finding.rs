//! # Finding and Severity Definitions
//!
//! @title Leak Finding Records
//! @author Ramprasad
//!
//! A [`Finding`] is one graded detection: where sensitive data reached a
//! sink, which data types it carried, and how urgent the leak is.

use colored::*;
use serde::{Deserialize, Serialize};

use crate::detectors::DataTypeDetection;

/// How urgent a leak is. Each rule sets the severity of its findings.
///
/// Variants compare by urgency, so `--severity` keeps every finding at or
/// above the requested level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Nothing sensitive reached a sink.
    Info = 0,

    /// Transport hygiene, such as a plain HTTP endpoint.
    Low = 1,

    /// Personal data sent to a sink the application controls.
    Medium = 2,

    /// Personal data sent to logs, analytics or a third party.
    High = 3,

    /// Secrets, credentials or health and financial data leaving the process.
    Critical = 4,
}

impl Severity {
    /// Reads a `--severity` value. Case is ignored and anything unrecognized
    /// reads as `Info`, which keeps every finding.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Info,
        }
    }

    /// Badge printed in front of each finding in the terminal report.
    pub fn colored_label(&self) -> ColoredString {
        match self {
            Severity::Critical => "CRITICAL".white().on_red().bold(),
            Severity::High => "HIGH".black().on_yellow().bold(),
            Severity::Medium => "MEDIUM".white().on_bright_blue().bold(),
            Severity::Low => "LOW".black().on_white().bold(),
            Severity::Info => "INFO".black().on_bright_white(),
        }
    }

    /// GitHub Actions annotation level.
    pub fn annotation_level(&self) -> &'static str {
        match self {
            Severity::Critical | Severity::High => "error",
            Severity::Medium => "warning",
            Severity::Low | Severity::Info => "notice",
        }
    }

    /// Shields badge used in the Markdown report.
    pub fn markdown_badge(&self) -> &'static str {
        match self {
            Severity::Critical => {
                "![Critical](https://img.shields.io/badge/severity-CRITICAL-red)"
            }
            Severity::High => "![High](https://img.shields.io/badge/severity-HIGH-orange)",
            Severity::Medium => "![Medium](https://img.shields.io/badge/severity-MEDIUM-yellow)",
            Severity::Low => "![Low](https://img.shields.io/badge/severity-LOW-blue)",
            Severity::Info => "![Info](https://img.shields.io/badge/severity-INFO-lightgrey)",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::High => write!(f, "High"),
            Severity::Medium => write!(f, "Medium"),
            Severity::Low => write!(f, "Low"),
            Severity::Info => write!(f, "Info"),
        }
    }
}

/// A graded detection, ready for reporting.
///
/// Contains all information needed to understand, locate, and remediate
/// a sensitive data leak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Stable identifier for this finding instance.
    pub id: String,

    /// ID of the rule that produced this finding (e.g., "javascript_logger_leak").
    pub rule_id: String,

    /// Short, descriptive title of the finding.
    pub title: String,

    /// Rule description followed by the data types found.
    pub description: String,

    /// Severity classification.
    pub severity: Severity,

    /// Path to the file containing the leak.
    pub file_path: String,

    /// Line number of the match node.
    pub line: usize,

    /// Column number of the match node.
    pub column: usize,

    /// Enclosing class or impl name, or the matched code.
    pub location: String,

    /// Statement around the match.
    pub code_snippet: Option<String>,

    /// Remediation guidance for fixing the leak.
    pub remediation: String,

    /// CWE (Common Weakness Enumeration) identifier if applicable.
    pub cwe: Option<String>,

    /// Sensitive data types carried by the matched value.
    #[serde(default)]
    pub data_types: Vec<DataTypeDetection>,
}

impl Finding {
    /// Prints the finding to terminal with color formatting.
    ///
    /// # Arguments
    ///
    /// * `index` - The finding number for display.
    pub fn print_terminal(&self, index: usize) {
        println!();
        println!(
            "{} {} [{}] {}",
            format!("#{}", index).cyan().bold(),
            self.severity.colored_label(),
            self.rule_id.yellow(),
            self.title.white().bold()
        );

        println!(
            "   {} {}:{}:{} ({})",
            "Location:".dimmed(),
            self.file_path.blue(),
            self.line.to_string().cyan(),
            self.column.to_string().cyan(),
            self.location.dimmed()
        );

        for line in self.description.lines() {
            println!("   {}", line.dimmed());
        }

        if let Some(ref snippet) = self.code_snippet {
            println!("\n   {}", "Code:".yellow());
            for line in snippet.lines() {
                println!("   {}", line.bright_white());
            }
        }

        if let Some(ref cwe) = self.cwe {
            println!("   {} {}", "Reference:".dimmed(), cwe.blue());
        }

        println!("\n   {}", "Remediation:".green());
        for line in self.remediation.lines().take(3) {
            println!("   {}", line.green().dimmed());
        }

        println!("{}", "-".repeat(60).dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!(Severity::from_str("critical"), Severity::Critical);
        assert_eq!(Severity::from_str("HIGH"), Severity::High);
        assert_eq!(Severity::from_str("unknown"), Severity::Info);
    }

    #[test]
    fn test_severity_deserializes_lowercase() {
        let severity: Severity = serde_yaml::from_str("medium").unwrap();
        assert_eq!(severity, Severity::Medium);
        assert_eq!(Severity::High.annotation_level(), "error");
    }
}
