//! # Error Types
//!
//! @title Configuration and Analysis Errors
//! @author Ramprasad
//!
//! Two error families with very different blast radius:
//!
//! - [`ConfigError`] is raised while loading rules, the data type catalog or
//!   the scan configuration. It is always fatal and always surfaces before a
//!   single file has been analyzed.
//! - [`AnalysisError`] is raised while analyzing one file. The scanner records
//!   it as a skipped file and moves on to the next one.

use std::path::PathBuf;
use thiserror::Error;

/// Load-time configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A rule, catalog or config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A YAML document did not deserialize.
    #[error("invalid YAML in {origin}: {source}")]
    Yaml {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A JSON document did not deserialize.
    #[error("invalid JSON in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    /// A TOML config file did not deserialize.
    #[error("invalid TOML in {origin}: {source}")]
    Toml {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    /// Two rules share the same identifier.
    #[error("duplicate rule id '{0}'")]
    DuplicateRule(String),

    /// Two catalog data types share the same identifier.
    #[error("duplicate data type id '{0}'")]
    DuplicateDataType(String),

    /// A regular expression in a rule filter or catalog entry failed to compile.
    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    /// A rule pattern could not be compiled into a template.
    #[error("rule '{rule}': invalid pattern `{pattern}`: {message}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        message: String,
    },

    /// A filter or data type target names a capture the pattern never defines.
    #[error("rule '{rule}': unknown variable '{variable}'")]
    UnknownVariable { rule: String, variable: String },

    /// A filter definition carries zero or several conditions.
    #[error("rule '{rule}': {message}")]
    InvalidFilter { rule: String, message: String },

    /// A `detection` filter or `sanitizer` names a rule that is not loaded.
    #[error("rule '{rule}': references unknown rule '{reference}'")]
    UnknownRuleReference { rule: String, reference: String },

    /// Rules reference each other in a loop.
    #[error("rule '{0}' references itself through its filters or sanitizer")]
    RuleCycle(String),

    /// A rule targets a language no syntax adapter handles.
    #[error("rule '{rule}': unsupported language '{language}'")]
    UnsupportedLanguage { rule: String, language: String },

    /// A glob pattern in the exclude list is malformed.
    #[error("invalid exclude glob '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    /// The worker thread pool could not be started.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// Per-file analysis failures.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The syntax adapter could not produce a tree at all.
    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    /// No syntax adapter handles this file.
    #[error("no syntax adapter for {0}")]
    UnsupportedLanguage(String),

    /// The tree nests deeper than the configured recursion cap.
    #[error("recursion limit of {limit} exceeded")]
    DepthExceeded { limit: usize },

    /// The tree has more nodes than the configured iteration cap.
    #[error("node budget of {limit} exceeded")]
    NodeBudgetExceeded { limit: usize },

    /// The file is larger than the configured size cap.
    #[error("file is {size} bytes, limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },
}
