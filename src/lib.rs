//! # Leak-Sentinel Library
//!
//! @title Leak-Sentinel - Sensitive Data Leak Scanner
//! @author Ramprasad
//!
//! A static analysis library that traces personal and secret data through
//! JavaScript and Rust source code into loggers, HTTP clients, analytics
//! SDKs and browser storage.
//!
//! Each file is parsed into a language-neutral tree, resolved into a
//! semantic model (scopes, object shapes, property chains), matched against
//! declarative rules and classified against a catalog of data types.
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions and argument parsing
//! - [`parser`] - Syntax adapters producing the language-neutral tree
//! - [`analysis`] - Scopes, shapes and chains over a tree
//! - [`patterns`] - Rule pattern compilation, matching and filters
//! - [`classification`] - Data type catalog and classifier
//! - [`detectors`] - Rule loading, detection aggregation and grading
//! - [`scanner`] - Directory walking and the parallel per-file driver
//! - [`config`] - TOML scan configuration
//! - [`report`] - Report generation in multiple formats
//!
//! ## Example
//!
//! ```rust,ignore
//! use leak_sentinel::{DetectorRegistry, SeverityPolicy};
//!
//! let registry = DetectorRegistry::with_defaults()?;
//! let detections = registry.detect_source("app.js", "logger.info(user.email);")?;
//! let findings = registry.evaluate(&SeverityPolicy::default(), &detections);
//! ```

pub mod analysis;
pub mod classification;
pub mod cli;
pub mod config;
pub mod detectors;
pub mod error;
pub mod parser;
pub mod patterns;
pub mod report;
pub mod scanner;

pub use cli::Cli;
pub use config::ScanConfig;
pub use detectors::{Detection, DetectorRegistry, RiskEvaluator, SeverityPolicy};
pub use parser::AnalysisContext;
pub use report::{Finding, Report, Severity};
pub use scanner::Scanner;
