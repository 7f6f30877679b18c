//! # CLI Module
//!
//! @title Command Line Interface
//! @author Ramprasad
//!
//! This module defines the command-line interface for Leak-Sentinel using
//! the `clap` derive macros for declarative argument parsing.
//!
//! ## Commands
//!
//! - `scan` - Trace sensitive data into loggers, HTTP clients and other sinks
//! - `rules` - Display the loaded detection rules
//! - `diff` - Compare findings between two versions of a codebase
//! - `version` - Show version information

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Leak-Sentinel command-line interface.
///
/// A static analysis scanner that finds personal and secret data flowing
/// into logs, HTTP requests, analytics SDKs and browser storage.
#[derive(Parser, Debug)]
#[command(name = "leak-sentinel")]
#[command(author = "RamprasadGoud")]
#[command(version)]
#[command(about = "Static analysis scanner for sensitive data leaks in JavaScript and Rust")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output formats of `scan`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Colorized console output
    Terminal,
    /// The report as JSON
    Json,
    /// The report as a Markdown document
    Markdown,
    /// GitHub Actions annotations
    Github,
    /// Raw per-file detections as JSON, before grading
    Detections,
}

/// Rule and configuration sources shared by `scan` and `diff`.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Rule file or directory replacing the built-in rules.
    #[arg(long, value_name = "PATH")]
    pub rules: Option<PathBuf>,

    /// Data type catalog replacing the built-in catalog.
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Configuration file.
    ///
    /// Defaults to `leak-sentinel.toml` in the scanned directory when present.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Exclude specific rules from the scan.
    ///
    /// Comma-separated list of rule IDs to skip.
    /// Example: --exclude javascript_insecure_http
    #[arg(short = 'x', long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Include only specific rules in the scan.
    ///
    /// Comma-separated list of rule IDs to run.
    /// Example: --only javascript_logger_leak,rust_logger_leak
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Number of worker threads.
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

/// Arguments of `scan`.
#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Path to the file or directory to scan.
    ///
    /// Directories are searched recursively for `.js`, `.jsx`, `.mjs`,
    /// `.cjs` and `.rs` files.
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Output format for the report.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Terminal)]
    pub format: OutputFormat,

    /// Output directory for the report.
    ///
    /// If not specified, the report is printed to stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Minimum severity level to include in results.
    ///
    /// Valid values: critical, high, medium, low, info
    #[arg(short, long)]
    pub severity: Option<String>,

    #[command(flatten)]
    pub sources: SourceArgs,
}

/// Available subcommands for the Leak-Sentinel CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan source code for sensitive data leaks.
    ///
    /// Resolves variables, object shapes and property chains per file and
    /// reports every rule sink that receives a sensitive data type.
    Scan(ScanArgs),

    /// Compare findings between two versions of a codebase.
    ///
    /// Runs a full scan on both directories and reports:
    /// - New leaks
    /// - Fixed leaks
    Diff {
        /// Path to the old version (base).
        #[arg(value_name = "OLD_PATH")]
        old_path: PathBuf,

        /// Path to the new version (target).
        #[arg(value_name = "NEW_PATH")]
        new_path: PathBuf,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// List the loaded detection rules.
    ///
    /// Displays the ID, title, severity and languages of each rule.
    Rules {
        /// Rule file or directory replacing the built-in rules.
        #[arg(long, value_name = "PATH")]
        rules: Option<PathBuf>,
    },

    /// Print version information.
    Version,
}
