//! # Leak-Sentinel CLI Entry Point
//!
//! @title Leak-Sentinel CLI
//! @author Ramprasad
//!
//! This module provides the main entry point for the Leak-Sentinel
//! command-line scanner. Status lines and the banner go to stderr so that
//! machine-readable formats on stdout stay clean.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use leak_sentinel::cli::{Commands, OutputFormat, ScanArgs, SourceArgs};
use leak_sentinel::config::{ConfigOverrides, ScanConfig};
use leak_sentinel::detectors::{RuleSet, SeverityPolicy};
use leak_sentinel::parser::AdapterRegistry;
use leak_sentinel::report::Finding;
use leak_sentinel::scanner::{load_registry, ScanResult};
use leak_sentinel::{Cli, Report, Scanner, Severity};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// ASCII art banner displayed at startup.
const BANNER: &str = r#"
 _               _        ____             _   _            _
| |    ___  __ _| | __   / ___|  ___ _ __ | |_(_)_ __   ___| |
| |   / _ \/ _` | |/ /   \___ \ / _ \ '_ \| __| | '_ \ / _ \ |
| |__|  __/ (_| |   <     ___) |  __/ | | | |_| | | | |  __/ |
|_____\___|\__,_|_|\_\   |____/ \___|_| |_|\__|_|_| |_|\___|_|

              Sensitive Data Leak Scanner
"#;

/// Application entry point.
///
/// Initializes the logging system, displays the banner, parses command-line
/// arguments, and dispatches to the appropriate command handler.
///
/// # Returns
///
/// Returns `Ok(())` on successful execution, or an error if any operation fails.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => {
            eprintln!("{}", BANNER.cyan().bold());
            run_scan(args)?;
        }
        Commands::Rules { rules } => {
            list_rules(rules.as_deref())?;
        }
        Commands::Version => {
            println!(
                "{} {}",
                "Leak-Sentinel version:".green(),
                env!("CARGO_PKG_VERSION").yellow()
            );
        }
        Commands::Diff {
            old_path,
            new_path,
            sources,
        } => {
            eprintln!("{}", BANNER.cyan().bold());
            run_diff(old_path, new_path, &sources)?;
        }
    }

    Ok(())
}

/// Executes the scan operation.
///
/// This function orchestrates the complete scanning workflow:
/// 1. Resolves the configuration and loads rules and catalog
/// 2. Discovers supported source files under the path
/// 3. Analyzes every file in parallel
/// 4. Grades detections into findings
/// 5. Writes the report in the requested format
///
/// # Errors
///
/// Configuration problems abort before any file is analyzed. Per-file
/// failures never abort; they are listed as skipped files.
fn run_scan(args: ScanArgs) -> Result<()> {
    eprintln!(
        "{} {}",
        "[*] Scanning:".green().bold(),
        args.path.display().to_string().yellow()
    );

    let (result, scanner) = perform_scan(&args.path, &args.sources)?;

    if args.format == OutputFormat::Detections {
        let json = serde_json::to_string_pretty(&result.files)?;
        return emit(args.output.as_deref(), "detections.json", &json);
    }

    let minimum = args
        .severity
        .as_deref()
        .map(Severity::from_str)
        .unwrap_or(Severity::Info);
    let policy = SeverityPolicy::new(minimum);
    let detections: Vec<_> = result.detections().cloned().collect();
    let findings = scanner.registry().evaluate(&policy, &detections);

    let report = Report::new(
        findings,
        &args.path,
        result.files_analyzed(),
        scanner.registry().rules().reported().count(),
        result.skipped,
    );

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)?;
            emit(args.output.as_deref(), "leak_report.json", &json)?;
        }
        OutputFormat::Markdown => {
            let markdown = report.to_markdown()?;
            emit(args.output.as_deref(), "leak_report.md", &markdown)?;
        }
        OutputFormat::Github => {
            let annotations = report.to_github_annotations();
            if !annotations.is_empty() {
                println!("{}", annotations);
            }
        }
        OutputFormat::Terminal | OutputFormat::Detections => {
            report.print_terminal();
            println!("\n{}", "=".repeat(60).cyan());
            report.print_summary();
        }
    }

    Ok(())
}

/// Writes `content` to `<dir>/<file_name>`, or to stdout without a directory.
fn emit(dir: Option<&Path>, file_name: &str, content: &str) -> Result<()> {
    match dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let path = dir.join(file_name);
            std::fs::write(&path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "{} {}",
                "[+] Report saved to:".green(),
                path.display().to_string().yellow()
            );
        }
        None => println!("{}", content),
    }
    Ok(())
}

/// Resolves configuration for `path`, then discovers and analyzes its files
/// behind a progress bar.
fn perform_scan(path: &Path, sources: &SourceArgs) -> Result<(ScanResult, Scanner)> {
    let config = ScanConfig::discover(sources.config.as_deref(), path)?.merge(ConfigOverrides {
        rules: sources.rules.clone(),
        catalog: sources.catalog.clone(),
        jobs: sources.jobs,
        exclude: Vec::new(),
    });
    let registry = load_registry(&config, &sources.only, &sources.exclude)?;
    let scanner = Scanner::new(registry, config)?;

    let files = scanner.discover(path);
    let pb = ProgressBar::new(files.len() as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("=>-");
    pb.set_style(style);
    pb.set_message("Analyzing");

    let result = scanner.scan_files(path, &files, |_| pb.inc(1));

    pb.finish_and_clear();
    Ok((result, scanner))
}

fn run_diff(old_path: PathBuf, new_path: PathBuf, sources: &SourceArgs) -> Result<()> {
    eprintln!("{}", "[*] Running Differential Analysis...".blue().bold());

    let old_abs = std::fs::canonicalize(&old_path)
        .with_context(|| format!("cannot access {}", old_path.display()))?;
    let new_abs = std::fs::canonicalize(&new_path)
        .with_context(|| format!("cannot access {}", new_path.display()))?;

    eprintln!("{} {}", "[base]".dimmed(), old_abs.display());
    let old_findings = graded_findings(&old_abs, sources)?;

    eprintln!("{} {}", "[target]".dimmed(), new_abs.display());
    let new_findings = graded_findings(&new_abs, sources)?;

    let old_map = keyed_findings(&old_findings, &old_abs);
    let new_map = keyed_findings(&new_findings, &new_abs);

    let new_risks: Vec<&Finding> = new_map
        .iter()
        .filter(|(key, _)| !old_map.contains_key(*key))
        .map(|(_, finding)| *finding)
        .collect();
    let fixed_issues: Vec<&Finding> = old_map
        .iter()
        .filter(|(key, _)| !new_map.contains_key(*key))
        .map(|(_, finding)| *finding)
        .collect();

    println!("\n{}", "=== Differential Analysis Results ===".white().bold());

    if new_risks.is_empty() && fixed_issues.is_empty() {
        println!("{}", "No leak changes detected.".green());
        return Ok(());
    }

    if !new_risks.is_empty() {
        println!("\n{}", "[NEW LEAKS DETECTED]".red().bold());
        for f in new_risks {
            println!("  [{}] {} ({}:{})", f.rule_id.red(), f.title, f.file_path, f.line);
        }
    }

    if !fixed_issues.is_empty() {
        println!("\n{}", "[LEAKS FIXED]".green().bold());
        for f in fixed_issues {
            println!("  [{}] {} ({}:{})", f.rule_id.green(), f.title, f.file_path, f.line);
        }
    }

    Ok(())
}

fn graded_findings(path: &Path, sources: &SourceArgs) -> Result<Vec<Finding>> {
    let (result, scanner) = perform_scan(path, sources)?;
    let detections: Vec<_> = result.detections().cloned().collect();
    Ok(scanner
        .registry()
        .evaluate(&SeverityPolicy::default(), &detections))
}

/// Keys findings by rule id, path relative to `base` and line.
fn keyed_findings<'f>(findings: &'f [Finding], base: &Path) -> BTreeMap<String, &'f Finding> {
    findings
        .iter()
        .map(|f| {
            let path = PathBuf::from(&f.file_path);
            let relative = pathdiff::diff_paths(&path, base).unwrap_or(path);
            (format!("{}:{}:{}", f.rule_id, relative.display(), f.line), f)
        })
        .collect()
}

/// Displays the loaded detection rules.
///
/// Prints the ID, title, severity and languages of each rule.
fn list_rules(path: Option<&Path>) -> Result<()> {
    let adapters = AdapterRegistry::new();
    let rules = match path {
        Some(path) => RuleSet::load(path, &adapters)?,
        None => RuleSet::builtin(&adapters)?,
    };

    println!("{}", "[*] Available Detection Rules:".green().bold());
    println!("{}", "-".repeat(60).cyan());

    for rule in rules.rules() {
        println!(
            "  {} {} [{}]{}",
            rule.id.cyan().bold(),
            rule.title.white(),
            format!("{:?}", rule.severity).yellow(),
            if rule.auxiliary { " (auxiliary)".dimmed().to_string() } else { String::new() }
        );
        println!("     {}", rule.languages.join(", ").dimmed());
        println!();
    }

    Ok(())
}
