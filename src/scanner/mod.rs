//! # Scanner Module
//!
//! @title Parallel File Scanner
//! @author Ramprasad
//!
//! Discovers source files under a root, analyzes each one on a rayon worker
//! and collects the detections. A file that fails (parse failure, resource
//! cap, unreadable, too large) is recorded as skipped and never stops the
//! scan.
//!
//! ## Ordering
//!
//! Results are sorted by file path; detections inside a file are already in
//! source order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::classification::{Catalog, Classifier};
use crate::config::ScanConfig;
use crate::detectors::{Detection, DetectorRegistry, RuleSet};
use crate::error::{AnalysisError, ConfigError};
use crate::parser::AdapterRegistry;
use crate::report::SkippedFile;

/// Stack size of worker threads. Parsers recurse once per nesting level,
/// up to `max_depth` levels.
pub const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Directories never descended into.
const IGNORED_DIRECTORIES: &[&str] = &[".git", "target"];

/// Detections of one analyzed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetections {
    pub path: String,
    pub detections: Vec<Detection>,
}

/// Outcome of a scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub root: PathBuf,
    pub files: Vec<FileDetections>,
    pub skipped: Vec<SkippedFile>,
    pub duration: Duration,
}

impl ScanResult {
    pub fn files_analyzed(&self) -> usize {
        self.files.len()
    }

    pub fn detections(&self) -> impl Iterator<Item = &Detection> {
        self.files.iter().flat_map(|f| f.detections.iter())
    }

    pub fn detection_count(&self) -> usize {
        self.files.iter().map(|f| f.detections.len()).sum()
    }
}

/// Loads rules and catalog as configured and builds the detector registry.
///
/// # Arguments
///
/// * `config` - Scan configuration; `rules` and `catalog` override the
///   built-in files
/// * `only` - Rule ids to keep; empty keeps every rule
/// * `exclude` - Rule ids to drop
///
/// # Errors
///
/// Any [`ConfigError`] from loading rules or the catalog. Nothing has been
/// analyzed when this fails.
pub fn load_registry(
    config: &ScanConfig,
    only: &[String],
    exclude: &[String],
) -> Result<DetectorRegistry, ConfigError> {
    let adapters = AdapterRegistry::with_limits(config.limits());

    let mut rules = match &config.rules {
        Some(path) => RuleSet::load(path, &adapters)?,
        None => RuleSet::builtin(&adapters)?,
    };
    rules.select(only, exclude);

    let catalog = match &config.catalog {
        Some(path) => Catalog::load(path)?,
        None => Catalog::builtin()?,
    };
    log::info!(
        "Using {} rules and {} data types",
        rules.len(),
        catalog.len()
    );

    let classifier = Classifier::new(Arc::new(catalog), config.classification_depth);
    Ok(DetectorRegistry::new(
        adapters,
        Arc::new(rules),
        Arc::new(classifier),
        config.limits(),
    ))
}

/// Walks a directory tree and analyzes every supported file in parallel.
pub struct Scanner {
    registry: Arc<DetectorRegistry>,
    config: Arc<ScanConfig>,
    excludes: Vec<glob::Pattern>,
    pool: rayon::ThreadPool,
}

impl Scanner {
    /// Creates a scanner.
    ///
    /// Workers run on a dedicated thread pool with [`WORKER_STACK_SIZE`]
    /// stacks, sized by `config.jobs` or one thread per core.
    ///
    /// # Errors
    ///
    /// Invalid exclude globs, or a thread pool that fails to start.
    pub fn new(registry: DetectorRegistry, config: ScanConfig) -> Result<Self, ConfigError> {
        let excludes = config.exclude_patterns()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs.unwrap_or(0))
            .stack_size(WORKER_STACK_SIZE)
            .thread_name(|i| format!("leak-sentinel-{}", i))
            .build()
            .map_err(|e| ConfigError::WorkerPool(e.to_string()))?;
        Ok(Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
            excludes,
            pool,
        })
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Supported, non-excluded files under `root`, sorted by path.
    ///
    /// A `root` that is itself a file is returned as is, so an unsupported
    /// file given explicitly shows up as skipped rather than vanishing.
    pub fn discover(&self, root: &Path) -> Vec<PathBuf> {
        if root.is_file() {
            return vec![root.to_path_buf()];
        }

        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_ignored_directory(entry))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| self.registry.supports(path))
            .filter(|path| !self.is_excluded(root, path))
            .collect();
        files.sort();
        log::debug!("Discovered {} files under {}", files.len(), root.display());
        files
    }

    fn is_excluded(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        self.excludes
            .iter()
            .any(|pattern| pattern.matches_path(relative) || pattern.matches_path(path))
    }

    /// Reads and analyzes a single file.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::FileTooLarge`] above `max_file_bytes`, I/O failures,
    /// and every per-file error of the analysis itself.
    pub fn scan_file(&self, path: &Path) -> Result<FileDetections, AnalysisError> {
        let io_error = |source: std::io::Error| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        };
        let size = std::fs::metadata(path).map_err(io_error)?.len();
        if size > self.config.max_file_bytes {
            return Err(AnalysisError::FileTooLarge {
                size,
                limit: self.config.max_file_bytes,
            });
        }
        let source = std::fs::read_to_string(path).map_err(io_error)?;

        let display = path.display().to_string();
        let detections = self.registry.detect_source(&display, &source)?;
        Ok(FileDetections {
            path: display,
            detections,
        })
    }

    /// Scans everything under `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - File or directory to scan
    /// * `on_file` - Called from worker threads after each file
    pub fn scan<F>(&self, root: &Path, on_file: F) -> ScanResult
    where
        F: Fn(&Path) + Sync,
    {
        let files = self.discover(root);
        self.scan_files(root, &files, on_file)
    }

    /// Scans an already discovered file list, such as the output of
    /// [`Scanner::discover`].
    pub fn scan_files<F>(&self, root: &Path, files: &[PathBuf], on_file: F) -> ScanResult
    where
        F: Fn(&Path) + Sync,
    {
        let started = Instant::now();
        let run = || -> Vec<(PathBuf, Result<FileDetections, AnalysisError>)> {
            files
                .par_iter()
                .map(|path| {
                    let outcome = self.scan_file(path);
                    on_file(path);
                    (path.clone(), outcome)
                })
                .collect()
        };
        let outcomes = self.pool.install(run);

        let mut analyzed = Vec::new();
        let mut skipped = Vec::new();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(file) => analyzed.push(file),
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    skipped.push(SkippedFile {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        analyzed.sort_by(|a, b| a.path.cmp(&b.path));
        skipped.sort_by(|a, b| a.path.cmp(&b.path));

        let result = ScanResult {
            root: root.to_path_buf(),
            files: analyzed,
            skipped,
            duration: started.elapsed(),
        };
        log::info!(
            "Scanned {} files ({} skipped), {} detections in {:.2?}",
            result.files_analyzed(),
            result.skipped.len(),
            result.detection_count(),
            result.duration
        );
        result
    }
}

fn is_ignored_directory(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRECTORIES.contains(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scanner(config: ScanConfig) -> Scanner {
        let registry = load_registry(&config, &[], &[]).unwrap();
        Scanner::new(registry, config).unwrap()
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_discover_filters_extensions_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.js", "a();");
        write(dir.path(), "b.rs", "fn main() {}");
        write(dir.path(), "notes.md", "# notes");
        write(dir.path(), "dist/bundle.min.js", "x();");
        write(dir.path(), "target/debug/gen.rs", "fn x() {}");

        let config = ScanConfig {
            exclude: vec!["dist/**".to_string()],
            ..Default::default()
        };
        let files = scanner(config).discover(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.js", "b.rs"]);
    }

    #[test]
    fn test_oversized_and_budget_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "leak.js", "user.email = \"a@b.com\";\nlogger.info(user);\n");
        let big = "a(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16);\n".repeat(50);
        write(dir.path(), "huge.js", &big);

        let config = ScanConfig {
            max_nodes: 200,
            ..Default::default()
        };
        let counter = AtomicUsize::new(0);
        let result = scanner(config).scan(dir.path(), |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(counter.load(Ordering::Relaxed), 2);
        assert_eq!(result.files_analyzed(), 1);
        assert_eq!(result.detection_count(), 1);
        assert_eq!(result.skipped.len(), 1);
        assert!(result.skipped[0].path.ends_with("huge.js"));
        assert!(result.skipped[0].reason.contains("node budget"));
    }

    #[test]
    fn test_deeply_nested_rust_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "leak.js", "user.email = \"a@b.com\";\nlogger.info(user);\n");
        let nested = format!(
            "fn main() {{\n    let x = {}1{};\n}}\n",
            "(".repeat(5000),
            ")".repeat(5000)
        );
        write(dir.path(), "deep.rs", &nested);

        let result = scanner(ScanConfig::default()).scan(dir.path(), |_| {});

        assert_eq!(result.files_analyzed(), 1);
        assert_eq!(result.detection_count(), 1);
        assert_eq!(result.skipped.len(), 1);
        assert!(result.skipped[0].path.ends_with("deep.rs"));
        assert!(result.skipped[0].reason.contains("recursion limit of 512"));
    }

    #[test]
    fn test_file_size_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.js", "logger.info(user.email);\n");
        let config = ScanConfig {
            max_file_bytes: 4,
            ..Default::default()
        };
        let err = scanner(config).scan_file(&path).unwrap_err();
        assert!(matches!(err, AnalysisError::FileTooLarge { limit: 4, .. }));
    }

    #[test]
    fn test_dedicated_pool_gives_same_results() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..6 {
            write(
                dir.path(),
                &format!("f{}.js", i),
                "const user = { email: e };\nconsole.log(user);\n",
            );
        }
        let default = scanner(ScanConfig::default()).scan(dir.path(), |_| {});
        let pooled = scanner(ScanConfig {
            jobs: Some(2),
            ..Default::default()
        })
        .scan(dir.path(), |_| {});
        assert_eq!(default.files, pooled.files);
        assert_eq!(default.detection_count(), 6);
    }

    #[test]
    fn test_rule_selection() {
        let registry = load_registry(
            &ScanConfig::default(),
            &["javascript_insecure_http".to_string()],
            &[],
        )
        .unwrap();
        assert_eq!(registry.rules().len(), 1);
    }
}
