//! # Configuration Module
//!
//! @title Scan Configuration
//! @author Ramprasad
//!
//! Optional TOML configuration for a scan. Values come from three layers,
//! highest first: command-line flags, the config file, built-in defaults.
//!
//! ## File Format
//!
//! ```toml
//! max_depth = 512
//! max_nodes = 250000
//! classification_depth = 1
//! max_file_bytes = 2097152
//! jobs = 4
//! exclude = ["**/*.min.js", "tests/**"]
//! rules = "rules/"
//! catalog = "catalog.yaml"
//! ```
//!
//! Relative `rules` and `catalog` paths resolve against the directory of
//! the config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisLimits;
use crate::error::ConfigError;

/// File looked up in the scanned directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "leak-sentinel.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Recursion cap per file.
    pub max_depth: usize,
    /// Node cap per file.
    pub max_nodes: usize,
    /// Nested object levels inspected by the classifier. 1 means first-level
    /// properties only.
    pub classification_depth: usize,
    /// Larger files are skipped.
    pub max_file_bytes: u64,
    /// Worker threads. Defaults to one per core.
    pub jobs: Option<usize>,
    /// Glob patterns of paths to leave out, relative to the scanned root.
    pub exclude: Vec<String>,
    /// Rule file or directory replacing the built-in rules.
    pub rules: Option<PathBuf>,
    /// Catalog file replacing the built-in catalog.
    pub catalog: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let limits = AnalysisLimits::default();
        Self {
            max_depth: limits.max_depth,
            max_nodes: limits.max_nodes,
            classification_depth: 1,
            max_file_bytes: 2 * 1024 * 1024,
            jobs: None,
            exclude: Vec::new(),
            rules: None,
            catalog: None,
        }
    }
}

/// Values given on the command line. `None` and empty lists leave the
/// config file's value in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub rules: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub exclude: Vec<String>,
}

impl ScanConfig {
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Toml {
            origin: origin.to_string(),
            source,
        })
    }

    /// Loads a config file, resolving relative paths against its directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text, &path.display().to_string())?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.rules = config.rules.map(|p| base.join(p));
        config.catalog = config.catalog.map(|p| base.join(p));

        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Finds the configuration for a scan of `root`.
    ///
    /// # Arguments
    ///
    /// * `explicit` - Path given with `--config`; must exist
    /// * `root` - Scanned file or directory
    ///
    /// # Returns
    ///
    /// The explicit file, else `leak-sentinel.toml` in `root` when present,
    /// else the defaults.
    pub fn discover(explicit: Option<&Path>, root: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let directory = if root.is_dir() {
            root
        } else {
            root.parent().unwrap_or_else(|| Path::new("."))
        };
        let candidate = directory.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            log::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, directory.display());
            Ok(Self::default())
        }
    }

    /// Applies command-line values on top of this config.
    pub fn merge(mut self, overrides: ConfigOverrides) -> Self {
        if overrides.rules.is_some() {
            self.rules = overrides.rules;
        }
        if overrides.catalog.is_some() {
            self.catalog = overrides.catalog;
        }
        if overrides.jobs.is_some() {
            self.jobs = overrides.jobs;
        }
        if !overrides.exclude.is_empty() {
            self.exclude = overrides.exclude;
        }
        self
    }

    pub fn limits(&self) -> AnalysisLimits {
        AnalysisLimits {
            max_depth: self.max_depth,
            max_nodes: self.max_nodes,
        }
    }

    /// Compiles the `exclude` globs.
    pub fn exclude_patterns(&self) -> Result<Vec<glob::Pattern>, ConfigError> {
        self.exclude
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|e| ConfigError::InvalidGlob {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }
}
