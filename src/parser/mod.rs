//! # Parser Module
//!
//! @title Syntax Adapters
//! @author Ramprasad
//!
//! This module turns source files into the uniform tree the analysis core
//! works on. Each supported language has one [`SyntaxAdapter`]; the core
//! never sees a language-specific node.
//!
//! ## Submodules
//!
//! - [`javascript`] - JavaScript via `tree-sitter-javascript`
//! - [`rust`] - Rust via `syn`
//!
//! ## Key Types
//!
//! - [`SyntaxAdapter`] - Trait every language adapter implements
//! - [`AdapterRegistry`] - Lookup of adapters by language name or file extension
//! - [`AnalysisContext`] - A parsed file ready for semantic analysis

mod javascript;
mod rust;

pub use javascript::JavaScriptAdapter;
pub use rust::RustAdapter;

use std::path::Path;

use crate::analysis::{AnalysisLimits, Capabilities, Tree};
use crate::error::AnalysisError;

/// Parses one language into the uniform tree.
///
/// Implementations must be stateless across calls so a single instance can
/// be shared by every worker thread.
pub trait SyntaxAdapter: Send + Sync {
    /// Language name used by rules (`javascript`, `rust`).
    fn language(&self) -> &'static str;

    /// File extensions handled, without the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Scoping behaviour of the language.
    fn capabilities(&self) -> Capabilities;

    /// Parses a whole source file.
    ///
    /// Syntax errors do not fail the parse: malformed regions are lowered to
    /// `error` nodes. An `Err` means no tree could be produced at all.
    fn parse(&self, file_path: &str, source: &str) -> Result<Tree, AnalysisError>;

    /// Parses a rule pattern snippet. Defaults to [`SyntaxAdapter::parse`].
    fn parse_pattern(&self, pattern: &str) -> Result<Tree, AnalysisError> {
        self.parse("<pattern>", pattern)
    }
}

/// All syntax adapters known to the scanner.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn SyntaxAdapter>>,
}

impl AdapterRegistry {
    /// Creates a registry with the JavaScript and Rust adapters.
    pub fn new() -> Self {
        Self::with_limits(AnalysisLimits::default())
    }

    /// Like [`AdapterRegistry::new`], with adapters that refuse files nested
    /// deeper than `limits.max_depth` before recursing into them.
    pub fn with_limits(limits: AnalysisLimits) -> Self {
        Self {
            adapters: vec![
                Box::new(JavaScriptAdapter::new()),
                Box::new(RustAdapter::with_max_depth(limits.max_depth)),
            ],
        }
    }

    pub fn adapters(&self) -> impl Iterator<Item = &dyn SyntaxAdapter> {
        self.adapters.iter().map(|a| a.as_ref())
    }

    pub fn for_language(&self, language: &str) -> Option<&dyn SyntaxAdapter> {
        let language = language.to_lowercase();
        self.adapters()
            .find(|a| a.language() == language || (language == "js" && a.language() == "javascript"))
    }

    /// Adapter for a file, chosen by extension.
    pub fn for_path(&self, path: &Path) -> Option<&dyn SyntaxAdapter> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        self.adapters()
            .find(|a| a.extensions().contains(&extension.as_str()))
    }

    pub fn languages(&self) -> Vec<&'static str> {
        self.adapters().map(|a| a.language()).collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed source file.
///
/// # Example
///
/// ```rust,ignore
/// let adapter = JavaScriptAdapter::new();
/// let context = AnalysisContext::from_source(&adapter, "app.js", source)?;
/// println!("{} nodes", context.tree.len());
/// ```
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    /// Path of the source file as given to the scanner.
    pub file_path: String,

    /// Language name of the adapter that parsed the file.
    pub language: String,

    /// Scoping behaviour of that language.
    pub capabilities: Capabilities,

    /// Uniform tree, which also owns the source text.
    pub tree: Tree,
}

impl AnalysisContext {
    /// Parses `source_code` with `adapter`.
    ///
    /// # Arguments
    ///
    /// * `adapter` - Syntax adapter for the file's language
    /// * `file_path` - Path identifier for the source file
    /// * `source_code` - Raw source code content
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot produce a tree.
    pub fn from_source(
        adapter: &dyn SyntaxAdapter,
        file_path: &str,
        source_code: &str,
    ) -> Result<Self, AnalysisError> {
        let tree = adapter.parse(file_path, source_code)?;
        Ok(Self {
            file_path: file_path.to_string(),
            language: adapter.language().to_string(),
            capabilities: adapter.capabilities(),
            tree,
        })
    }

    pub fn source_code(&self) -> &str {
        self.tree.source()
    }

    /// Retrieves a specific line from the source code.
    ///
    /// # Arguments
    ///
    /// * `line` - Line number (1-indexed)
    ///
    /// # Returns
    ///
    /// The content of the specified line, or `None` if out of bounds.
    pub fn get_source_line(&self, line: usize) -> Option<&str> {
        self.source_code().lines().nth(line.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_selects_by_extension() {
        let registry = AdapterRegistry::new();
        assert_eq!(
            registry.for_path(Path::new("src/app.js")).map(|a| a.language()),
            Some("javascript")
        );
        assert_eq!(
            registry.for_path(Path::new("src/lib.rs")).map(|a| a.language()),
            Some("rust")
        );
        assert!(registry.for_path(Path::new("README.md")).is_none());
    }

    #[test]
    fn test_registry_selects_by_language() {
        let registry = AdapterRegistry::new();
        assert!(registry.for_language("JavaScript").is_some());
        assert!(registry.for_language("js").is_some());
        assert!(registry.for_language("cobol").is_none());
    }

    #[test]
    fn test_context_source_lines() {
        let adapter = JavaScriptAdapter::new();
        let context = AnalysisContext::from_source(&adapter, "a.js", "a();\nb();\n").unwrap();
        assert_eq!(context.get_source_line(2), Some("b();"));
        assert_eq!(context.language, "javascript");
    }
}
