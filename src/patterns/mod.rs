//! # Patterns Module
//!
//! @title Structural Rule Patterns
//! @author Ramprasad
//!
//! Rule patterns are snippets of source code in the rule's language with
//! placeholders in them. They are compiled once, at rule load time, into a
//! [`Template`] over the uniform tree and then matched against every node
//! of every file.
//!
//! ## Placeholders
//!
//! | Syntax              | Meaning                                         |
//! |---------------------|-------------------------------------------------|
//! | `$<NAME>`           | Capture any node under `NAME`                   |
//! | `$<NAME:kind\|kind>` | Capture a node of one of the listed kinds       |
//! | `$<_>`              | Match any node without capturing it             |
//! | `$<...>`            | Match any number of sibling nodes               |
//! | `$<!>`              | The following node becomes the match node       |

pub mod compiler;
pub mod filters;
pub mod matcher;

pub use compiler::compile;
pub use filters::{Filter, FilterContext, FilterDefinition, RuleScan};
pub use matcher::{find_all, find_within, match_at, PatternMatch};

use crate::analysis::{Field, NodeKind};

/// A compiled pattern tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// A concrete node. `text` is compared only when set.
    Node {
        kind: NodeKind,
        text: Option<String>,
        /// Children must line up in order. Unanchored children may match
        /// any subset of the target's children.
        anchored: bool,
        children: Vec<(Option<Field>, Template)>,
    },
    /// Binds the matched node under `name`. An empty `kinds` accepts any node.
    Capture { name: String, kinds: Vec<NodeKind> },
    Wildcard,
    Variadic,
    /// The first alternative that matches wins.
    Alternative(Vec<Template>),
    /// The node matched by the inner template is the match node.
    Focus(Box<Template>),
}

impl Template {
    pub fn is_variadic(&self) -> bool {
        matches!(self, Template::Variadic)
    }
}

/// A pattern ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    /// Pattern text as written in the rule.
    pub source: String,
    pub template: Template,
    /// Capture names in order of first appearance.
    pub captures: Vec<String>,
    pub focused: bool,
}

impl CompiledPattern {
    pub fn defines(&self, variable: &str) -> bool {
        self.captures.iter().any(|c| c == variable)
    }
}
