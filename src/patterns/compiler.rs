//! # Pattern Compiler
//!
//! @title Rule Pattern Compilation
//! @author Ramprasad
//!
//! Placeholders are swapped for plain identifiers so the pattern parses as
//! ordinary source code, the snippet is parsed with the rule language's
//! adapter, and the resulting tree is lowered into a [`Template`]. Every
//! failure here is a load-time [`ConfigError::InvalidPattern`].

use regex::Regex;

use super::{CompiledPattern, Template};
use crate::analysis::{Field, NodeId, NodeKind, Tree};
use crate::error::ConfigError;
use crate::parser::SyntaxAdapter;

const PLACEHOLDER: &str = r"\$<(!|\.\.\.|_|[A-Za-z][A-Za-z0-9_]*)(?::([A-Za-z_|]+))?>";
const VARIABLE_PREFIX: &str = "SentinelVar";
const VARIADIC_PREFIX: &str = "SentinelRest";

#[derive(Debug, Clone)]
enum Placeholder {
    Capture { name: String, kinds: Vec<NodeKind> },
    Wildcard,
    Variadic,
}

/// Pattern text with placeholders replaced by identifiers.
struct Substituted {
    text: String,
    placeholders: Vec<Placeholder>,
    focus: Option<usize>,
}

/// Compiles one rule pattern.
///
/// # Arguments
///
/// * `adapter` - Adapter of the rule's language
/// * `rule_id` - Owning rule, for error messages
/// * `pattern` - Pattern text with placeholders
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPattern`] for malformed placeholders,
/// snippets that do not parse, and patterns without a concrete node.
pub fn compile(
    adapter: &dyn SyntaxAdapter,
    rule_id: &str,
    pattern: &str,
) -> Result<CompiledPattern, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidPattern {
        rule: rule_id.to_string(),
        pattern: pattern.to_string(),
        message,
    };

    let substituted = substitute(pattern).map_err(invalid)?;
    let tree = adapter
        .parse_pattern(&substituted.text)
        .map_err(|e| invalid(e.to_string()))?;

    if let Some(error) = tree
        .preorder()
        .into_iter()
        .find(|n| tree.kind(*n) == NodeKind::Error)
    {
        let span = tree.span(error);
        return Err(invalid(format!(
            "syntax error at column {}",
            span.column
        )));
    }

    let root = strip_wrappers(&tree, tree.root());

    // The adapter may have wrapped the snippet, shifting byte offsets.
    let shift = tree.source().find(substituted.text.as_str()).unwrap_or(0);
    let focus = match substituted.focus {
        Some(offset) => Some(
            find_focus(&tree, root, offset + shift)
                .ok_or_else(|| invalid("`$<!>` must precede a node".to_string()))?,
        ),
        None => None,
    };

    let mut lowering = Lowering {
        tree: &tree,
        placeholders: &substituted.placeholders,
        focus,
        captures: Vec::new(),
    };
    let template = lowering.lower(root);

    if matches!(
        template,
        Template::Capture { .. } | Template::Wildcard | Template::Variadic
    ) {
        return Err(invalid(
            "pattern must contain at least one concrete node".to_string(),
        ));
    }

    log::trace!("{}: compiled `{}` to {:?}", rule_id, pattern, template);

    Ok(CompiledPattern {
        source: pattern.to_string(),
        template,
        captures: lowering.captures,
        focused: focus.is_some(),
    })
}

fn substitute(pattern: &str) -> Result<Substituted, String> {
    let placeholder = Regex::new(PLACEHOLDER).map_err(|e| e.to_string())?;
    let mut text = String::with_capacity(pattern.len());
    let mut placeholders = Vec::new();
    let mut focus = None;
    let mut last = 0;

    for caps in placeholder.captures_iter(pattern) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        text.push_str(&pattern[last..whole.start()]);
        last = whole.end();

        let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let kinds = caps.get(2).map(|m| m.as_str());

        let entry = match (name, kinds) {
            ("!", None) => {
                if focus.is_some() {
                    return Err("`$<!>` may appear only once".to_string());
                }
                focus = Some(text.len());
                continue;
            }
            ("_", None) => Placeholder::Wildcard,
            ("...", None) => Placeholder::Variadic,
            ("!" | "_" | "...", Some(_)) => {
                return Err(format!("`$<{}>` does not take node kinds", name));
            }
            (name, kinds) => Placeholder::Capture {
                name: name.to_string(),
                kinds: parse_kinds(kinds)?,
            },
        };

        let prefix = if matches!(entry, Placeholder::Variadic) {
            VARIADIC_PREFIX
        } else {
            VARIABLE_PREFIX
        };
        text.push_str(&format!("{}{}", prefix, placeholders.len()));
        placeholders.push(entry);
    }
    text.push_str(&pattern[last..]);

    if text.contains("$<") {
        return Err("malformed placeholder".to_string());
    }
    if text.trim().is_empty() {
        return Err("empty pattern".to_string());
    }

    Ok(Substituted {
        text,
        placeholders,
        focus,
    })
}

fn parse_kinds(kinds: Option<&str>) -> Result<Vec<NodeKind>, String> {
    let Some(kinds) = kinds else {
        return Ok(Vec::new());
    };
    kinds
        .split('|')
        .map(|name| {
            NodeKind::from_name(name).ok_or_else(|| format!("unknown node kind '{}'", name))
        })
        .collect()
}

/// Drops program, statement and block nodes that only wrap one child.
fn strip_wrappers(tree: &Tree, mut node: NodeId) -> NodeId {
    loop {
        if !matches!(
            tree.kind(node),
            NodeKind::Program | NodeKind::Statement | NodeKind::Block
        ) {
            return node;
        }
        match tree.code_children(node).as_slice() {
            [only] => node = *only,
            _ => return node,
        }
    }
}

/// Outermost node under `root` that starts at the first non-blank byte at
/// or after `offset`.
fn find_focus(tree: &Tree, root: NodeId, offset: usize) -> Option<NodeId> {
    let source = tree.source();
    let skipped = source
        .get(offset..)?
        .find(|c: char| !c.is_whitespace())?;
    let start = offset + skipped;

    tree.preorder().into_iter().find(|n| {
        tree.is_ancestor(root, *n)
            && tree.kind(*n) != NodeKind::Comment
            && tree.span(*n).start_byte == start
    })
}

struct Lowering<'a> {
    tree: &'a Tree,
    placeholders: &'a [Placeholder],
    focus: Option<NodeId>,
    captures: Vec<String>,
}

impl<'a> Lowering<'a> {
    fn lower(&mut self, node: NodeId) -> Template {
        let template = self.lower_unfocused(node);
        if self.focus == Some(node) {
            Template::Focus(Box::new(template))
        } else {
            template
        }
    }

    fn lower_unfocused(&mut self, node: NodeId) -> Template {
        let tree = self.tree;
        if let Some(placeholder) = self.placeholder(node) {
            return placeholder;
        }

        match tree.kind(node) {
            // `{ $<X> }` lowers to a pair whose key and value are the same dummy.
            NodeKind::Pair => {
                let key = tree.child_by_field(node, Field::Key);
                let value = tree.child_by_field(node, Field::Value);
                if let (Some(key), Some(value)) = (key, value) {
                    if tree.text(key) == tree.text(value) && self.placeholder_index(key).is_some() {
                        if let Some(placeholder) = self.placeholder(value) {
                            return placeholder;
                        }
                    }
                }
                self.concrete(node)
            }
            NodeKind::Member => {
                let member = self.concrete(node);
                match self.static_property(node) {
                    Some(name) => Template::Alternative(vec![
                        member.clone(),
                        index_form(&member, name),
                    ]),
                    None => member,
                }
            }
            NodeKind::Identifier
                if tree.node(node).field == Some(Field::Key) =>
            {
                let text = tree.text(node).map(str::to_string);
                Template::Alternative(vec![
                    leaf(NodeKind::Identifier, text.clone()),
                    leaf(NodeKind::String, text),
                ])
            }
            _ => self.concrete(node),
        }
    }

    fn concrete(&mut self, node: NodeId) -> Template {
        let tree = self.tree;
        let kind = tree.kind(node);
        let text = if kind.has_significant_text() {
            tree.text(node).map(str::to_string)
        } else {
            None
        };
        let children = tree
            .code_children(node)
            .into_iter()
            .map(|child| (tree.node(child).field, self.lower(child)))
            .collect();
        Template::Node {
            kind,
            text,
            anchored: !kind.is_unordered_container(),
            children,
        }
    }

    fn placeholder_index(&self, node: NodeId) -> Option<usize> {
        let tree = self.tree;
        if tree.kind(node) != NodeKind::Identifier {
            return None;
        }
        let text = tree.text(node)?;
        let digits = text
            .strip_prefix(VARIABLE_PREFIX)
            .or_else(|| text.strip_prefix(VARIADIC_PREFIX))?;
        let index: usize = digits.parse().ok()?;
        (index < self.placeholders.len()).then_some(index)
    }

    fn placeholder(&mut self, node: NodeId) -> Option<Template> {
        let index = self.placeholder_index(node)?;
        let template = match &self.placeholders[index] {
            Placeholder::Capture { name, kinds } => {
                if !self.captures.contains(name) {
                    self.captures.push(name.clone());
                }
                Template::Capture {
                    name: name.clone(),
                    kinds: kinds.clone(),
                }
            }
            Placeholder::Wildcard => Template::Wildcard,
            Placeholder::Variadic => Template::Variadic,
        };
        Some(template)
    }

    /// Property name of `a.b` when `b` is written literally.
    fn static_property(&self, member: NodeId) -> Option<String> {
        let property = self.tree.child_by_field(member, Field::Property)?;
        if self.placeholder_index(property).is_some() {
            return None;
        }
        self.tree.text(property).map(str::to_string)
    }
}

fn leaf(kind: NodeKind, text: Option<String>) -> Template {
    Template::Node {
        kind,
        text,
        anchored: true,
        children: Vec::new(),
    }
}

/// `a.b` as `a["b"]`.
fn index_form(member: &Template, property: String) -> Template {
    let object = match member {
        Template::Node { children, .. } => children
            .iter()
            .find(|(field, _)| *field == Some(Field::Object))
            .map(|(_, t)| t.clone())
            .unwrap_or(Template::Wildcard),
        _ => Template::Wildcard,
    };
    Template::Node {
        kind: NodeKind::Index,
        text: None,
        anchored: true,
        children: vec![
            (Some(Field::Object), object),
            (Some(Field::Index), leaf(NodeKind::String, Some(property))),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{JavaScriptAdapter, RustAdapter};

    fn js(pattern: &str) -> Result<CompiledPattern, ConfigError> {
        compile(&JavaScriptAdapter::new(), "test", pattern)
    }

    #[test]
    fn test_call_pattern_collects_captures() {
        let compiled = js("logger.info($<DATA>)").unwrap();
        assert_eq!(compiled.captures, vec!["DATA".to_string()]);
        assert!(!compiled.focused);
        match &compiled.template {
            Template::Node { kind, .. } => assert_eq!(*kind, NodeKind::Call),
            other => panic!("unexpected template {:?}", other),
        }
    }

    #[test]
    fn test_typed_capture_and_variadic() {
        let compiled = js("send($<...>, $<URL:string|template_string>)").unwrap();
        let Template::Node { children, .. } = &compiled.template else {
            panic!("expected a node");
        };
        let (_, arguments) = &children[1];
        let Template::Node { children: args, .. } = arguments else {
            panic!("expected arguments");
        };
        assert!(args[0].1.is_variadic());
        assert_eq!(
            args[1].1,
            Template::Capture {
                name: "URL".into(),
                kinds: vec![NodeKind::String, NodeKind::TemplateString],
            }
        );
    }

    #[test]
    fn test_member_also_matches_string_index() {
        let compiled = js("logger.info($<_>)").unwrap();
        let Template::Node { children, .. } = &compiled.template else {
            panic!("expected a node");
        };
        assert!(matches!(&children[0].1, Template::Alternative(alts) if alts.len() == 2));
    }

    #[test]
    fn test_focus_marks_inner_node() {
        let compiled = js("http.post($<URL>, $<!>$<DATA>)").unwrap();
        assert!(compiled.focused);
        let debug = format!("{:?}", compiled.template);
        assert!(debug.contains("Focus(Capture"));
    }

    #[test]
    fn test_focus_in_wrapped_rust_statement() {
        let compiled = compile(&RustAdapter::new(), "test", "let $<X> = $<!>$<VALUE>;").unwrap();
        assert!(compiled.focused);
        assert_eq!(compiled.captures, vec!["X".to_string(), "VALUE".to_string()]);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = js("log($<X:banana>)").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { message, .. } if message.contains("banana")));
    }

    #[test]
    fn test_bare_placeholder_is_rejected() {
        assert!(js("$<X>").is_err());
    }

    #[test]
    fn test_double_focus_is_rejected() {
        assert!(js("$<!>a($<!>b)").is_err());
    }
}
