//! # Pattern Matcher
//!
//! @title Structural Template Matching
//! @author Ramprasad
//!
//! Matches compiled templates against the uniform tree.
//!
//! Matching is order preserving. A variadic consumes the fewest siblings
//! that still let the rest of the sequence match. Captures are committed
//! only when the enclosing sequence succeeds, so a failed alternative never
//! leaks bindings.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{CompiledPattern, Template};
use crate::analysis::{Field, NodeId, NodeKind, Tree};

const COMPARISON_OPERATORS: &[&str] = &["==", "===", "!=", "!==", "<", "<=", ">", ">="];

/// One successful match of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternMatch {
    /// Node reported to the user: the focused node, or the match root.
    pub match_node: NodeId,
    /// Node the whole pattern matched.
    pub root: NodeId,
    pub captures: BTreeMap<String, NodeId>,
}

#[derive(Debug, Clone, Default)]
struct State {
    captures: BTreeMap<String, NodeId>,
    focus: Option<NodeId>,
}

struct Matcher<'t> {
    tree: &'t Tree,
}

/// Every match of `pattern` in `tree`, in source order.
pub fn find_all(tree: &Tree, pattern: &CompiledPattern) -> Vec<PatternMatch> {
    find_within(tree, pattern, tree.root())
}

/// Every match of `pattern` rooted at `node` or one of its descendants.
pub fn find_within(tree: &Tree, pattern: &CompiledPattern, node: NodeId) -> Vec<PatternMatch> {
    tree.subtree(node)
        .into_iter()
        .filter_map(|n| match_at(tree, pattern, n))
        .collect()
}

/// The match of `pattern` rooted exactly at `node`.
pub fn match_at(tree: &Tree, pattern: &CompiledPattern, node: NodeId) -> Option<PatternMatch> {
    if tree.kind(node) == NodeKind::Comment {
        return None;
    }
    let matcher = Matcher { tree };
    let mut state = State::default();
    matcher
        .matches(&pattern.template, node, &mut state)
        .then(|| PatternMatch {
            match_node: state.focus.unwrap_or(node),
            root: node,
            captures: state.captures,
        })
}

impl<'t> Matcher<'t> {
    /// Matches `template` at `node`, extending `state` only on success.
    fn matches(&self, template: &Template, node: NodeId, state: &mut State) -> bool {
        let tree = self.tree;
        match template {
            Template::Wildcard | Template::Variadic => tree.kind(node) != NodeKind::Comment,
            Template::Capture { name, kinds } => self.capture(name, kinds, node, state),
            Template::Alternative(alternatives) => alternatives.iter().any(|alt| {
                let mut attempt = state.clone();
                if self.matches(alt, node, &mut attempt) {
                    *state = attempt;
                    true
                } else {
                    false
                }
            }),
            Template::Focus(inner) => {
                let mut attempt = state.clone();
                if self.matches(inner, node, &mut attempt) {
                    attempt.focus = Some(node);
                    *state = attempt;
                    true
                } else {
                    false
                }
            }
            Template::Node {
                kind,
                text,
                anchored,
                children,
            } => {
                if tree.kind(node) != *kind {
                    return false;
                }
                if text.is_some() && tree.text(node) != text.as_deref() {
                    return false;
                }
                let targets = tree.code_children(node);
                let mut attempt = state.clone();
                let matched = if *anchored {
                    self.sequence(children, &targets, &mut attempt)
                } else {
                    self.subset(children, &targets, &mut attempt)
                };
                if matched {
                    *state = attempt;
                }
                matched
            }
        }
    }

    fn capture(&self, name: &str, kinds: &[NodeKind], node: NodeId, state: &mut State) -> bool {
        let tree = self.tree;
        let kind = tree.kind(node);
        if kind == NodeKind::Comment || (!kinds.is_empty() && !kinds.contains(&kind)) {
            return false;
        }
        if kind == NodeKind::String && self.in_comparison(node) {
            return false;
        }
        match state.captures.get(name) {
            Some(existing) => tree.content(*existing) == tree.content(node),
            None => {
                state.captures.insert(name.to_string(), node);
                true
            }
        }
    }

    /// String literal operand of `==`, `<` and friends.
    fn in_comparison(&self, node: NodeId) -> bool {
        self.tree.parent(node).is_some_and(|parent| {
            self.tree.kind(parent) == NodeKind::Binary
                && self
                    .tree
                    .text(parent)
                    .is_some_and(|op| COMPARISON_OPERATORS.contains(&op))
        })
    }

    fn field_agrees(&self, expected: Option<Field>, node: NodeId) -> bool {
        match (expected, self.tree.node(node).field) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => true,
        }
    }

    fn child(&self, field: Option<Field>, template: &Template, node: NodeId, state: &mut State) -> bool {
        self.field_agrees(field, node) && self.matches(template, node, state)
    }

    /// Anchored match of the whole child list.
    fn sequence(
        &self,
        patterns: &[(Option<Field>, Template)],
        targets: &[NodeId],
        state: &mut State,
    ) -> bool {
        let Some(((field, first), rest)) = patterns.split_first() else {
            return targets.is_empty();
        };

        if first.is_variadic() {
            // Fewest skipped siblings first.
            for skip in 0..=targets.len() {
                let mut attempt = state.clone();
                if self.sequence(rest, &targets[skip..], &mut attempt) {
                    *state = attempt;
                    return true;
                }
            }
            return false;
        }

        let Some((target, remaining)) = targets.split_first() else {
            return false;
        };
        let mut attempt = state.clone();
        if self.child(*field, first, *target, &mut attempt)
            && self.sequence(rest, remaining, &mut attempt)
        {
            *state = attempt;
            return true;
        }
        false
    }

    /// Every non-variadic pattern child matches a distinct target child, in
    /// any order.
    fn subset(
        &self,
        patterns: &[(Option<Field>, Template)],
        targets: &[NodeId],
        state: &mut State,
    ) -> bool {
        let mut used = vec![false; targets.len()];
        for (field, template) in patterns.iter().filter(|(_, t)| !t.is_variadic()) {
            let found = targets.iter().enumerate().find_map(|(i, target)| {
                if used[i] {
                    return None;
                }
                let mut attempt = state.clone();
                self.child(*field, template, *target, &mut attempt)
                    .then_some((i, attempt))
            });
            match found {
                Some((i, attempt)) => {
                    used[i] = true;
                    *state = attempt;
                }
                None => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{JavaScriptAdapter, RustAdapter, SyntaxAdapter};
    use crate::patterns::compile;

    fn run_js(pattern: &str, source: &str) -> (Tree, Vec<PatternMatch>) {
        let adapter = JavaScriptAdapter::new();
        let compiled = compile(&adapter, "test", pattern).unwrap();
        let tree = adapter.parse("test.js", source).unwrap();
        let matches = find_all(&tree, &compiled);
        (tree, matches)
    }

    fn captured<'t>(tree: &'t Tree, m: &PatternMatch, name: &str) -> &'t str {
        tree.content(m.captures[name])
    }

    #[test]
    fn test_call_pattern_captures_argument() {
        let (tree, matches) = run_js("logger.info($<DATA>)", "logger.info(user);\nlogger.warn(user);\n");
        assert_eq!(matches.len(), 1);
        assert_eq!(captured(&tree, &matches[0], "DATA"), "user");
        assert_eq!(tree.kind(matches[0].match_node), NodeKind::Call);
    }

    #[test]
    fn test_string_index_matches_member_pattern() {
        let (_, matches) = run_js("logger.info($<DATA>)", "logger[\"info\"](user);\n");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_matching_below_and_at_a_node() {
        let adapter = JavaScriptAdapter::new();
        let compiled = compile(&adapter, "test", "req.body").unwrap();
        let outer = compile(&adapter, "test", "logger.info($<DATA>)").unwrap();
        let tree = adapter
            .parse("test.js", "logger.info(req.body.name);\nlogger.info(name);\n")
            .unwrap();
        let calls = find_all(&tree, &outer);
        assert_eq!(calls.len(), 2);

        let first = calls[0].captures["DATA"];
        let second = calls[1].captures["DATA"];
        assert_eq!(find_within(&tree, &compiled, first).len(), 1);
        assert!(find_within(&tree, &compiled, second).is_empty());

        assert!(match_at(&tree, &compiled, first).is_none());
        assert!(match_at(&tree, &outer, calls[0].root).is_some());
    }

    #[test]
    fn test_variadic_takes_fewest_arguments() {
        let (tree, matches) = run_js("log($<...>, $<LAST>)", "log(a, b, c);\n");
        assert_eq!(matches.len(), 1);
        assert_eq!(captured(&tree, &matches[0], "LAST"), "c");

        let (_, none) = run_js("log($<...>, $<LAST>)", "log();\n");
        assert!(none.is_empty());
    }

    #[test]
    fn test_argument_count_must_line_up() {
        let (_, matches) = run_js("log($<A>)", "log(a, b);\n");
        assert!(matches.is_empty());
    }

    #[test]
    fn test_repeated_capture_requires_equal_content() {
        let (_, same) = run_js("$<X> = $<X>", "a = a;\n");
        let (_, different) = run_js("$<X> = $<X>", "a = b;\n");
        assert_eq!(same.len(), 1);
        assert!(different.is_empty());
    }

    #[test]
    fn test_string_in_comparison_is_not_captured() {
        let (_, matches) = run_js("$<LEFT> == $<RIGHT>", "if (\"x\" == \"x\") {}\nif (a == b) {}\n");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_object_pattern_matches_any_order() {
        let (tree, matches) = run_js(
            "send({ password: $<PW> })",
            "send({ user: u, password: p });\n",
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(captured(&tree, &matches[0], "PW"), "p");
    }

    #[test]
    fn test_focus_moves_match_node() {
        let (tree, matches) = run_js("http.post($<URL>, $<!>$<DATA>)", "http.post(url, body);\n");
        assert_eq!(matches.len(), 1);
        assert_eq!(tree.content(matches[0].match_node), "body");
        assert_eq!(tree.kind(matches[0].root), NodeKind::Call);
    }

    #[test]
    fn test_typed_capture_filters_kinds() {
        let (_, matches) = run_js("fetch($<URL:string>)", "fetch(\"http://a\");\nfetch(url);\n");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_rust_macro_pattern() {
        let adapter = RustAdapter::new();
        let compiled = compile(&adapter, "test", "info!($<...>, $<DATA>)").unwrap();
        let tree = adapter
            .parse("main.rs", "fn main() { info!(\"{}\", user.email); }\n")
            .unwrap();
        let matches = find_all(&tree, &compiled);
        assert_eq!(matches.len(), 1);
        assert_eq!(tree.content(matches[0].captures["DATA"]), "user.email");
    }

    #[test]
    fn test_matches_are_in_source_order() {
        let (tree, matches) = run_js("log($<X>)", "log(b);\nlog(a);\n");
        let contents: Vec<&str> = matches.iter().map(|m| captured(&tree, m, "X")).collect();
        assert_eq!(contents, vec!["b", "a"]);
    }
}
