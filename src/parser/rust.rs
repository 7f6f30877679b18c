//! # Rust Adapter
//!
//! @title syn Lowering for Rust
//! @author Ramprasad
//!
//! Parses Rust with `syn` and lowers items, statements and expressions into
//! the uniform tree. Notable mappings:
//!
//! - `impl Type { .. }` becomes a class named `Type`
//! - `recv.method(args)` becomes a call whose callee is a member access
//! - `name!(a, b)` becomes a call to `name!` when the body parses as a
//!   comma-separated expression list
//! - struct literals become objects carrying the struct name
//! - references, parentheses, `?` and `.await` are transparent
//!
//! Rust is block scoped. `syn` cannot recover from syntax errors, so an
//! unparseable file lowers to a program holding a single error node.
//!
//! `syn` parses recursively and has no depth limit of its own. Bracket
//! nesting is therefore measured with a flat scan before `syn` runs, and a
//! file nested deeper than the adapter's `max_depth` is rejected with
//! [`AnalysisError::DepthExceeded`].

use proc_macro2::Span as TokenSpan;
use quote::ToTokens;
use syn::ext::IdentExt;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    BinOp, Block, Expr, FnArg, ImplItem, Item, Lit, MacroDelimiter, Member, Pat, Stmt, TraitItem,
    Type, UnOp,
};

use super::SyntaxAdapter;
use crate::analysis::{
    AnalysisLimits, Capabilities, Field, LineIndex, NodeId, NodeKind, Span, Tree, TreeBuilder,
};
use crate::error::AnalysisError;

const MAX_LOWERING_DEPTH: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct RustAdapter {
    max_depth: usize,
}

impl RustAdapter {
    pub fn new() -> Self {
        Self::with_max_depth(AnalysisLimits::default().max_depth)
    }

    /// Adapter rejecting files whose bracket nesting exceeds `max_depth`.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl Default for RustAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxAdapter for RustAdapter {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { block_scoped: true }
    }

    fn parse(&self, file_path: &str, source: &str) -> Result<Tree, AnalysisError> {
        let depth = nesting_depth(source);
        if depth > self.max_depth {
            log::debug!("{}: brackets nest {} deep", file_path, depth);
            return Err(AnalysisError::DepthExceeded {
                limit: self.max_depth,
            });
        }

        let mut lowering = Lowering::new(file_path, source);
        let root = match syn::parse_file(source) {
            Ok(file) => {
                let mut children = Vec::new();
                for item in &file.items {
                    if let Some(node) = lowering.item(item, 1) {
                        children.push((None, node));
                    }
                }
                lowering.program(children)
            }
            Err(e) => {
                log::debug!("{}: {}, lowering to an error node", file_path, e);
                let span = lowering.lines.span(0, source.len());
                let error = lowering.builder.leaf(NodeKind::Error, span, None);
                lowering.program(vec![(None, error)])
            }
        };
        Ok(lowering.builder.finish(root))
    }

    fn parse_pattern(&self, pattern: &str) -> Result<Tree, AnalysisError> {
        if let Ok(expr) = syn::parse_str::<Expr>(pattern) {
            let mut lowering = Lowering::new("<pattern>", pattern);
            let node = lowering.expr(&expr, 2);
            let span = lowering.builder.span_of(node);
            let statement =
                lowering
                    .builder
                    .node(NodeKind::Statement, span, None, vec![(None, node)]);
            let root = lowering.program(vec![(None, statement)]);
            return Ok(lowering.builder.finish(root));
        }

        let wrapped = format!("{{ {} }}", pattern);
        if let Ok(block) = syn::parse_str::<Block>(&wrapped) {
            let mut lowering = Lowering::new("<pattern>", &wrapped);
            let children: Vec<_> = block
                .stmts
                .iter()
                .filter_map(|s| lowering.stmt(s, 1))
                .map(|n| (None, n))
                .collect();
            let root = lowering.program(children);
            return Ok(lowering.builder.finish(root));
        }

        match syn::parse_str::<syn::File>(pattern) {
            Ok(file) => {
                let mut lowering = Lowering::new("<pattern>", pattern);
                let children: Vec<_> = file
                    .items
                    .iter()
                    .filter_map(|i| lowering.item(i, 1))
                    .map(|n| (None, n))
                    .collect();
                let root = lowering.program(children);
                Ok(lowering.builder.finish(root))
            }
            Err(e) => Err(AnalysisError::Parse {
                file: "<pattern>".to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Deepest `(`/`[`/`{` nesting of `source`, ignoring comments and string,
/// raw string and char literals.
///
/// Unbalanced input never underflows; the result is only an upper bound
/// used to refuse pathological files.
pub(crate) fn nesting_depth(source: &str) -> usize {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut deepest = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
                i += 1;
            }
            b')' | b']' | b'}' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                // block comments nest in Rust
                let mut open = 1usize;
                i += 2;
                while i < bytes.len() && open > 0 {
                    if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
                        open += 1;
                        i += 2;
                    } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        open -= 1;
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
            }
            b'r' if starts_raw_string(bytes, i) => {
                let mut hashes = 0;
                i += 1;
                while bytes.get(i) == Some(&b'#') {
                    hashes += 1;
                    i += 1;
                }
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'"'
                        && bytes.len() >= i + 1 + hashes
                        && bytes[i + 1..i + 1 + hashes].iter().all(|b| *b == b'#')
                    {
                        i += 1 + hashes;
                        break;
                    }
                    i += 1;
                }
            }
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
                i += 1;
            }
            b'\'' => {
                // 'x' and '\n' are chars; 'a without a closing quote is a lifetime
                if bytes.get(i + 1) == Some(&b'\\') {
                    i += 3;
                    while i < bytes.len() && bytes[i] != b'\'' {
                        i += 1;
                    }
                    i += 1;
                } else if let Some(len) = char_literal_len(&source[i + 1..]) {
                    i += 1 + len + 1;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    deepest
}

/// True at the `r` of `r"..."` or `r#"..."#` that is not part of an identifier.
fn starts_raw_string(bytes: &[u8], i: usize) -> bool {
    let previous_is_ident = i > 0 && {
        let b = bytes[i - 1];
        (b.is_ascii_alphanumeric() || b == b'_') && b != b'b'
    };
    if previous_is_ident {
        return false;
    }
    let mut j = i + 1;
    while bytes.get(j) == Some(&b'#') {
        j += 1;
    }
    bytes.get(j) == Some(&b'"')
}

/// Byte length of the char in `'c'` when `rest` starts with `c'`.
fn char_literal_len(rest: &str) -> Option<usize> {
    let c = rest.chars().next()?;
    let len = c.len_utf8();
    (rest.as_bytes().get(len) == Some(&b'\'')).then_some(len)
}

fn path_text(path: &syn::Path) -> String {
    path.segments
        .iter()
        .map(|s| s.ident.unraw().to_string())
        .collect::<Vec<_>>()
        .join("::")
}

fn type_name(ty: &Type) -> String {
    match ty {
        Type::Path(p) => p
            .path
            .segments
            .last()
            .map(|s| s.ident.unraw().to_string())
            .unwrap_or_default(),
        other => other.to_token_stream().to_string(),
    }
}

/// Binary operators that assign rather than compare.
fn is_compound_assignment(op: &BinOp) -> bool {
    matches!(
        op,
        BinOp::AddAssign(_)
            | BinOp::SubAssign(_)
            | BinOp::MulAssign(_)
            | BinOp::DivAssign(_)
            | BinOp::RemAssign(_)
            | BinOp::BitXorAssign(_)
            | BinOp::BitAndAssign(_)
            | BinOp::BitOrAssign(_)
            | BinOp::ShlAssign(_)
            | BinOp::ShrAssign(_)
    )
}

struct Lowering<'s> {
    source: &'s str,
    lines: LineIndex,
    builder: TreeBuilder,
}

type Children = Vec<(Option<Field>, NodeId)>;

impl<'s> Lowering<'s> {
    fn new(file_path: &str, source: &'s str) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
            builder: TreeBuilder::new(file_path, "rust", source),
        }
    }

    fn span(&self, span: TokenSpan) -> Span {
        let (start, end) = (span.start(), span.end());
        let start = self.lines.offset(self.source, start.line, start.column);
        let end = self.lines.offset(self.source, end.line, end.column);
        self.lines.span(start, end.max(start))
    }

    fn program(&mut self, children: Children) -> NodeId {
        let span = self.lines.span(0, self.source.len());
        self.builder.node(NodeKind::Program, span, None, children)
    }

    fn node(&mut self, kind: NodeKind, span: TokenSpan, text: Option<String>, children: Children) -> NodeId {
        let span = self.span(span);
        self.builder.node(kind, span, text, children)
    }

    fn leaf(&mut self, kind: NodeKind, span: TokenSpan, text: Option<String>) -> NodeId {
        self.node(kind, span, text, Vec::new())
    }

    fn ident(&mut self, ident: &syn::Ident) -> NodeId {
        self.leaf(NodeKind::Identifier, ident.span(), Some(ident.unraw().to_string()))
    }

    fn statement(&mut self, inner: NodeId) -> NodeId {
        let span = self.builder.span_of(inner);
        self.builder
            .node(NodeKind::Statement, span, None, vec![(None, inner)])
    }

    fn item(&mut self, item: &Item, depth: usize) -> Option<NodeId> {
        if depth > MAX_LOWERING_DEPTH {
            return Some(self.leaf(NodeKind::Error, item.span(), None));
        }
        let node = match item {
            Item::Fn(f) => self.function(
                Some(&f.sig.ident),
                f.sig.inputs.iter(),
                &f.block,
                f.span(),
                depth,
            ),
            Item::Impl(i) => {
                let name = self.leaf(
                    NodeKind::Identifier,
                    i.self_ty.span(),
                    Some(type_name(&i.self_ty)),
                );
                let mut methods = Vec::new();
                for impl_item in &i.items {
                    if let ImplItem::Fn(m) = impl_item {
                        let method = self.function(
                            Some(&m.sig.ident),
                            m.sig.inputs.iter(),
                            &m.block,
                            m.span(),
                            depth + 2,
                        );
                        methods.push((None, method));
                    }
                }
                let body = self.node(NodeKind::Block, i.brace_token.span.join(), None, methods);
                self.node(
                    NodeKind::Class,
                    i.span(),
                    None,
                    vec![(Some(Field::Name), name), (Some(Field::Body), body)],
                )
            }
            Item::Trait(t) => {
                let name = self.ident(&t.ident);
                let mut methods = Vec::new();
                for trait_item in &t.items {
                    if let TraitItem::Fn(m) = trait_item {
                        if let Some(block) = &m.default {
                            let method = self.function(
                                Some(&m.sig.ident),
                                m.sig.inputs.iter(),
                                block,
                                m.span(),
                                depth + 2,
                            );
                            methods.push((None, method));
                        }
                    }
                }
                let body = self.node(NodeKind::Block, t.brace_token.span.join(), None, methods);
                self.node(
                    NodeKind::Class,
                    t.span(),
                    None,
                    vec![(Some(Field::Name), name), (Some(Field::Body), body)],
                )
            }
            Item::Mod(m) => {
                let (_, items) = m.content.as_ref()?;
                let children: Children = items
                    .iter()
                    .filter_map(|i| self.item(i, depth + 1))
                    .map(|n| (None, n))
                    .collect();
                self.node(NodeKind::Block, m.span(), None, children)
            }
            Item::Const(c) => {
                let name = self.ident(&c.ident);
                let value = self.expr(&c.expr, depth + 2);
                let declaration = self.node(
                    NodeKind::Declaration,
                    c.span(),
                    None,
                    vec![(Some(Field::Name), name), (Some(Field::Value), value)],
                );
                self.statement(declaration)
            }
            Item::Static(s) => {
                let name = self.ident(&s.ident);
                let value = self.expr(&s.expr, depth + 2);
                let declaration = self.node(
                    NodeKind::Declaration,
                    s.span(),
                    None,
                    vec![(Some(Field::Name), name), (Some(Field::Value), value)],
                );
                self.statement(declaration)
            }
            Item::Macro(m) => {
                let call = self.macro_call(&m.mac, m.span(), depth + 1);
                self.statement(call)
            }
            _ => return None,
        };
        Some(node)
    }

    fn function<'a>(
        &mut self,
        name: Option<&syn::Ident>,
        inputs: impl Iterator<Item = &'a FnArg>,
        block: &Block,
        span: TokenSpan,
        depth: usize,
    ) -> NodeId {
        let mut children = Vec::new();
        if let Some(name) = name {
            let ident = self.ident(name);
            children.push((Some(Field::Name), ident));
        }
        for input in inputs {
            let parameter = match input {
                FnArg::Receiver(r) => {
                    let this = self.leaf(
                        NodeKind::Identifier,
                        r.self_token.span,
                        Some("self".to_string()),
                    );
                    self.node(NodeKind::Parameter, r.span(), None, vec![(Some(Field::Name), this)])
                }
                FnArg::Typed(t) => {
                    let pattern = self.pat(&t.pat, depth + 2);
                    self.node(NodeKind::Parameter, t.span(), None, vec![(Some(Field::Name), pattern)])
                }
            };
            children.push((Some(Field::Parameters), parameter));
        }
        let body = self.block(block, depth + 1);
        children.push((Some(Field::Body), body));
        self.node(NodeKind::Function, span, None, children)
    }

    fn block(&mut self, block: &Block, depth: usize) -> NodeId {
        if depth > MAX_LOWERING_DEPTH {
            return self.leaf(NodeKind::Error, block.span(), None);
        }
        let children: Children = block
            .stmts
            .iter()
            .filter_map(|s| self.stmt(s, depth + 1))
            .map(|n| (None, n))
            .collect();
        self.node(NodeKind::Block, block.brace_token.span.join(), None, children)
    }

    fn stmt(&mut self, stmt: &Stmt, depth: usize) -> Option<NodeId> {
        match stmt {
            Stmt::Local(local) => {
                let mut children = vec![(Some(Field::Name), self.pat(&local.pat, depth + 2))];
                if let Some(init) = &local.init {
                    let value = self.expr(&init.expr, depth + 2);
                    children.push((Some(Field::Value), value));
                }
                let declaration = self.node(NodeKind::Declaration, local.span(), None, children);
                Some(self.statement(declaration))
            }
            Stmt::Item(item) => self.item(item, depth),
            Stmt::Expr(expr, _) => {
                let inner = self.expr(expr, depth + 1);
                Some(self.statement(inner))
            }
            Stmt::Macro(m) => {
                let call = self.macro_call(&m.mac, m.span(), depth + 1);
                Some(self.statement(call))
            }
        }
    }

    fn expr(&mut self, expr: &Expr, depth: usize) -> NodeId {
        if depth > MAX_LOWERING_DEPTH {
            return self.leaf(NodeKind::Error, expr.span(), None);
        }
        let next = depth + 1;
        match expr {
            Expr::Array(a) => {
                let children = a.elems.iter().map(|e| (None, self.expr(e, next))).collect();
                self.node(NodeKind::Array, a.span(), None, children)
            }
            Expr::Tuple(t) => {
                let children = t.elems.iter().map(|e| (None, self.expr(e, next))).collect();
                self.node(NodeKind::Array, t.span(), None, children)
            }
            Expr::Assign(a) => {
                let left = self.expr(&a.left, next);
                let right = self.expr(&a.right, next);
                self.node(
                    NodeKind::Assignment,
                    a.span(),
                    Some("=".to_string()),
                    vec![(Some(Field::Left), left), (Some(Field::Right), right)],
                )
            }
            Expr::Binary(b) => {
                let operator = b.op.to_token_stream().to_string();
                let kind = if is_compound_assignment(&b.op) {
                    NodeKind::Assignment
                } else {
                    NodeKind::Binary
                };
                let left = self.expr(&b.left, next);
                let right = self.expr(&b.right, next);
                self.node(
                    kind,
                    b.span(),
                    Some(operator),
                    vec![(Some(Field::Left), left), (Some(Field::Right), right)],
                )
            }
            Expr::Block(b) => self.block(&b.block, next),
            Expr::Async(a) => self.block(&a.block, next),
            Expr::Unsafe(u) => self.block(&u.block, next),
            Expr::Const(c) => self.block(&c.block, next),
            Expr::Loop(l) => self.block(&l.body, next),
            Expr::Call(c) => {
                let function = self.expr(&c.func, next);
                let args = c.args.iter().map(|a| (None, self.expr(a, next + 1))).collect();
                let arguments = self.node(NodeKind::Arguments, c.paren_token.span.join(), None, args);
                self.node(
                    NodeKind::Call,
                    c.span(),
                    None,
                    vec![(Some(Field::Function), function), (Some(Field::Arguments), arguments)],
                )
            }
            Expr::MethodCall(m) => {
                let receiver = self.expr(&m.receiver, next + 1);
                let method = self.ident(&m.method);
                let span = self
                    .builder
                    .span_of(receiver)
                    .cover(self.builder.span_of(method));
                let callee = self.builder.node(
                    NodeKind::Member,
                    span,
                    None,
                    vec![(Some(Field::Object), receiver), (Some(Field::Property), method)],
                );
                let args = m.args.iter().map(|a| (None, self.expr(a, next + 1))).collect();
                let arguments = self.node(NodeKind::Arguments, m.paren_token.span.join(), None, args);
                self.node(
                    NodeKind::Call,
                    m.span(),
                    None,
                    vec![(Some(Field::Function), callee), (Some(Field::Arguments), arguments)],
                )
            }
            Expr::Field(f) => {
                let object = self.expr(&f.base, next);
                match &f.member {
                    Member::Named(ident) => {
                        let property = self.ident(ident);
                        self.node(
                            NodeKind::Member,
                            f.span(),
                            None,
                            vec![(Some(Field::Object), object), (Some(Field::Property), property)],
                        )
                    }
                    Member::Unnamed(index) => {
                        let position =
                            self.leaf(NodeKind::Number, index.span, Some(index.index.to_string()));
                        self.node(
                            NodeKind::Index,
                            f.span(),
                            None,
                            vec![(Some(Field::Object), object), (Some(Field::Index), position)],
                        )
                    }
                }
            }
            Expr::Index(i) => {
                let object = self.expr(&i.expr, next);
                let index = self.expr(&i.index, next);
                self.node(
                    NodeKind::Index,
                    i.span(),
                    None,
                    vec![(Some(Field::Object), object), (Some(Field::Index), index)],
                )
            }
            Expr::Closure(c) => {
                let mut children: Children = Vec::new();
                for input in &c.inputs {
                    let pattern = self.pat(input, next + 1);
                    let parameter = self.node(
                        NodeKind::Parameter,
                        input.span(),
                        None,
                        vec![(Some(Field::Name), pattern)],
                    );
                    children.push((Some(Field::Parameters), parameter));
                }
                let body = self.expr(&c.body, next);
                children.push((Some(Field::Body), body));
                self.node(NodeKind::Function, c.span(), None, children)
            }
            Expr::ForLoop(f) => {
                let iterable = self.expr(&f.expr, next);
                let pattern = self.pat(&f.pat, next + 1);
                let binding = self.node(
                    NodeKind::Parameter,
                    f.pat.span(),
                    None,
                    vec![(Some(Field::Name), pattern)],
                );
                let body = self.block(&f.body, next);
                self.node(
                    NodeKind::Other,
                    f.span(),
                    None,
                    vec![(None, iterable), (None, binding), (Some(Field::Body), body)],
                )
            }
            Expr::If(i) => {
                let condition = self.expr(&i.cond, next);
                let then = self.block(&i.then_branch, next);
                let mut children = vec![(Some(Field::Condition), condition), (Some(Field::Body), then)];
                if let Some((_, otherwise)) = &i.else_branch {
                    children.push((None, self.expr(otherwise, next)));
                }
                self.node(NodeKind::Other, i.span(), None, children)
            }
            Expr::While(w) => {
                let condition = self.expr(&w.cond, next);
                let body = self.block(&w.body, next);
                self.node(
                    NodeKind::Other,
                    w.span(),
                    None,
                    vec![(Some(Field::Condition), condition), (Some(Field::Body), body)],
                )
            }
            Expr::Let(l) => {
                let pattern = self.pat(&l.pat, next);
                let value = self.expr(&l.expr, next);
                self.node(
                    NodeKind::Parameter,
                    l.span(),
                    None,
                    vec![(Some(Field::Name), pattern), (Some(Field::Value), value)],
                )
            }
            Expr::Match(m) => {
                let mut children = vec![(None, self.expr(&m.expr, next))];
                for arm in &m.arms {
                    let pattern = self.pat(&arm.pat, next + 2);
                    let binding = self.node(
                        NodeKind::Parameter,
                        arm.pat.span(),
                        None,
                        vec![(Some(Field::Name), pattern)],
                    );
                    let body = self.expr(&arm.body, next + 1);
                    let arm_node = self.node(
                        NodeKind::Other,
                        arm.span(),
                        None,
                        vec![(None, binding), (Some(Field::Body), body)],
                    );
                    children.push((None, arm_node));
                }
                self.node(NodeKind::Other, m.span(), None, children)
            }
            Expr::Lit(l) => self.lit(&l.lit),
            Expr::Macro(m) => self.macro_call(&m.mac, m.span(), next),
            Expr::Path(p) => {
                let text = if p.qself.is_none() && p.path.segments.len() == 1 {
                    p.path.segments[0].ident.unraw().to_string()
                } else {
                    path_text(&p.path)
                };
                self.leaf(NodeKind::Identifier, p.span(), Some(text))
            }
            Expr::Return(r) => {
                let children = match &r.expr {
                    Some(value) => vec![(None, self.expr(value, next))],
                    None => Vec::new(),
                };
                self.node(NodeKind::Return, r.span(), None, children)
            }
            Expr::Struct(s) => {
                let name = s.path.segments.last().map(|seg| seg.ident.unraw().to_string());
                let mut children: Children = Vec::new();
                for field in &s.fields {
                    let key = match &field.member {
                        Member::Named(ident) => self.ident(ident),
                        Member::Unnamed(index) => {
                            self.leaf(NodeKind::Number, index.span, Some(index.index.to_string()))
                        }
                    };
                    let value = self.expr(&field.expr, next + 1);
                    let pair = self.node(
                        NodeKind::Pair,
                        field.span(),
                        None,
                        vec![(Some(Field::Key), key), (Some(Field::Value), value)],
                    );
                    children.push((None, pair));
                }
                if let Some(rest) = &s.rest {
                    let inner = self.expr(rest, next + 1);
                    let spread = self.node(NodeKind::Spread, rest.span(), None, vec![(None, inner)]);
                    children.push((None, spread));
                }
                self.node(NodeKind::Object, s.span(), name, children)
            }
            Expr::Range(r) => {
                let mut children = Vec::new();
                if let Some(start) = &r.start {
                    children.push((None, self.expr(start, next)));
                }
                if let Some(end) = &r.end {
                    children.push((None, self.expr(end, next)));
                }
                self.node(NodeKind::Other, r.span(), None, children)
            }
            Expr::Unary(u) => match &u.op {
                UnOp::Deref(_) => self.expr(&u.expr, next),
                _ => {
                    let inner = self.expr(&u.expr, next);
                    self.node(NodeKind::Other, u.span(), None, vec![(None, inner)])
                }
            },
            Expr::Reference(r) => self.expr(&r.expr, next),
            Expr::Paren(p) => self.expr(&p.expr, next),
            Expr::Group(g) => self.expr(&g.expr, next),
            Expr::Try(t) => self.expr(&t.expr, next),
            Expr::Await(a) => self.expr(&a.base, next),
            Expr::Cast(c) => self.expr(&c.expr, next),
            other => self.leaf(NodeKind::Other, other.span(), None),
        }
    }

    fn lit(&mut self, lit: &Lit) -> NodeId {
        let span = lit.span();
        match lit {
            Lit::Str(s) => self.leaf(NodeKind::String, span, Some(s.value())),
            Lit::ByteStr(b) => {
                let text = String::from_utf8_lossy(&b.value()).into_owned();
                self.leaf(NodeKind::String, span, Some(text))
            }
            Lit::Char(c) => self.leaf(NodeKind::String, span, Some(c.value().to_string())),
            Lit::Int(i) => self.leaf(NodeKind::Number, span, Some(i.base10_digits().to_string())),
            Lit::Float(f) => self.leaf(NodeKind::Number, span, Some(f.base10_digits().to_string())),
            Lit::Bool(b) => self.leaf(NodeKind::Boolean, span, Some(b.value.to_string())),
            _ => self.leaf(NodeKind::Other, span, None),
        }
    }

    fn pat(&mut self, pat: &Pat, depth: usize) -> NodeId {
        if depth > MAX_LOWERING_DEPTH {
            return self.leaf(NodeKind::Error, pat.span(), None);
        }
        let next = depth + 1;
        match pat {
            Pat::Ident(p) => self.ident(&p.ident),
            Pat::Type(t) => self.pat(&t.pat, next),
            Pat::Reference(r) => self.pat(&r.pat, next),
            Pat::Paren(p) => self.pat(&p.pat, next),
            Pat::Struct(s) => {
                let mut children: Children = Vec::new();
                for field in &s.fields {
                    let key = match &field.member {
                        Member::Named(ident) => self.ident(ident),
                        Member::Unnamed(index) => {
                            self.leaf(NodeKind::Number, index.span, Some(index.index.to_string()))
                        }
                    };
                    let value = self.pat(&field.pat, next + 1);
                    let pair = self.node(
                        NodeKind::Pair,
                        field.span(),
                        None,
                        vec![(Some(Field::Key), key), (Some(Field::Value), value)],
                    );
                    children.push((None, pair));
                }
                self.node(NodeKind::ObjectPattern, s.span(), None, children)
            }
            Pat::TupleStruct(t) => {
                let children = t.elems.iter().map(|p| (None, self.pat(p, next))).collect();
                self.node(NodeKind::Array, t.span(), None, children)
            }
            Pat::Tuple(t) => {
                let children = t.elems.iter().map(|p| (None, self.pat(p, next))).collect();
                self.node(NodeKind::Array, t.span(), None, children)
            }
            Pat::Slice(s) => {
                let children = s.elems.iter().map(|p| (None, self.pat(p, next))).collect();
                self.node(NodeKind::Array, s.span(), None, children)
            }
            other => self.leaf(NodeKind::Other, other.span(), None),
        }
    }

    /// `name!(a, b)` as a call to `name!`.
    fn macro_call(&mut self, mac: &syn::Macro, span: TokenSpan, depth: usize) -> NodeId {
        let name = format!("{}!", path_text(&mac.path));
        let function = self.leaf(NodeKind::Identifier, mac.path.span(), Some(name));
        let delimiter = match &mac.delimiter {
            MacroDelimiter::Paren(p) => p.span.join(),
            MacroDelimiter::Brace(b) => b.span.join(),
            MacroDelimiter::Bracket(b) => b.span.join(),
        };
        let args: Children = match mac.parse_body_with(Punctuated::<Expr, syn::Token![,]>::parse_terminated) {
            Ok(list) => list
                .iter()
                .map(|e| (None, self.expr(e, depth + 2)))
                .collect(),
            Err(_) => Vec::new(),
        };
        let arguments = self.node(NodeKind::Arguments, delimiter, None, args);
        self.node(
            NodeKind::Call,
            span,
            None,
            vec![(Some(Field::Function), function), (Some(Field::Arguments), arguments)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Tree {
        RustAdapter::new().parse("lib.rs", source).unwrap()
    }

    fn first(tree: &Tree, kind: NodeKind) -> NodeId {
        tree.preorder()
            .into_iter()
            .find(|n| tree.kind(*n) == kind)
            .unwrap()
    }

    #[test]
    fn test_macro_becomes_call_with_arguments() {
        let tree = parse("fn main() { info!(\"user {}\", user.email); }");
        let call = first(&tree, NodeKind::Call);
        let function = tree.child_by_field(call, Field::Function).unwrap();
        assert_eq!(tree.text(function), Some("info!"));
        let arguments = tree.child_by_field(call, Field::Arguments).unwrap();
        let kinds: Vec<_> = tree.children(arguments).iter().map(|c| tree.kind(*c)).collect();
        assert_eq!(kinds, vec![NodeKind::String, NodeKind::Member]);
    }

    #[test]
    fn test_method_call_callee_is_member() {
        let tree = parse("fn f(client: Client, user: User) { client.send(&user); }");
        let call = first(&tree, NodeKind::Call);
        let callee = tree.child_by_field(call, Field::Function).unwrap();
        assert_eq!(tree.kind(callee), NodeKind::Member);
        assert_eq!(tree.content(callee), "client.send");
    }

    #[test]
    fn test_struct_literal_is_named_object() {
        let tree = parse("fn f() { let u = User { email: e, ..Default::default() }; }");
        let object = first(&tree, NodeKind::Object);
        assert_eq!(tree.text(object), Some("User"));
        let kinds: Vec<_> = tree.children(object).iter().map(|c| tree.kind(*c)).collect();
        assert_eq!(kinds, vec![NodeKind::Pair, NodeKind::Spread]);
    }

    #[test]
    fn test_impl_block_is_class() {
        let tree = parse("impl Account { fn log(&self) { info!(\"{}\", self.email); } }");
        let class = first(&tree, NodeKind::Class);
        let name = tree.child_by_field(class, Field::Name).unwrap();
        assert_eq!(tree.text(name), Some("Account"));
    }

    #[test]
    fn test_spans_are_one_based() {
        let tree = parse("fn main() {\n    send(token);\n}\n");
        let call = first(&tree, NodeKind::Call);
        let span = tree.span(call);
        assert_eq!((span.line, span.column), (2, 5));
        assert_eq!(tree.content(call), "send(token)");
    }

    #[test]
    fn test_unparseable_file_yields_error_node() {
        let tree = parse("fn main( {");
        let kinds: Vec<_> = tree.preorder().into_iter().map(|n| tree.kind(n)).collect();
        assert_eq!(kinds, vec![NodeKind::Program, NodeKind::Error]);
    }

    #[test]
    fn test_deep_nesting_is_refused_before_parsing() {
        let source = format!(
            "fn main() {{ let x = {}1{}; }}",
            "(".repeat(5000),
            ")".repeat(5000)
        );
        let err = RustAdapter::new().parse("deep.rs", &source).unwrap_err();
        assert!(matches!(err, AnalysisError::DepthExceeded { limit: 512 }));

        let shallow = format!("fn main() {{ let x = {}1{}; }}", "(".repeat(8), ")".repeat(8));
        assert!(RustAdapter::with_max_depth(8).parse("a.rs", &shallow).is_err());
        assert!(RustAdapter::with_max_depth(9).parse("a.rs", &shallow).is_ok());
    }

    #[test]
    fn test_nesting_ignores_literals_and_comments() {
        assert_eq!(nesting_depth("fn f() { g(\"((((\", '(', b'[') }"), 2);
        assert_eq!(nesting_depth("// ((((\n/* (( /* (( */ */ fn f() {}"), 1);
        assert_eq!(nesting_depth("fn f<'a>(x: &'a str) { r#\"{{{\"#; }"), 1);
        assert_eq!(nesting_depth("f(\"\\\"(\")"), 1);
        assert_eq!(nesting_depth("f('\\'', '(')"), 1);
    }

    #[test]
    fn test_statement_pattern_parses_in_block() {
        let tree = RustAdapter::new()
            .parse_pattern("let SentinelVar0 = SentinelVar1;")
            .unwrap();
        assert_eq!(tree.kind(first(&tree, NodeKind::Declaration)), NodeKind::Declaration);
    }
}
