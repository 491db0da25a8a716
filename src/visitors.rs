use std::collections::HashSet;
use tree_sitter::Node;

use crate::Language;
use crate::dialect;
use crate::exclusions::ExclusionSet;
use crate::mutants::Snapshot;
use crate::operators::{self, MutationOperatorKind, TextEdit};
use crate::schemata::CodeRegion;

pub struct FileContext<'a> {
    pub source: &'a str,
    pub language: Language,
    pub exclusions: &'a ExclusionSet,
    pub exclude_calls: &'a [String],
}

impl<'a> FileContext<'a> {
    pub fn text(&self, node: Node) -> &'a str {
        &self.source[node.start_byte()..node.end_byte()]
    }
}

/// A detected mutation site, before it is given an id.
#[derive(Debug, Clone)]
pub struct Site {
    pub kind: MutationOperatorKind,
    pub region: CodeRegion,
    /// Byte offset the site is identified by.
    pub anchor: usize,
    /// Absolute edit into the file text.
    pub edit: TextEdit,
    pub description: String,
    pub snapshot: Snapshot,
}

pub trait Visitor {
    fn kind(&self) -> MutationOperatorKind;

    /// Called once with the root before the walk.
    fn prepare(&mut self, _root: Node, _cx: &FileContext) {}

    fn visit(&mut self, node: Node, cx: &FileContext, sites: &mut Vec<Site>);
}

pub fn visitor_for(kind: MutationOperatorKind) -> Box<dyn Visitor> {
    match kind {
        MutationOperatorKind::RelationalOperatorReplacement => Box::new(RelationalVisitor),
        MutationOperatorKind::LogicalConnectorReplacement => Box::new(LogicalVisitor),
        MutationOperatorKind::TernaryOperatorSwap => Box::new(TernaryVisitor),
        MutationOperatorKind::RemoveSideEffects => Box::new(SideEffectsVisitor::default()),
    }
}

pub fn collect_sites(root: Node, visitor: &mut dyn Visitor, cx: &FileContext) -> Vec<Site> {
    visitor.prepare(root, cx);
    let mut sites = Vec::new();
    walk(root, visitor, cx, &mut sites);
    sites
}

fn walk(node: Node, visitor: &mut dyn Visitor, cx: &FileContext, sites: &mut Vec<Site>) {
    visitor.visit(node, cx, sites);
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            walk(child, visitor, cx, sites);
        }
    }
}

/// Build a site for `node`, or `None` when it or its anchor is excluded or
/// no rewritable region encloses it.
fn make_site(
    cx: &FileContext,
    kind: MutationOperatorKind,
    node: Node,
    anchor: Node,
    edit: TextEdit,
    description: String,
) -> Option<Site> {
    let excluded = |n: Node| cx.exclusions.is_excluded(n.start_byte(), n.end_byte());
    if excluded(anchor) || excluded(node) {
        return None;
    }
    let region = CodeRegion::enclosing(node, cx.language)?;
    if edit.start < region.start || edit.end > region.end {
        return None;
    }
    let before = cx.text(node).to_string();
    let local = edit.shifted_back(node.start_byte().min(edit.start));
    let after = if edit.start >= node.start_byte() && edit.end <= node.end_byte() {
        operators::apply_edit(&before, &local)
    } else {
        String::new()
    };
    Some(Site {
        kind,
        region,
        anchor: anchor.start_byte(),
        edit,
        description,
        snapshot: Snapshot { before, after },
    })
}

fn binary_operator<'a>(node: Node<'a>) -> Option<Node<'a>> {
    if node.kind() != "binary_expression" {
        return None;
    }
    node.child_by_field_name("operator")
}

pub struct RelationalVisitor;

impl Visitor for RelationalVisitor {
    fn kind(&self) -> MutationOperatorKind {
        MutationOperatorKind::RelationalOperatorReplacement
    }

    fn visit(&mut self, node: Node, cx: &FileContext, sites: &mut Vec<Site>) {
        let Some(op) = binary_operator(node) else { return };
        let op_text = cx.text(op);
        let Some(replacement) = operators::relational_replacement(op_text) else { return };
        if cx.language.is_rust() && (matches!(op_text, "===" | "!==") || inside_comparison_impl(node, cx)) {
            return;
        }
        let edit = TextEdit {
            start: op.start_byte(),
            end: op.end_byte(),
            replacement: replacement.to_string(),
        };
        let description = format!("changed {} to {}", op_text, replacement);
        sites.extend(make_site(cx, self.kind(), node, op, edit, description));
    }
}

const COMPARISON_TRAITS: &[&str] = &["PartialEq", "Eq", "PartialOrd", "Ord"];
const COMPARISON_FNS: &[&str] = &["eq", "ne", "lt", "le", "gt", "ge", "partial_cmp", "cmp"];

/// True inside the body of a method that defines a comparison operator.
fn inside_comparison_impl(node: Node, cx: &FileContext) -> bool {
    let mut current = node.parent();
    while let Some(n) = current {
        if n.kind() == "function_item" {
            let is_cmp_fn = n
                .child_by_field_name("name")
                .is_some_and(|name| COMPARISON_FNS.contains(&cx.text(name)));
            if !is_cmp_fn {
                return false;
            }
            let mut outer = n.parent();
            while let Some(o) = outer {
                if o.kind() == "impl_item" {
                    return o.child_by_field_name("trait").is_some_and(|t| {
                        let name = cx.text(t);
                        let name = name.split('<').next().unwrap_or(name);
                        COMPARISON_TRAITS.contains(&dialect::simple_name(name))
                    });
                }
                outer = o.parent();
            }
            return false;
        }
        current = n.parent();
    }
    false
}

pub struct LogicalVisitor;

impl Visitor for LogicalVisitor {
    fn kind(&self) -> MutationOperatorKind {
        MutationOperatorKind::LogicalConnectorReplacement
    }

    fn visit(&mut self, node: Node, cx: &FileContext, sites: &mut Vec<Site>) {
        let Some(op) = binary_operator(node) else { return };
        let op_text = cx.text(op);
        let Some(replacement) = operators::logical_replacement(op_text) else { return };
        let edit = TextEdit {
            start: op.start_byte(),
            end: op.end_byte(),
            replacement: replacement.to_string(),
        };
        let description = format!("changed {} to {}", op_text, replacement);
        sites.extend(make_site(cx, self.kind(), node, op, edit, description));
    }
}

pub struct TernaryVisitor;

const SIMPLE_JS: &[&str] = &[
    "identifier",
    "number",
    "string",
    "template_string",
    "true",
    "false",
    "null",
    "undefined",
    "this",
    "member_expression",
    "subscript_expression",
    "call_expression",
    "unary_expression",
    "array",
];

const SIMPLE_RUST: &[&str] = &[
    "identifier",
    "integer_literal",
    "float_literal",
    "string_literal",
    "raw_string_literal",
    "char_literal",
    "boolean_literal",
    "unit_expression",
    "field_expression",
    "scoped_identifier",
    "call_expression",
    "unary_expression",
    "reference_expression",
];

const CAST_KINDS: &[&str] = &[
    "type_cast_expression",
    "as_expression",
    "satisfies_expression",
    "type_assertion",
];

fn contains_cast(node: Node) -> bool {
    if CAST_KINDS.contains(&node.kind()) {
        return true;
    }
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .any(contains_cast)
}

fn is_simple(node: Node, language: Language) -> bool {
    let table = if language.is_rust() { SIMPLE_RUST } else { SIMPLE_JS };
    let node = if node.kind() == "parenthesized_expression" {
        match node.named_child(0) {
            Some(inner) => inner,
            None => return false,
        }
    } else {
        node
    };
    table.contains(&node.kind()) && !contains_cast(node)
}

/// The lone expression of a block such as `{ a }`.
fn sole_expression(block: Node) -> Option<Node> {
    let mut named = (0..block.named_child_count())
        .filter_map(|i| block.named_child(i))
        .filter(|c| !dialect::is_comment(*c));
    let first = named.next()?;
    if named.next().is_some() {
        return None;
    }
    Some(first)
}

impl TernaryVisitor {
    /// Branch expressions of `if c { a } else { b }`, when both are simple.
    fn rust_branches<'a>(node: Node<'a>) -> Option<(Node<'a>, Node<'a>)> {
        let condition = node.child_by_field_name("condition")?;
        if matches!(condition.kind(), "let_condition" | "let_chain") {
            return None;
        }
        let consequence = node.child_by_field_name("consequence")?;
        let else_clause = node.child_by_field_name("alternative")?;
        let alternative = (0..else_clause.named_child_count())
            .filter_map(|i| else_clause.named_child(i))
            .find(|c| c.kind() == "block")?;
        let a = sole_expression(consequence)?;
        let b = sole_expression(alternative)?;
        (is_simple(a, Language::Rust) && is_simple(b, Language::Rust)).then_some((a, b))
    }

    fn js_branches<'a>(node: Node<'a>, language: Language) -> Option<(Node<'a>, Node<'a>)> {
        let a = node.child_by_field_name("consequence")?;
        let b = node.child_by_field_name("alternative")?;
        (is_simple(a, language) && is_simple(b, language)).then_some((a, b))
    }
}

impl Visitor for TernaryVisitor {
    fn kind(&self) -> MutationOperatorKind {
        MutationOperatorKind::TernaryOperatorSwap
    }

    fn visit(&mut self, node: Node, cx: &FileContext, sites: &mut Vec<Site>) {
        let branches = match (cx.language, node.kind()) {
            (Language::Rust, "if_expression") => Self::rust_branches(node),
            (Language::Rust, _) => None,
            (_, "ternary_expression") => Self::js_branches(node, cx.language),
            _ => None,
        };
        let Some((a, b)) = branches else { return };
        let edit = operators::swap_spans(
            cx.source,
            (a.start_byte(), a.end_byte()),
            (b.start_byte(), b.end_byte()),
        );
        let description = format!("swapped branches {} and {}", cx.text(a), cx.text(b));
        sites.extend(make_site(cx, self.kind(), node, node, edit, description));
    }
}

/// Removes call statements whose result is discarded.
#[derive(Default)]
pub struct SideEffectsVisitor {
    sync_receivers: HashSet<String>,
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Strip `?` and `.await` wrappers down to the call underneath.
fn unwrap_call(node: Node) -> Option<Node> {
    match node.kind() {
        "call_expression" => Some(node),
        "try_expression" | "await_expression" | "parenthesized_expression" => unwrap_call(node.named_child(0)?),
        _ => None,
    }
}

impl SideEffectsVisitor {
    fn track_receivers(&mut self, node: Node, cx: &FileContext) {
        let binding = match node.kind() {
            "let_declaration" => node
                .child_by_field_name("pattern")
                .zip(node.child_by_field_name("value")),
            "variable_declarator" => node
                .child_by_field_name("name")
                .zip(node.child_by_field_name("value")),
            _ => None,
        };
        if let Some((pattern, value)) = binding {
            let value = compact(cx.text(value));
            if dialect::SYNC_CONSTRUCTORS
                .iter()
                .any(|ctor| value.contains(&compact(ctor)))
            {
                let name = cx.text(pattern).trim_start_matches("mut ").trim().to_string();
                self.sync_receivers.insert(name);
            }
        }
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.track_receivers(child, cx);
            }
        }
    }

    /// The call a statement exists only to perform, if any.
    fn discarded_call<'a>(statement: Node<'a>, cx: &FileContext) -> Option<Node<'a>> {
        match statement.kind() {
            "let_declaration" => {
                let pattern = statement.child_by_field_name("pattern")?;
                if cx.text(pattern) != "_" || statement.child_by_field_name("type").is_some() {
                    return None;
                }
                unwrap_call(statement.child_by_field_name("value")?)
            }
            "expression_statement" => {
                let expr = statement.named_child(0)?;
                match expr.kind() {
                    "assignment_expression" => {
                        let left = expr.child_by_field_name("left")?;
                        if cx.text(left) != "_" {
                            return None;
                        }
                        unwrap_call(expr.child_by_field_name("right")?)
                    }
                    "unary_expression" if !cx.language.is_rust() => {
                        let op = expr.child_by_field_name("operator")?;
                        if cx.text(op) != "void" {
                            return None;
                        }
                        unwrap_call(expr.child_by_field_name("argument")?)
                    }
                    _ => unwrap_call(expr),
                }
            }
            _ => None,
        }
    }

    fn is_protected(&self, callee: &str, cx: &FileContext) -> bool {
        let name = dialect::simple_name(callee);
        if dialect::never_returns(cx.language, callee)
            || dialect::never_returns(cx.language, name)
            || dialect::is_printing(cx.language, callee)
            || dialect::releases_guard(cx.language, callee)
        {
            return true;
        }
        if cx
            .exclude_calls
            .iter()
            .any(|excluded| excluded == callee || excluded == name)
        {
            return true;
        }
        if dialect::SYNC_METHODS.contains(&name)
            || dialect::SYNC_METHODS
                .iter()
                .any(|m| callee.contains(&format!(".{}(", m)))
        {
            return true;
        }
        match dialect::receiver(callee) {
            Some(receiver) => self
                .sync_receivers
                .iter()
                .any(|r| receiver == r || receiver.starts_with(&format!("{}.", r))),
            None => false,
        }
    }
}

impl Visitor for SideEffectsVisitor {
    fn kind(&self) -> MutationOperatorKind {
        MutationOperatorKind::RemoveSideEffects
    }

    fn prepare(&mut self, root: Node, cx: &FileContext) {
        self.track_receivers(root, cx);
    }

    fn visit(&mut self, node: Node, cx: &FileContext, sites: &mut Vec<Site>) {
        let Some(parent) = node.parent() else { return };
        if parent.kind() != dialect::region_kind(cx.language) {
            return;
        }
        let Some(call) = Self::discarded_call(node, cx) else { return };
        let Some(function) = call.child_by_field_name("function") else { return };
        let callee = compact(cx.text(function));
        if self.is_protected(&callee, cx) {
            return;
        }
        let edit = if cx.language.is_rust() {
            // Still type-checked, so locals keep the types this call inferred.
            TextEdit {
                start: node.start_byte(),
                end: node.end_byte(),
                replacement: format!("if false {{ {} }}", cx.text(node)),
            }
        } else {
            operators::removal_edit(cx.source, node.start_byte(), node.end_byte())
        };
        let description = format!("removed call to {}", callee);
        sites.extend(make_site(cx, self.kind(), node, node, edit, description));
    }
}
