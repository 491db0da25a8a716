use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Tree};

use crate::Language;
use crate::dialect;
use crate::mutants::LineIndex;

pub const SKIP_MARKER: &str = "schemata:skip";
pub const DISABLE_MARKER: &str = "schemata:disable";
pub const ENABLE_MARKER: &str = "schemata:enable";

/// A zero-coverage range reported by an external coverage tool. Lines and
/// columns are 1-based; the end is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRegion {
    pub path: PathBuf,
    pub line_start: u32,
    pub column_start: u32,
    pub line_end: u32,
    pub column_end: u32,
}

impl CoverageRegion {
    fn applies_to(&self, path: &Path) -> bool {
        self.path == path || path.ends_with(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusionZone {
    Line {
        path: PathBuf,
        line: u32,
    },
    Range {
        path: PathBuf,
        line_start: u32,
        column_start: u32,
        line_end: u32,
        column_end: u32,
    },
}

#[derive(Debug, Default)]
pub struct ExclusionSet {
    excluded: HashSet<(usize, usize)>,
    zones: Vec<ExclusionZone>,
    file_disabled: bool,
}

impl ExclusionSet {
    /// True when the node spanning `start..end` must not be mutated.
    pub fn is_excluded(&self, start: usize, end: usize) -> bool {
        self.file_disabled || self.excluded.contains(&(start, end))
    }

    pub fn zones(&self) -> &[ExclusionZone] {
        &self.zones
    }

    pub fn file_disabled(&self) -> bool {
        self.file_disabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Skip,
    Disable,
    Enable,
}

fn marker(comment: &str) -> Option<Marker> {
    if comment.contains(DISABLE_MARKER) {
        Some(Marker::Disable)
    } else if comment.contains(ENABLE_MARKER) {
        Some(Marker::Enable)
    } else if comment.contains(SKIP_MARKER) {
        Some(Marker::Skip)
    } else {
        None
    }
}

struct Resolver<'a> {
    source: &'a str,
    language: Language,
    path: &'a Path,
    lines: LineIndex,
    uncovered: Vec<(usize, usize)>,
    set: ExclusionSet,
}

/// Walk the tree once and collect the span of every node that is off limits.
/// Must complete before any operator visitor runs.
pub fn resolve_exclusions(
    tree: &Tree,
    source: &str,
    language: Language,
    path: &Path,
    coverage: &[CoverageRegion],
) -> ExclusionSet {
    let lines = LineIndex::new(source);
    let uncovered = coverage
        .iter()
        .filter(|r| r.applies_to(path))
        .map(|r| {
            (
                lines.offset(r.line_start, r.column_start, source.len()),
                lines.offset(r.line_end, r.column_end, source.len()),
            )
        })
        .collect();

    let mut resolver = Resolver {
        source,
        language,
        path,
        lines,
        uncovered,
        set: ExclusionSet::default(),
    };

    for r in coverage.iter().filter(|r| r.applies_to(path)) {
        resolver.set.zones.push(ExclusionZone::Range {
            path: path.to_path_buf(),
            line_start: r.line_start,
            column_start: r.column_start,
            line_end: r.line_end,
            column_end: r.column_end,
        });
    }

    let root = tree.root_node();
    // The root walk records the disabled range itself.
    resolver.set.file_disabled = resolver.leading_disable(root);
    resolver.visit(root, false);
    resolver.set
}

impl<'a> Resolver<'a> {
    fn text(&self, node: Node) -> &'a str {
        &self.source[node.start_byte()..node.end_byte()]
    }

    fn push_range(&mut self, start: usize, end: usize) {
        let s = self.lines.position(start);
        let e = self.lines.position(end);
        self.set.zones.push(ExclusionZone::Range {
            path: self.path.to_path_buf(),
            line_start: s.line,
            column_start: s.column,
            line_end: e.line,
            column_end: e.column,
        });
    }

    /// A disable marker before any code, never re-enabled at file level.
    fn leading_disable(&self, root: Node) -> bool {
        let mut seen_disable = false;
        for i in 0..root.child_count() {
            let Some(child) = root.child(i) else { continue };
            if !dialect::is_comment(child) {
                if !seen_disable {
                    return false;
                }
                continue;
            }
            match marker(self.text(child)) {
                Some(Marker::Disable) => seen_disable = true,
                Some(Marker::Enable) if seen_disable => return false,
                _ => {}
            }
        }
        seen_disable
    }

    fn visit(&mut self, node: Node, inherited: bool) {
        let disabled = inherited || self.is_compile_time(node);
        let start = node.start_byte();
        if disabled || self.uncovered.iter().any(|&(s, e)| start >= s && start < e) {
            self.set.excluded.insert((start, node.end_byte()));
        }

        let children: Vec<Node> = (0..node.child_count()).filter_map(|i| node.child(i)).collect();
        let skipped = self.skipped_children(&children);

        let mut depth = 0usize;
        let mut open_at = None;
        for (i, child) in children.iter().enumerate() {
            if dialect::is_comment(*child) {
                match marker(self.text(*child)) {
                    Some(Marker::Disable) => {
                        depth += 1;
                        open_at.get_or_insert(child.start_byte());
                    }
                    // Unmatched enables are ignored.
                    Some(Marker::Enable) if depth > 0 => {
                        depth -= 1;
                        if depth == 0 {
                            if let Some(from) = open_at.take() {
                                self.push_range(from, child.end_byte());
                            }
                        }
                    }
                    _ => {}
                }
            }
            let const_child = node
                .field_name_for_child(i as u32)
                .is_some_and(|field| self.is_const_field(node.kind(), field));
            self.visit(*child, disabled || depth > 0 || skipped.contains(&i) || const_child);
        }
        if let Some(from) = open_at {
            self.push_range(from, node.end_byte());
        }
    }

    /// Indices of children covered by a skip marker or a test attribute.
    fn skipped_children(&mut self, children: &[Node]) -> HashSet<usize> {
        let mut skipped = HashSet::new();
        for (i, child) in children.iter().enumerate() {
            if dialect::is_comment(*child) && marker(self.text(*child)) == Some(Marker::Skip) {
                let previous = children[..i]
                    .iter()
                    .rposition(|c| c.is_named() && !dialect::is_comment(*c))
                    .filter(|&j| children[j].end_position().row == child.start_position().row);
                let target = previous.or_else(|| next_code_sibling(children, i, false));
                if let Some(j) = target {
                    let line = self.lines.position(children[j].start_byte()).line;
                    self.set.zones.push(ExclusionZone::Line {
                        path: self.path.to_path_buf(),
                        line,
                    });
                    skipped.insert(j);
                }
            } else if self.language.is_rust()
                && child.kind() == "attribute_item"
                && is_test_attribute(self.text(*child))
            {
                if let Some(j) = next_code_sibling(children, i, true) {
                    self.push_range(children[j].start_byte(), children[j].end_byte());
                    skipped.insert(j);
                }
            }
        }
        skipped
    }

    /// Contexts evaluated at compile time, where a runtime switch is illegal.
    fn is_compile_time(&self, node: Node) -> bool {
        if !self.language.is_rust() {
            return false;
        }
        match node.kind() {
            "const_item" | "static_item" | "const_block" | "type_arguments" | "where_clause"
            | "array_type" | "trait_bounds" | "type_parameters" | "attribute_item" => true,
            "function_item" => (0..node.child_count())
                .filter_map(|i| node.child(i))
                .any(|c| c.kind() == "function_modifiers" && self.text(c).contains("const")),
            _ => false,
        }
    }

    fn is_const_field(&self, parent_kind: &str, field: &str) -> bool {
        self.language.is_rust()
            && matches!((parent_kind, field), ("array_expression", "length") | ("enum_variant", "value"))
    }
}

fn next_code_sibling(children: &[Node], after: usize, skip_attributes: bool) -> Option<usize> {
    children
        .iter()
        .enumerate()
        .skip(after + 1)
        .find(|(_, c)| {
            c.is_named() && !dialect::is_comment(**c) && !(skip_attributes && c.kind() == "attribute_item")
        })
        .map(|(j, _)| j)
}

fn is_test_attribute(text: &str) -> bool {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    compact == "#[test]" || compact == "#[cfg(test)]" || compact.ends_with("::test]")
}
