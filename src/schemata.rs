use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tree_sitter::Node;

use crate::Language;
use crate::dialect;
use crate::error::{EngineError, Result};
use crate::mutants::{CandidateMutation, LineIndex, MutationId};
use crate::operators::{self, TextEdit};

/// Inner span of a brace-delimited statement list, between `{` and `}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeRegion {
    pub start: usize,
    pub end: usize,
}

impl CodeRegion {
    /// Smallest rewritable region enclosing `node`. In Rust the body of an
    /// expression closure is a region too, and a block whose value may have
    /// a closure or async block type is passed over.
    pub fn enclosing(node: Node, language: Language) -> Option<CodeRegion> {
        let kind = dialect::region_kind(language);
        let mut child = node;
        let mut current = node.parent();
        while let Some(n) = current {
            if n.kind() == kind {
                if !language.is_rust() || !yields_anonymous_type(n) {
                    if let Some(region) = Self::inner(n) {
                        return Some(region);
                    }
                }
            } else if language.is_rust()
                && n.kind() == "closure_expression"
                && child.kind() != "block"
                && n.child_by_field_name("body") == Some(child)
                && !anonymous_typed(child)
            {
                return Some(CodeRegion {
                    start: child.start_byte(),
                    end: child.end_byte(),
                });
            }
            child = n;
            current = n.parent();
        }
        None
    }

    fn inner(block: Node) -> Option<CodeRegion> {
        let children: Vec<Node> = (0..block.child_count()).filter_map(|i| block.child(i)).collect();
        let open = children.iter().find(|c| c.kind() == "{")?;
        let close = children.iter().rev().find(|c| c.kind() == "}")?;
        (open.end_byte() <= close.start_byte()).then(|| CodeRegion {
            start: open.end_byte(),
            end: close.start_byte(),
        })
    }

    pub fn contains(&self, other: &CodeRegion) -> bool {
        self.start <= other.start && other.end <= self.end && self != other
    }
}

// Every closure and async block has its own type, so two copies of one in
// the branches of an `if` do not unify.

/// Final expression of a block, the one that gives the block its value.
fn tail_expression(block: Node) -> Option<Node> {
    let last = (0..block.named_child_count())
        .rev()
        .filter_map(|i| block.named_child(i))
        .find(|c| !dialect::is_comment(*c))?;
    let kind = last.kind();
    let statement = kind.ends_with("_statement") || kind.ends_with("_declaration") || kind.ends_with("_item");
    (!statement).then_some(last)
}

fn anonymous_typed(node: Node) -> bool {
    match node.kind() {
        "closure_expression" | "async_block" => true,
        "block" => tail_expression(node).is_some_and(anonymous_typed),
        _ => (0..node.named_child_count())
            .filter_map(|i| node.named_child(i))
            .any(anonymous_typed),
    }
}

/// True when a `return` below `node`, outside nested closures and items,
/// may return an anonymous type.
fn returns_anonymous(node: Node) -> bool {
    (0..node.named_child_count())
        .filter_map(|i| node.named_child(i))
        .any(|c| match c.kind() {
            "closure_expression" | "async_block" | "function_item" => false,
            "return_expression" => c.named_child(0).is_some_and(anonymous_typed),
            _ => returns_anonymous(c),
        })
}

fn yields_anonymous_type(block: Node) -> bool {
    tail_expression(block).is_some_and(anonymous_typed) || returns_anonymous(block)
}

type RegionMap = BTreeMap<CodeRegion, Vec<CandidateMutation>>;

/// file -> region -> candidates. Candidate lists are never empty and are kept
/// sorted, so merging is order independent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemataMapping {
    files: BTreeMap<PathBuf, RegionMap>,
}

fn candidate_order(a: &CandidateMutation, b: &CandidateMutation) -> std::cmp::Ordering {
    (a.position.byte_offset, a.operator, &a.id).cmp(&(b.position.byte_offset, b.operator, &b.id))
}

impl SchemataMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, region: CodeRegion, candidate: CandidateMutation) {
        let list = self
            .files
            .entry(candidate.file_path.clone())
            .or_default()
            .entry(region)
            .or_default();
        if !list.contains(&candidate) {
            list.push(candidate);
            list.sort_by(candidate_order);
        }
    }

    pub fn merge(mut self, other: SchemataMapping) -> SchemataMapping {
        for (_, regions) in other.files {
            for (region, candidates) in regions {
                for candidate in candidates {
                    self.insert(region, candidate);
                }
            }
        }
        self
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(|p| p.as_path())
    }

    pub fn regions(&self, path: &Path) -> Option<&BTreeMap<CodeRegion, Vec<CandidateMutation>>> {
        self.files.get(path)
    }

    /// All candidates in discovery order: by file, then by position.
    pub fn candidates(&self) -> Vec<&CandidateMutation> {
        let mut all = Vec::new();
        for regions in self.files.values() {
            let mut in_file: Vec<&CandidateMutation> = regions.values().flatten().collect();
            in_file.sort_by(|a, b| candidate_order(a, b));
            all.extend(in_file);
        }
        all
    }

    pub fn len(&self) -> usize {
        self.files.values().flat_map(|r| r.values()).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat records for persistence.
    pub fn to_records(&self) -> Vec<RegionRecord> {
        self.files
            .iter()
            .flat_map(|(path, regions)| {
                regions.iter().map(move |(region, candidates)| RegionRecord {
                    file: path.clone(),
                    region: *region,
                    candidates: candidates.clone(),
                })
            })
            .collect()
    }
}

/// Merge per-operator mappings into one mapping keyed by file.
pub fn merge_by_file(mappings: impl IntoIterator<Item = SchemataMapping>) -> SchemataMapping {
    mappings.into_iter().fold(SchemataMapping::new(), SchemataMapping::merge)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRecord {
    pub file: PathBuf,
    pub region: CodeRegion,
    pub candidates: Vec<CandidateMutation>,
}

enum Mode<'m> {
    Switch {
        language: Language,
        template: Option<&'m str>,
    },
    Resolve(Option<&'m MutationId>),
}

struct RegionNode<'m> {
    region: CodeRegion,
    candidates: &'m [CandidateMutation],
    children: Vec<usize>,
}

/// Containment forest over a file's regions, stored in an arena.
struct Forest<'m> {
    source: &'m str,
    nodes: Vec<RegionNode<'m>>,
    roots: Vec<usize>,
}

impl<'m> Forest<'m> {
    fn build(source: &'m str, path: &Path, regions: &'m RegionMap) -> Result<Self> {
        let mut ordered: Vec<(&CodeRegion, &Vec<CandidateMutation>)> = regions.iter().collect();
        ordered.sort_by_key(|(r, _)| (r.start, std::cmp::Reverse(r.end)));

        let mut nodes: Vec<RegionNode> = Vec::with_capacity(ordered.len());
        let mut roots = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        for (region, candidates) in ordered {
            if region.end > source.len() || !source.is_char_boundary(region.start) || !source.is_char_boundary(region.end) {
                return Err(EngineError::RewriteInvalid {
                    path: path.to_path_buf(),
                    diagnostic: format!("region {}..{} is outside the file", region.start, region.end),
                });
            }
            let text = &source[region.start..region.end];
            if let Some(stale) = candidates.iter().find(|c| c.original_text != text) {
                return Err(EngineError::RewriteInvalid {
                    path: path.to_path_buf(),
                    diagnostic: format!("{} was discovered against different source text", stale.id),
                });
            }
            while let Some(&top) = stack.last() {
                if nodes[top].region.contains(region) {
                    break;
                }
                stack.pop();
            }
            let idx = nodes.len();
            match stack.last() {
                Some(&parent) => nodes[parent].children.push(idx),
                None => roots.push(idx),
            }
            nodes.push(RegionNode {
                region: *region,
                candidates,
                children: Vec::new(),
            });
            stack.push(idx);
        }
        Ok(Forest { source, nodes, roots })
    }

    /// Splice rendered children and at most one edit into `start..end`.
    /// Children overlapped by the edit stay as raw text.
    fn splice(&self, start: usize, end: usize, children: &[(CodeRegion, String)], edit: Option<&TextEdit>) -> String {
        let mut pieces: Vec<(usize, usize, &str)> = children
            .iter()
            .filter(|(r, _)| edit.is_none_or(|e| !e.overlaps(r.start, r.end)))
            .map(|(r, text)| (r.start, r.end, text.as_str()))
            .collect();
        if let Some(e) = edit {
            pieces.push((e.start, e.end, e.replacement.as_str()));
        }
        pieces.sort_by_key(|p| (p.0, p.1));

        let mut out = String::with_capacity(end - start);
        let mut cursor = start;
        for (s, e, text) in pieces {
            out.push_str(&self.source[cursor..s]);
            out.push_str(text);
            cursor = e;
        }
        out.push_str(&self.source[cursor..end]);
        out
    }

    fn render(&self, idx: usize, mode: &Mode) -> String {
        let node = &self.nodes[idx];
        let region = node.region;
        let children: Vec<(CodeRegion, String)> = node
            .children
            .iter()
            .map(|&c| (self.nodes[c].region, self.render(c, mode)))
            .collect();
        let edit_for = |c: &CandidateMutation| {
            let local = operators::diff_span(&c.original_text, &c.mutated_text);
            TextEdit {
                start: local.start + region.start,
                end: local.end + region.start,
                replacement: local.replacement,
            }
        };

        match mode {
            Mode::Resolve(active) => {
                let chosen = node.candidates.iter().find(|c| Some(&c.id) == *active);
                let edit = chosen.map(edit_for);
                self.splice(region.start, region.end, &children, edit.as_ref())
            }
            Mode::Switch { language, template } => {
                let mut out = String::new();
                for c in node.candidates {
                    let branch = self.splice(region.start, region.end, &children, Some(&edit_for(c)));
                    let check = dialect::activation_check(*language, *template, c.id.as_str());
                    out.push_str(&format!("if {} {{{}}} else ", dialect::condition(*language, &check), branch));
                }
                let original = self.splice(region.start, region.end, &children, None);
                out.push_str(&format!("{{{}}}", original));
                out
            }
        }
    }

    fn render_file(&self, mode: &Mode) -> String {
        let roots: Vec<(CodeRegion, String)> = self
            .roots
            .iter()
            .map(|&r| (self.nodes[r].region, self.render(r, mode)))
            .collect();
        self.splice(0, self.source.len(), &roots, None)
    }
}

/// Rewrite `source` so every candidate in `mapping` is selectable at runtime.
/// Regions are rendered innermost first; text outside regions is untouched.
pub fn apply_schemata(
    source: &str,
    path: &Path,
    language: Language,
    mapping: &SchemataMapping,
    template: Option<&str>,
) -> Result<String> {
    let Some(regions) = mapping.regions(path) else {
        return Ok(source.to_string());
    };
    let forest = Forest::build(source, path, regions)?;
    Ok(forest.render_file(&Mode::Switch { language, template }))
}

/// The text the instrumented file behaves as when `active` is the only
/// active id. `None` reproduces `source` exactly.
pub fn resolve(source: &str, path: &Path, mapping: &SchemataMapping, active: Option<&MutationId>) -> Result<String> {
    let Some(regions) = mapping.regions(path) else {
        return Ok(source.to_string());
    };
    let forest = Forest::build(source, path, regions)?;
    Ok(forest.render_file(&Mode::Resolve(active)))
}

/// Reparse instrumented output; a syntax error is reported with its location.
pub fn validate(instrumented: &str, path: &Path, language: Language) -> Result<()> {
    let tree = dialect::parse(instrumented, language)?.ok_or_else(|| EngineError::RewriteInvalid {
        path: path.to_path_buf(),
        diagnostic: "parser produced no tree".to_string(),
    })?;
    let root = tree.root_node();
    if !root.has_error() {
        return Ok(());
    }
    let offset = first_error(root).map(|n| n.start_byte()).unwrap_or(0);
    let pos = LineIndex::new(instrumented).position(offset);
    Err(EngineError::RewriteInvalid {
        path: path.to_path_buf(),
        diagnostic: format!("syntax error at line {}, column {}", pos.line, pos.column),
    })
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .filter(|c| c.has_error())
        .find_map(first_error)
}
