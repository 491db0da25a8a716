use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MutationOperatorKind {
    RelationalOperatorReplacement,
    LogicalConnectorReplacement,
    TernaryOperatorSwap,
    RemoveSideEffects,
}

impl MutationOperatorKind {
    pub const ALL: [MutationOperatorKind; 4] = [
        MutationOperatorKind::RelationalOperatorReplacement,
        MutationOperatorKind::LogicalConnectorReplacement,
        MutationOperatorKind::TernaryOperatorSwap,
        MutationOperatorKind::RemoveSideEffects,
    ];

    /// Short name used on the command line, in config files and log names.
    pub fn name(self) -> &'static str {
        match self {
            MutationOperatorKind::RelationalOperatorReplacement => "relational",
            MutationOperatorKind::LogicalConnectorReplacement => "logical",
            MutationOperatorKind::TernaryOperatorSwap => "ternary",
            MutationOperatorKind::RemoveSideEffects => "side_effects",
        }
    }
}

impl fmt::Display for MutationOperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MutationOperatorKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        MutationOperatorKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted || format!("{:?}", k).to_ascii_lowercase() == wanted)
            .ok_or_else(|| EngineError::UnknownOperator(s.to_string()))
    }
}

/// Parse a list of operator names; an empty list selects every operator.
pub fn parse_operator_list(names: &[String]) -> Result<Vec<MutationOperatorKind>, EngineError> {
    if names.is_empty() {
        return Ok(MutationOperatorKind::ALL.to_vec());
    }
    let mut kinds = Vec::new();
    for name in names {
        let kind: MutationOperatorKind = name.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    kinds.sort();
    Ok(kinds)
}

pub fn relational_replacement(op_text: &str) -> Option<&'static str> {
    match op_text {
        "==" => Some("!="),
        "!=" => Some("=="),
        ">=" => Some("<="),
        "<=" => Some(">="),
        "<" => Some(">"),
        ">" => Some("<"),
        "===" => Some("!=="),
        "!==" => Some("==="),
        _ => None,
    }
}

pub fn logical_replacement(op_text: &str) -> Option<&'static str> {
    match op_text {
        "&&" => Some("||"),
        "||" => Some("&&"),
        _ => None,
    }
}

/// A replacement of `start..end` with `replacement`. Offsets are relative to
/// whatever text the edit is applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl TextEdit {
    pub fn shifted_back(&self, base: usize) -> TextEdit {
        TextEdit {
            start: self.start - base,
            end: self.end - base,
            replacement: self.replacement.clone(),
        }
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

pub fn apply_edit(text: &str, edit: &TextEdit) -> String {
    let mut result = String::with_capacity(text.len() + edit.replacement.len());
    result.push_str(&text[..edit.start]);
    result.push_str(&edit.replacement);
    result.push_str(&text[edit.end..]);
    result
}

/// Swap two disjoint spans, keeping the text between them.
pub fn swap_spans(source: &str, first: (usize, usize), second: (usize, usize)) -> TextEdit {
    let mut replacement = String::new();
    replacement.push_str(&source[second.0..second.1]);
    replacement.push_str(&source[first.1..second.0]);
    replacement.push_str(&source[first.0..first.1]);
    TextEdit {
        start: first.0,
        end: second.1,
        replacement,
    }
}

/// Delete a statement. When it is alone on its line(s) the whole line goes,
/// including the newline, so no blank line is left behind.
pub fn removal_edit(source: &str, start: usize, end: usize) -> TextEdit {
    let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[end..].find('\n').map(|i| end + i).unwrap_or(source.len());
    let alone = source[line_start..start].trim().is_empty() && source[end..line_end].trim().is_empty();
    if alone && line_end < source.len() {
        TextEdit {
            start: line_start,
            end: line_end + 1,
            replacement: String::new(),
        }
    } else {
        TextEdit {
            start,
            end,
            replacement: String::new(),
        }
    }
}

/// Smallest edit turning `original` into `mutated`, on char boundaries.
pub fn diff_span(original: &str, mutated: &str) -> TextEdit {
    let a = original.as_bytes();
    let b = mutated.as_bytes();
    let mut prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    while !original.is_char_boundary(prefix) || !mutated.is_char_boundary(prefix) {
        prefix -= 1;
    }
    let max_suffix = (a.len() - prefix).min(b.len() - prefix);
    let mut suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();
    while !original.is_char_boundary(a.len() - suffix) || !mutated.is_char_boundary(b.len() - suffix) {
        suffix -= 1;
    }
    TextEdit {
        start: prefix,
        end: a.len() - suffix,
        replacement: mutated[prefix..b.len() - suffix].to_string(),
    }
}

/// Rewrite a region's text for one site. `edit` carries absolute offsets and
/// `region_start` is where the region text begins in the file.
pub fn rewrite(region_text: &str, region_start: usize, edit: &TextEdit) -> String {
    apply_edit(region_text, &edit.shifted_back(region_start))
}
