use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::operators::MutationOperatorKind;

/// A location in a source file. The byte offset is authoritative; line and
/// column are 1-based and only used for ids and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourcePosition {
    pub byte_offset: u64,
    pub line: u32,
    pub column: u32,
}

/// Byte offsets of line starts, built once per file.
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex { starts }
    }

    pub fn position(&self, byte_offset: usize) -> SourcePosition {
        let line_idx = match self.starts.binary_search(&byte_offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        SourcePosition {
            byte_offset: byte_offset as u64,
            line: line_idx as u32 + 1,
            column: (byte_offset - self.starts[line_idx]) as u32 + 1,
        }
    }

    /// Byte offset of a 1-based line/column, clamped to the end of the text.
    pub fn offset(&self, line: u32, column: u32, text_len: usize) -> usize {
        let line_idx = (line.max(1) - 1) as usize;
        match self.starts.get(line_idx) {
            Some(start) => (start + column.max(1) as usize - 1).min(text_len),
            None => text_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(String);

impl MutationId {
    pub fn new(stem: &str, position: SourcePosition) -> Self {
        MutationId(format!(
            "{}_{}_{}_{}",
            stem, position.line, position.column, position.byte_offset
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File stem reduced to characters legal in an identifier and an env var name.
pub fn sanitized_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut out: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// The mutated construct before and after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMutation {
    pub id: MutationId,
    pub operator: MutationOperatorKind,
    pub file_path: PathBuf,
    pub position: SourcePosition,
    /// Region text before substitution.
    pub original_text: String,
    /// Region text after substitution.
    pub mutated_text: String,
    pub description: String,
    /// Just the statement or token that changed, for display.
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestSuiteOutcome {
    Passed,
    Failed,
    BuildError,
    RuntimeError,
    TimedOut,
    NoCoverage,
}

impl TestSuiteOutcome {
    pub fn is_killed(self) -> bool {
        matches!(
            self,
            TestSuiteOutcome::Failed | TestSuiteOutcome::RuntimeError | TestSuiteOutcome::TimedOut
        )
    }

    /// Outcomes that take no part in the score denominator.
    pub fn is_untestable(self) -> bool {
        matches!(self, TestSuiteOutcome::BuildError | TestSuiteOutcome::NoCoverage)
    }
}

impl fmt::Display for TestSuiteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestSuiteOutcome::Passed => write!(f, "passed"),
            TestSuiteOutcome::Failed => write!(f, "failed"),
            TestSuiteOutcome::BuildError => write!(f, "build error"),
            TestSuiteOutcome::RuntimeError => write!(f, "runtime error"),
            TestSuiteOutcome::TimedOut => write!(f, "timed out"),
            TestSuiteOutcome::NoCoverage => write!(f, "no coverage"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationTestOutcome {
    pub candidate: CandidateMutation,
    pub result: TestSuiteOutcome,
    pub duration_ms: u64,
}
