use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::mutants::{MutationTestOutcome, TestSuiteOutcome};
use crate::orchestrator::{AbortReason, CampaignReport, CampaignState};

pub const STATE_FILE: &str = ".schemata-state.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Rounded percentage, or -1 when nothing ran.
    pub score: i32,
    pub total: usize,
    pub killed: usize,
    pub survived: usize,
    pub build_errors: usize,
    pub timed_out: usize,
    pub no_coverage: usize,
    /// `complete`, or `aborted: <reason>`.
    pub state: String,
    pub duration_ms: u64,
    pub file_scores: BTreeMap<String, i32>,
    pub survived_mutants: Vec<SurvivedMutant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivedMutant {
    pub ref_id: String,
    pub id: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub operator: String,
    pub description: String,
    pub diff: String,
}

pub fn describe_state(state: &CampaignState) -> String {
    match state {
        CampaignState::Complete => "complete".to_string(),
        CampaignState::Aborted(AbortReason::BaselineFailed { .. }) => "aborted: baseline failed".to_string(),
        CampaignState::Aborted(AbortReason::TooManyBuildErrors) => {
            "aborted: too many consecutive build errors".to_string()
        }
        CampaignState::Aborted(AbortReason::Cancelled) => "aborted: cancelled".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

/// Line diff of a mutant's before/after snippet.
pub fn generate_diff(original: &str, mutated: &str) -> String {
    use similar::TextDiff;
    let diff = TextDiff::from_lines(original, mutated);
    let mut output = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "-",
            similar::ChangeTag::Insert => "+",
            similar::ChangeTag::Equal => continue,
        };
        output.push_str(&format!("{} {}", sign, change));
    }
    output
}

fn survived_entry(index: usize, outcome: &MutationTestOutcome) -> SurvivedMutant {
    let c = &outcome.candidate;
    SurvivedMutant {
        ref_id: format!("m{}", index + 1),
        id: c.id.to_string(),
        file: c.file_path.display().to_string(),
        line: c.position.line,
        column: c.position.column,
        operator: c.operator.to_string(),
        description: c.description.clone(),
        diff: generate_diff(&c.snapshot.before, &c.snapshot.after),
    }
}

impl RunReport {
    pub fn from_campaign(report: &CampaignReport) -> Self {
        let count = |r| report.count(r);
        let killed = report.outcomes.iter().filter(|o| o.result.is_killed()).count();
        RunReport {
            score: report.score(),
            total: report.outcomes.len(),
            killed,
            survived: count(TestSuiteOutcome::Passed),
            build_errors: count(TestSuiteOutcome::BuildError),
            timed_out: count(TestSuiteOutcome::TimedOut),
            no_coverage: count(TestSuiteOutcome::NoCoverage),
            state: describe_state(&report.state),
            duration_ms: report.baseline_duration_ms + report.outcomes.iter().map(|o| o.duration_ms).sum::<u64>(),
            file_scores: report
                .scores_by_file()
                .into_iter()
                .map(|(path, score)| (path.display().to_string(), score))
                .collect(),
            survived_mutants: report
                .survivors()
                .enumerate()
                .map(|(i, o)| survived_entry(i, o))
                .collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == "complete"
    }
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_FILE)
}

pub fn save_to_path(report: &RunReport, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

pub fn load_from_path(path: &Path) -> Option<RunReport> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

pub fn save_last_run(root: &Path, report: &RunReport) -> std::io::Result<()> {
    save_to_path(report, &state_path(root))
}

pub fn load_last_run(root: &Path) -> Option<RunReport> {
    load_from_path(&state_path(root))
}
