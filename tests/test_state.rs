use schemata::mutants::{CandidateMutation, MutationId, MutationTestOutcome, Snapshot, SourcePosition, TestSuiteOutcome};
use schemata::operators::MutationOperatorKind;
use schemata::orchestrator::{AbortReason, CampaignReport, CampaignState};
use schemata::state::{self, RunReport};
use std::path::PathBuf;
use tempfile::TempDir;

fn outcome(file: &str, line: u32, result: TestSuiteOutcome) -> MutationTestOutcome {
    let position = SourcePosition {
        byte_offset: line as u64 * 20,
        line,
        column: 9,
    };
    MutationTestOutcome {
        candidate: CandidateMutation {
            id: MutationId::new("lib", position),
            operator: MutationOperatorKind::RelationalOperatorReplacement,
            file_path: PathBuf::from(file),
            position,
            original_text: "\n    x > 0\n".to_string(),
            mutated_text: "\n    x < 0\n".to_string(),
            description: "changed > to <".to_string(),
            snapshot: Snapshot {
                before: "x > 0".to_string(),
                after: "x < 0".to_string(),
            },
        },
        result,
        duration_ms: 40,
    }
}

fn report(state: CampaignState, outcomes: Vec<MutationTestOutcome>) -> CampaignReport {
    CampaignReport {
        state,
        outcomes,
        baseline_duration_ms: 100,
    }
}

fn mixed() -> CampaignReport {
    use TestSuiteOutcome::*;
    report(
        CampaignState::Complete,
        vec![
            outcome("src/lib.rs", 3, Failed),
            outcome("src/lib.rs", 5, Passed),
            outcome("src/lib.rs", 8, BuildError),
            outcome("src/util.rs", 2, TimedOut),
            outcome("src/util.rs", 4, Passed),
        ],
    )
}

// --- RunReport ---

#[test]
fn report_counts_outcomes() {
    let run = RunReport::from_campaign(&mixed());
    assert_eq!(run.total, 5);
    assert_eq!(run.killed, 2);
    assert_eq!(run.survived, 2);
    assert_eq!(run.build_errors, 1);
    assert_eq!(run.timed_out, 1);
    assert_eq!(run.no_coverage, 0);
    assert_eq!(run.score, 50);
    assert_eq!(run.duration_ms, 100 + 5 * 40);
    assert!(run.is_complete());
}

#[test]
fn report_scores_each_file() {
    let run = RunReport::from_campaign(&mixed());
    assert_eq!(run.file_scores.get("src/lib.rs"), Some(&50));
    assert_eq!(run.file_scores.get("src/util.rs"), Some(&50));
}

#[test]
fn survivors_get_sequential_refs() {
    let run = RunReport::from_campaign(&mixed());
    let refs: Vec<&str> = run.survived_mutants.iter().map(|m| m.ref_id.as_str()).collect();
    assert_eq!(refs, vec!["m1", "m2"]);
    let first = &run.survived_mutants[0];
    assert_eq!(first.file, "src/lib.rs");
    assert_eq!(first.line, 5);
    assert_eq!(first.column, 9);
    assert_eq!(first.id, "lib_5_9_100");
    assert_eq!(first.operator, "relational");
    assert_eq!(first.diff, "- x > 0\n+ x < 0\n");
}

#[test]
fn aborted_state_is_described() {
    let cases = [
        (AbortReason::Cancelled, "aborted: cancelled"),
        (AbortReason::TooManyBuildErrors, "aborted: too many consecutive build errors"),
        (
            AbortReason::BaselineFailed {
                log: "boom".to_string(),
            },
            "aborted: baseline failed",
        ),
    ];
    for (reason, text) in cases {
        let run = RunReport::from_campaign(&report(CampaignState::Aborted(reason), vec![]));
        assert_eq!(run.state, text);
        assert!(!run.is_complete());
        assert_eq!(run.score, -1);
    }
}

#[test]
fn run_report_serializes_to_json() {
    let json = serde_json::to_string(&RunReport::from_campaign(&mixed())).unwrap();
    assert!(json.contains("\"score\":50"));
    assert!(json.contains("\"total\":5"));
    assert!(json.contains("\"ref_id\":\"m1\""));
    assert!(json.contains("\"state\":\"complete\""));
}

// --- generate_diff ---

#[test]
fn generate_diff_shows_changes() {
    let diff = state::generate_diff("a == b", "a != b");
    assert_eq!(diff, "- a == b\n+ a != b\n");
}

#[test]
fn generate_diff_identical_returns_empty() {
    assert!(state::generate_diff("same", "same").is_empty());
}

#[test]
fn generate_diff_removed_statement() {
    let diff = state::generate_diff("save();", "");
    assert_eq!(diff, "- save();\n");
}

// --- persistence ---

#[test]
fn save_and_load_last_run() {
    let dir = TempDir::new().unwrap();
    let run = RunReport::from_campaign(&mixed());
    state::save_last_run(dir.path(), &run).unwrap();

    assert!(dir.path().join(state::STATE_FILE).exists());
    let loaded = state::load_last_run(dir.path()).unwrap();
    assert_eq!(loaded.total, 5);
    assert_eq!(loaded.survived_mutants.len(), 2);
    assert_eq!(loaded.file_scores, run.file_scores);
}

#[test]
fn load_missing_state_returns_none() {
    let dir = TempDir::new().unwrap();
    assert!(state::load_last_run(dir.path()).is_none());
}

#[test]
fn load_corrupt_state_returns_none() {
    let dir = TempDir::new().unwrap();
    std::fs::write(state::state_path(dir.path()), "not json").unwrap();
    assert!(state::load_last_run(dir.path()).is_none());
}
