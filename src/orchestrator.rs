use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::mutants::{CandidateMutation, MutationTestOutcome, TestSuiteOutcome};
use crate::runner::{ActivationContext, ActivationGuard, OutcomeClassifier, TestExecutionService, TestRun};

/// Consecutive build errors after which the campaign is abandoned.
pub const BUILD_ERROR_THRESHOLD: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    BaselineFailed { log: String },
    TooManyBuildErrors,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    Idle,
    BaselineRunning,
    CampaignRunning,
    Complete,
    Aborted(AbortReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeoutPolicy {
    None,
    Fixed(Duration),
    /// Baseline duration times `multiplier`, plus `grace`.
    BaselineMultiple { multiplier: f64, grace: Duration },
}

impl TimeoutPolicy {
    pub fn per_mutant(&self, baseline_ms: u64) -> Option<Duration> {
        match *self {
            TimeoutPolicy::None => None,
            TimeoutPolicy::Fixed(d) => Some(d),
            TimeoutPolicy::BaselineMultiple { multiplier, grace } => {
                Some(Duration::from_millis((baseline_ms as f64 * multiplier) as u64) + grace)
            }
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        TimeoutPolicy::BaselineMultiple {
            multiplier: 3.0,
            grace: Duration::from_millis(2000),
        }
    }
}

/// Receives campaign progress. Every method defaults to doing nothing.
pub trait CampaignObserver {
    fn baseline_finished(&mut self, _run: &TestRun, _outcome: TestSuiteOutcome) {}
    fn mutant_started(&mut self, _candidate: &CandidateMutation, _index: usize, _total: usize) {}
    fn mutant_finished(&mut self, _outcome: &MutationTestOutcome, _run: &TestRun) {}
}

pub struct NoopObserver;

impl CampaignObserver for NoopObserver {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignReport {
    pub state: CampaignState,
    pub outcomes: Vec<MutationTestOutcome>,
    pub baseline_duration_ms: u64,
}

impl CampaignReport {
    pub fn score(&self) -> i32 {
        mutation_score(&self.outcomes)
    }

    pub fn scores_by_file(&self) -> BTreeMap<PathBuf, i32> {
        mutation_scores_by_file(&self.outcomes)
    }

    pub fn count(&self, result: TestSuiteOutcome) -> usize {
        self.outcomes.iter().filter(|o| o.result == result).count()
    }

    pub fn survivors(&self) -> impl Iterator<Item = &MutationTestOutcome> {
        self.outcomes.iter().filter(|o| o.result == TestSuiteOutcome::Passed)
    }
}

/// Percentage of testable mutants that were killed, rounded. `-1` when
/// nothing ran, `0` when nothing was testable.
pub fn mutation_score(outcomes: &[MutationTestOutcome]) -> i32 {
    score_of(outcomes.iter().map(|o| o.result))
}

fn score_of(results: impl Iterator<Item = TestSuiteOutcome>) -> i32 {
    let mut total = 0usize;
    let mut untestable = 0usize;
    let mut killed = 0usize;
    for r in results {
        total += 1;
        if r.is_untestable() {
            untestable += 1;
        } else if r.is_killed() {
            killed += 1;
        }
    }
    if total == 0 {
        return -1;
    }
    let denominator = total - untestable;
    if denominator == 0 {
        return 0;
    }
    (killed as f64 / denominator as f64 * 100.0).round() as i32
}

pub fn mutation_scores_by_file(outcomes: &[MutationTestOutcome]) -> BTreeMap<PathBuf, i32> {
    let mut by_file: BTreeMap<PathBuf, Vec<TestSuiteOutcome>> = BTreeMap::new();
    for o in outcomes {
        by_file.entry(o.candidate.file_path.clone()).or_default().push(o.result);
    }
    by_file
        .into_iter()
        .map(|(path, results)| (path, score_of(results.into_iter())))
        .collect()
}

pub struct Orchestrator<S, C> {
    service: S,
    classifier: C,
    timeout: TimeoutPolicy,
    build_error_threshold: usize,
    cancel: Arc<AtomicBool>,
    activation: ActivationContext,
    state: CampaignState,
    consecutive_build_errors: usize,
    outcomes: Vec<MutationTestOutcome>,
}

impl<S: TestExecutionService, C: OutcomeClassifier> Orchestrator<S, C> {
    pub fn new(service: S, classifier: C) -> Self {
        Orchestrator {
            service,
            classifier,
            timeout: TimeoutPolicy::default(),
            build_error_threshold: BUILD_ERROR_THRESHOLD,
            cancel: Arc::new(AtomicBool::new(false)),
            activation: ActivationContext::new(),
            state: CampaignState::Idle,
            consecutive_build_errors: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = timeout;
        self
    }

    /// Flag checked between iterations; setting it stops the campaign.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> &CampaignState {
        &self.state
    }

    pub fn activation(&self) -> &ActivationContext {
        &self.activation
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// A run killed by a signal after cancellation says nothing about the
    /// mutant and is dropped.
    fn interrupted(&self, run: &TestRun) -> bool {
        self.cancelled() && run.exit_code.is_none() && !run.timed_out && !run.launch_failed
    }

    fn finish(&mut self, state: CampaignState, baseline_duration_ms: u64) -> CampaignReport {
        self.state = state.clone();
        CampaignReport {
            state,
            outcomes: std::mem::take(&mut self.outcomes),
            baseline_duration_ms,
        }
    }

    /// Run the baseline, then every candidate in order, one at a time.
    pub fn run(&mut self, candidates: &[CandidateMutation], observer: &mut dyn CampaignObserver) -> CampaignReport {
        self.outcomes.clear();
        self.consecutive_build_errors = 0;
        self.activation.deactivate();

        if self.cancelled() {
            return self.finish(CampaignState::Aborted(AbortReason::Cancelled), 0);
        }

        self.state = CampaignState::BaselineRunning;
        let baseline_timeout = match self.timeout {
            TimeoutPolicy::Fixed(d) => Some(d),
            _ => None,
        };
        let baseline = self.service.run(&self.activation, baseline_timeout);
        if self.interrupted(&baseline) {
            warn!("campaign cancelled during baseline run");
            return self.finish(CampaignState::Aborted(AbortReason::Cancelled), baseline.duration_ms);
        }
        let baseline_outcome = self.classifier.classify(&baseline);
        observer.baseline_finished(&baseline, baseline_outcome);
        if baseline_outcome != TestSuiteOutcome::Passed {
            warn!(outcome = %baseline_outcome, "baseline run did not pass");
            return self.finish(
                CampaignState::Aborted(AbortReason::BaselineFailed { log: baseline.log }),
                baseline.duration_ms,
            );
        }
        info!(duration_ms = baseline.duration_ms, mutants = candidates.len(), "baseline passed");

        self.state = CampaignState::CampaignRunning;
        let timeout = self.timeout.per_mutant(baseline.duration_ms);
        let total = candidates.len();
        for (index, candidate) in candidates.iter().enumerate() {
            if self.cancelled() {
                warn!(tested = index, total, "campaign cancelled");
                return self.finish(CampaignState::Aborted(AbortReason::Cancelled), baseline.duration_ms);
            }
            observer.mutant_started(candidate, index, total);

            let run = {
                let guard = ActivationGuard::activate(&mut self.activation, candidate.id.clone());
                self.service.run(guard.context(), timeout)
            };
            if self.interrupted(&run) {
                warn!(id = %candidate.id, tested = index, total, "campaign cancelled mid-run");
                return self.finish(CampaignState::Aborted(AbortReason::Cancelled), baseline.duration_ms);
            }
            let result = self.classifier.classify(&run);
            info!(id = %candidate.id, outcome = %result, duration_ms = run.duration_ms, "mutant tested");

            let outcome = MutationTestOutcome {
                candidate: candidate.clone(),
                result,
                duration_ms: run.duration_ms,
            };
            observer.mutant_finished(&outcome, &run);
            self.outcomes.push(outcome);

            if result == TestSuiteOutcome::BuildError {
                self.consecutive_build_errors += 1;
                if self.consecutive_build_errors >= self.build_error_threshold {
                    warn!(count = self.consecutive_build_errors, "too many consecutive build errors");
                    return self.finish(
                        CampaignState::Aborted(AbortReason::TooManyBuildErrors),
                        baseline.duration_ms,
                    );
                }
            } else {
                self.consecutive_build_errors = 0;
            }
        }

        self.finish(CampaignState::Complete, baseline.duration_ms)
    }
}
