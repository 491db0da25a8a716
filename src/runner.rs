use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::Language;
use crate::mutants::{MutationId, TestSuiteOutcome};

/// Set for every test run so instrumented code can tell it is under test.
pub const RUNNING_MARKER: &str = "SCHEMATA_RUNNING";

/// Which mutant, if any, the next test run should see. At most one id is
/// active; absent means baseline behaviour everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationContext {
    active: Option<MutationId>,
}

impl ActivationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&MutationId> {
        self.active.as_ref()
    }

    pub fn activate(&mut self, id: MutationId) {
        self.active = Some(id);
    }

    pub fn deactivate(&mut self) {
        self.active = None;
    }

    /// Environment entries a test process needs for this activation.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![(RUNNING_MARKER.to_string(), "1".to_string())];
        if let Some(id) = &self.active {
            vars.push((id.to_string(), "1".to_string()));
        }
        vars
    }
}

/// Activates an id for its lifetime and always deactivates on drop.
pub struct ActivationGuard<'a> {
    context: &'a mut ActivationContext,
}

impl<'a> ActivationGuard<'a> {
    pub fn activate(context: &'a mut ActivationContext, id: MutationId) -> Self {
        context.activate(id);
        ActivationGuard { context }
    }

    pub fn context(&self) -> &ActivationContext {
        self.context
    }
}

impl Drop for ActivationGuard<'_> {
    fn drop(&mut self) {
        self.context.deactivate();
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestRun {
    pub log: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub launch_failed: bool,
    pub duration_ms: u64,
}

pub trait TestExecutionService {
    fn run(&mut self, activation: &ActivationContext, timeout: Option<Duration>) -> TestRun;
}

pub trait OutcomeClassifier {
    fn classify(&self, run: &TestRun) -> TestSuiteOutcome;
}

/// Classifies a run by exit status and marker strings in its log.
#[derive(Debug, Clone)]
pub struct LogPatternClassifier {
    pub build_markers: Vec<String>,
    pub failure_markers: Vec<String>,
}

impl LogPatternClassifier {
    pub fn new(build_markers: Vec<String>, failure_markers: Vec<String>) -> Self {
        LogPatternClassifier {
            build_markers,
            failure_markers,
        }
    }

    pub fn for_language(language: Language) -> Self {
        let (build, failure): (&[&str], &[&str]) = match language {
            Language::Rust => (
                &["error[E", "could not compile"],
                &["test result: FAILED", "error: test failed"],
            ),
            _ => (
                &["SyntaxError", "error TS", "Cannot find module"],
                &["failing", "✕", "not ok ", "AssertionError", "Test failed"],
            ),
        };
        LogPatternClassifier::new(
            build.iter().map(|s| s.to_string()).collect(),
            failure.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl OutcomeClassifier for LogPatternClassifier {
    fn classify(&self, run: &TestRun) -> TestSuiteOutcome {
        if run.timed_out {
            return TestSuiteOutcome::TimedOut;
        }
        if run.launch_failed {
            return TestSuiteOutcome::BuildError;
        }
        if run.exit_code == Some(0) {
            return TestSuiteOutcome::Passed;
        }
        if self.failure_markers.iter().any(|m| run.log.contains(m.as_str())) {
            TestSuiteOutcome::Failed
        } else if self.build_markers.iter().any(|m| run.log.contains(m.as_str())) {
            TestSuiteOutcome::BuildError
        } else {
            TestSuiteOutcome::RuntimeError
        }
    }
}

pub fn parse_test_cmd(cmd: &str) -> (String, Vec<String>) {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    if parts.len() > 1 {
        (parts[0].to_string(), parts[1..].iter().map(|s| s.to_string()).collect())
    } else {
        (cmd.to_string(), vec![])
    }
}

/// Resolve a relative program path against the working directory first, then
/// the invoking directory. Bare names are left for PATH lookup.
pub fn resolve_program(program: &str, working_dir: &Path, cwd: &Path) -> String {
    let p = Path::new(program);
    if p.is_absolute() || !program.contains('/') {
        return program.to_string();
    }
    for base in [working_dir, cwd] {
        let candidate = base.join(p);
        if candidate.exists() {
            return candidate.to_string_lossy().to_string();
        }
    }
    program.to_string()
}

/// Runs a shell-free test command as a subprocess in `working_dir`. On unix
/// the command leads its own process group: a terminal interrupt stops only
/// the campaign, and a timeout kills the whole group.
pub struct CommandService {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

/// Kill the test command and everything it spawned, then reap it.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        if killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL).is_ok() {
            let _ = child.wait();
            return;
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

impl CommandService {
    pub fn new(test_cmd: &str, working_dir: &Path) -> Self {
        let (program, args) = parse_test_cmd(test_cmd);
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        CommandService {
            program: resolve_program(&program, working_dir, &cwd),
            args,
            working_dir: working_dir.to_path_buf(),
        }
    }

    fn launch_failure(&self, message: String, start: Instant) -> TestRun {
        TestRun {
            log: message,
            exit_code: None,
            timed_out: false,
            launch_failed: true,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

impl TestExecutionService for CommandService {
    fn run(&mut self, activation: &ActivationContext, timeout: Option<Duration>) -> TestRun {
        let start = Instant::now();
        // Output goes to a file so a chatty suite cannot fill a pipe and stall.
        let mut log_file = match tempfile::tempfile() {
            Ok(f) => f,
            Err(e) => return self.launch_failure(format!("Failed to create log file: {}", e), start),
        };
        let (stdout, stderr) = match (log_file.try_clone(), log_file.try_clone()) {
            (Ok(out), Ok(err)) => (out, err),
            (Err(e), _) | (_, Err(e)) => {
                return self.launch_failure(format!("Failed to create log file: {}", e), start);
            }
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        for (key, value) in activation.env_vars() {
            cmd.env(key, value);
        }
        isolate(&mut cmd);
        debug!(program = %self.program, active = ?activation.active(), "starting test run");

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return self.launch_failure(format!("Failed to run {}: {}", self.program, e), start),
        };

        let mut timed_out = false;
        let exit_code = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status.code(),
                Ok(None) => {
                    if timeout.is_some_and(|t| start.elapsed() > t) {
                        kill_tree(&mut child);
                        timed_out = true;
                        break None;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    kill_tree(&mut child);
                    return self.launch_failure(format!("Failed to wait for {}: {}", self.program, e), start);
                }
            }
        };

        let mut bytes = Vec::new();
        if log_file.seek(SeekFrom::Start(0)).is_ok() {
            let _ = log_file.read_to_end(&mut bytes);
        }
        TestRun {
            log: String::from_utf8_lossy(&bytes).to_string(),
            exit_code,
            timed_out,
            launch_failed: false,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}
