use schemata::config::ProjectConfig;
use schemata::copy_tree;
use schemata::exclusions::CoverageRegion;
use schemata::mutants::{CandidateMutation, MutationTestOutcome, TestSuiteOutcome};
use schemata::orchestrator::{AbortReason, CampaignObserver, CampaignState, Orchestrator, TimeoutPolicy};
use schemata::output;
use schemata::parser::{self, Discovery, DiscoveryOptions};
use schemata::runner::{CommandService, LogPatternClassifier, TestRun};
use schemata::safety;
use schemata::state;
use schemata::{EngineError, Language};

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schemata", version, about = "Mutation testing with all mutants compiled into one build")]
struct Cli {
    /// Project root (default: nearest directory with Cargo.toml, package.json or .git)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DiscoverArgs {
    /// Files or directories to mutate, relative to the project root
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,
    /// Config file (default: schemata.toml in the project root)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Comma-separated operators: relational, logical, ternary, side_effects
    #[arg(long, value_delimiter = ',')]
    operators: Vec<String>,
    /// Call that must never be removed (repeatable)
    #[arg(long = "exclude-call")]
    exclude_calls: Vec<String>,
    /// JSON file listing zero-coverage regions
    #[arg(long)]
    uncovered: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a mutation campaign
    Run {
        #[command(flatten)]
        discover: DiscoverArgs,
        /// Test command (default: from config, else `cargo test`)
        #[arg(long, env = "SCHEMATA_TEST_CMD")]
        test_cmd: Option<String>,
        /// Timeout multiplier over the baseline duration
        #[arg(long)]
        timeout_mult: Option<f64>,
        /// Fixed per-mutant timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
        /// Exit code only, no output
        #[arg(short, long)]
        quiet: bool,
        /// Instrument the sources in place instead of in a temp copy
        #[arg(long)]
        in_place: bool,
        /// Session ID for the temp copy name (default: auto-generated)
        #[arg(long)]
        session: Option<String>,
        /// Directory to write one log per test run into
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// List mutation sites without running tests
    Discover {
        #[command(flatten)]
        discover: DiscoverArgs,
        /// Output the schemata mapping as JSON
        #[arg(long)]
        json: bool,
        /// Write instrumented files under this directory
        #[arg(long)]
        write: Option<PathBuf>,
    },
    /// Show details for a survived mutant by ref
    Show {
        /// Mutant ref (e.g. @m1 or m1)
        #[arg(name = "ref")]
        mutant_ref: String,
        #[arg(long)]
        json: bool,
    },
    /// Summary of last run
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let root = match &cli.root {
        Some(r) => r.clone(),
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            copy_tree::find_project_root(&cwd)
        }
    };

    let exit_code = match cli.command {
        Commands::Run {
            discover,
            test_cmd,
            timeout_mult,
            timeout_ms,
            json,
            quiet,
            in_place,
            session,
            log_dir,
        } => {
            let settings = RunSettings {
                test_cmd,
                timeout_mult,
                timeout_ms,
                json,
                quiet,
                in_place,
                session,
                log_dir,
            };
            cmd_run(&root, discover, settings)
        }
        Commands::Discover { discover, json, write } => cmd_discover(&root, discover, json, write),
        Commands::Show { mutant_ref, json } => cmd_show(&root, mutant_ref, json),
        Commands::Status { json } => cmd_status(&root, json),
    };

    process::exit(exit_code);
}

struct RunSettings {
    test_cmd: Option<String>,
    timeout_mult: Option<f64>,
    timeout_ms: Option<u64>,
    json: bool,
    quiet: bool,
    in_place: bool,
    session: Option<String>,
    log_dir: Option<PathBuf>,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => output::print_error(&format!("Failed to serialize output: {}", e)),
    }
}

fn generate_session_id() -> String {
    format!("{:08x}", fastrand::u32(..))
}

fn load_coverage(path: &Path) -> Result<Vec<CoverageRegion>, String> {
    let data = std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&data).map_err(|e| format!("Invalid coverage file {}: {}", path.display(), e))
}

/// Config, source files and discovery options shared by `run` and `discover`.
fn prepare(root: &Path, args: &DiscoverArgs) -> Result<(ProjectConfig, Vec<PathBuf>, DiscoveryOptions), String> {
    let mut config = ProjectConfig::load(root, args.config.as_deref()).map_err(|e| e.to_string())?;
    if !args.operators.is_empty() {
        config.operators = args.operators.clone();
    }
    config.exclude_calls.extend(args.exclude_calls.iter().cloned());

    let coverage = match &args.uncovered {
        Some(path) => load_coverage(path)?,
        None => Vec::new(),
    };
    let options = DiscoveryOptions {
        operators: config.operator_kinds().map_err(|e| e.to_string())?,
        exclude_calls: config.exclude_calls.clone(),
        coverage,
        activation_check: config.activation_check.clone(),
    };
    let files = copy_tree::discover_source_files(root, &args.paths, &config);
    Ok((config, files, options))
}

fn discover_or_report(root: &Path, files: &[PathBuf], options: &DiscoveryOptions, quiet: bool) -> Result<Discovery, i32> {
    match parser::discover(root, files, options) {
        Ok(d) => Ok(d),
        Err(EngineError::NoMutationsDiscovered) => {
            if !quiet {
                output::print_error(&format!(
                    "No mutations discovered in {} source files under {}.",
                    files.len(),
                    root.display()
                ));
            }
            Err(2)
        }
        Err(e) => {
            if !quiet {
                output::print_error(&e.to_string());
            }
            Err(3)
        }
    }
}

fn classifier_for(config: &ProjectConfig, discovery: &Discovery) -> LogPatternClassifier {
    let language = discovery
        .files
        .iter()
        .map(|f| f.language)
        .find(|l| l.is_rust())
        .or_else(|| discovery.files.first().map(|f| f.language))
        .unwrap_or(Language::Rust);
    let mut classifier = LogPatternClassifier::for_language(language);
    if !config.build_error_markers.is_empty() {
        classifier.build_markers = config.build_error_markers.clone();
    }
    if !config.failure_markers.is_empty() {
        classifier.failure_markers = config.failure_markers.clone();
    }
    classifier
}

/// Writes each test run's log into a directory.
struct LogDirObserver {
    dir: Option<PathBuf>,
    quiet: bool,
}

impl LogDirObserver {
    fn write(&self, name: &str, log: &str) {
        let Some(dir) = &self.dir else { return };
        let path = dir.join(name);
        if let Err(e) = std::fs::write(&path, log) {
            warn!(file = %path.display(), error = %e, "failed to write log");
        }
    }
}

impl CampaignObserver for LogDirObserver {
    fn baseline_finished(&mut self, run: &TestRun, _outcome: TestSuiteOutcome) {
        self.write("baseline run.log", &run.log);
    }

    fn mutant_started(&mut self, candidate: &CandidateMutation, index: usize, total: usize) {
        if !self.quiet {
            eprint!("\r[{}/{}] {}", index + 1, total, candidate.id);
            if index + 1 == total {
                eprintln!();
            }
        }
    }

    fn mutant_finished(&mut self, outcome: &MutationTestOutcome, run: &TestRun) {
        let c = &outcome.candidate;
        let file = c
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = format!("{} @ {}-{}-{}.log", c.operator, file, c.position.line, c.position.column);
        self.write(&name, &run.log);
    }
}

fn cmd_run(root: &Path, args: DiscoverArgs, settings: RunSettings) -> i32 {
    let quiet = settings.quiet;
    let (config, files, options) = match prepare(root, &args) {
        Ok(p) => p,
        Err(e) => {
            output::print_error(&e);
            return 2;
        }
    };

    let restored = safety::recover_interrupted(root, &files);
    if !restored.is_empty() {
        output::print_error(&format!(
            "Recovered {} source files from a previously interrupted run. Re-run to continue.",
            restored.len()
        ));
        return 3;
    }

    let discovery = match discover_or_report(root, &files, &options, quiet) {
        Ok(d) => d,
        Err(code) => return code,
    };
    for skipped in &discovery.skipped {
        warn!(file = %skipped.path.display(), reason = %skipped.reason, "file excluded from campaign");
    }

    if let Some(dir) = &settings.log_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            output::print_error(&format!("Failed to create log directory {}: {}", dir.display(), e));
            return 3;
        }
    }

    // Either a temp copy or the real tree, instrumented for the whole campaign.
    let mut _sandbox = None;
    let mut _in_place = None;
    let working_dir = if settings.in_place {
        let contents: Vec<(PathBuf, String)> = discovery
            .files
            .iter()
            .map(|f| (f.path.clone(), f.instrumented.clone()))
            .collect();
        match safety::InPlaceGuard::install(root, &contents) {
            Ok(guard) => _in_place = Some(guard),
            Err(e) => {
                output::print_error(&format!("Failed to instrument sources in place: {}", e));
                return 3;
            }
        }
        root.to_path_buf()
    } else {
        let session_id = settings.session.clone().unwrap_or_else(generate_session_id);
        let temp_dir = match tempfile::Builder::new()
            .prefix(&format!("schemata-{}-", session_id))
            .tempdir()
        {
            Ok(t) => t,
            Err(e) => {
                output::print_error(&format!("Failed to create temp directory: {}", e));
                return 3;
            }
        };
        if let Err(e) = copy_tree::copy_tree(root, temp_dir.path()) {
            output::print_error(&format!("Failed to copy project tree: {}", e));
            return 3;
        }
        if let Err(e) = parser::write_instrumented(temp_dir.path(), &discovery) {
            output::print_error(&e.to_string());
            return 3;
        }
        let path = temp_dir.path().to_path_buf();
        _sandbox = Some(temp_dir);
        path
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "could not install interrupt handler");
    }

    let timeout = match settings.timeout_ms.or(config.timeout_ms) {
        Some(ms) => TimeoutPolicy::Fixed(Duration::from_millis(ms)),
        None => TimeoutPolicy::BaselineMultiple {
            multiplier: settings.timeout_mult.unwrap_or(config.timeout_multiplier),
            grace: Duration::from_millis(2000),
        },
    };
    let test_cmd = settings.test_cmd.clone().unwrap_or_else(|| config.test_command.clone());
    info!(test_cmd = %test_cmd, working_dir = %working_dir.display(), "starting campaign");

    let candidates: Vec<CandidateMutation> = discovery.candidates().into_iter().cloned().collect();
    let mut orchestrator = Orchestrator::new(
        CommandService::new(&test_cmd, &working_dir),
        classifier_for(&config, &discovery),
    )
    .with_timeout(timeout)
    .with_cancel_flag(cancel);
    let mut observer = LogDirObserver {
        dir: settings.log_dir.clone(),
        quiet: quiet || settings.json,
    };
    let report = orchestrator.run(&candidates, &mut observer);
    drop(_in_place);

    let run_report = state::RunReport::from_campaign(&report);
    if let Err(e) = state::save_last_run(root, &run_report) {
        warn!(error = %e, "failed to save run state");
    }

    if let CampaignState::Aborted(AbortReason::BaselineFailed { log }) = &report.state {
        if !quiet {
            output::print_error(&format!("Tests fail before mutation. Fix failing tests first.\n{}", log));
        }
        return 3;
    }

    if !quiet {
        if settings.json {
            print_json(&run_report);
        } else {
            output::print_run_result(&run_report);
        }
    }

    match report.state {
        CampaignState::Complete if run_report.survived == 0 => 0,
        CampaignState::Complete => 1,
        _ => 3,
    }
}

fn cmd_discover(root: &Path, args: DiscoverArgs, json: bool, write: Option<PathBuf>) -> i32 {
    let (_config, files, options) = match prepare(root, &args) {
        Ok(p) => p,
        Err(e) => {
            output::print_error(&e);
            return 2;
        }
    };
    let discovery = match discover_or_report(root, &files, &options, false) {
        Ok(d) => d,
        Err(code) => return code,
    };

    if let Some(dir) = write {
        if let Err(e) = parser::write_instrumented(&dir, &discovery) {
            output::print_error(&e.to_string());
            return 3;
        }
    }

    if json {
        print_json(&discovery.mapping.to_records());
    } else {
        output::print_discovery(&discovery);
    }
    0
}

fn cmd_show(root: &Path, mutant_ref: String, json_mode: bool) -> i32 {
    let ref_id = mutant_ref.trim_start_matches('@');

    let last_run = match state::load_last_run(root) {
        Some(r) => r,
        None => {
            output::print_error("No previous run found. Run `schemata run` first.");
            return 2;
        }
    };

    match last_run.survived_mutants.iter().find(|m| m.ref_id == ref_id) {
        Some(m) => {
            if json_mode {
                print_json(m);
            } else {
                output::print_mutant_detail(m);
            }
            0
        }
        None => {
            let valid: Vec<_> = last_run
                .survived_mutants
                .iter()
                .map(|m| format!("@{}", m.ref_id))
                .collect();
            output::print_error(&format!(
                "Mutant @{} not found. Valid refs: {}",
                ref_id,
                valid.join(", ")
            ));
            2
        }
    }
}

fn cmd_status(root: &Path, json_mode: bool) -> i32 {
    match state::load_last_run(root) {
        Some(result) => {
            if json_mode {
                print_json(&result);
            } else {
                output::print_status(&result);
            }
            0
        }
        None => {
            output::print_error("No previous run found. Run `schemata run` first.");
            2
        }
    }
}
