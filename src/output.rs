use console::Style;

use crate::mutants::CandidateMutation;
use crate::parser::Discovery;
use crate::state::{RunReport, SurvivedMutant};

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

fn score_text(score: i32) -> String {
    if score < 0 {
        "n/a".to_string()
    } else {
        format!("{}%", score)
    }
}

pub fn print_run_result(result: &RunReport) {
    let testable = result.total - result.build_errors - result.no_coverage;

    if !result.is_complete() {
        let style = Style::new().red().bold();
        println!(
            "{} campaign {} after {} of the mutants",
            style.apply_to("✗"),
            result.state,
            result.total,
        );
    }

    if result.survived == 0 {
        let style = Style::new().green().bold();
        println!(
            "{} {} mutants, all killed (score {}) in {:.1}s",
            style.apply_to("✓"),
            testable,
            score_text(result.score),
            result.duration_ms as f64 / 1000.0,
        );
    } else {
        let style = Style::new().yellow().bold();
        println!(
            "{} {} survived / {} testable (score {}) in {:.1}s",
            style.apply_to("!"),
            result.survived,
            testable,
            score_text(result.score),
            result.duration_ms as f64 / 1000.0,
        );
    }

    let dim = Style::new().dim();
    if result.build_errors > 0 {
        println!("  {} {} mutants did not build", dim.apply_to("·"), result.build_errors);
    }
    if result.timed_out > 0 {
        println!("  {} {} mutants timed out", dim.apply_to("·"), result.timed_out);
    }

    if result.file_scores.len() > 1 {
        println!();
        for (file, score) in &result.file_scores {
            println!("  {} {}", dim.apply_to(format!("{:>4}", score_text(*score))), file);
        }
    }

    if !result.survived_mutants.is_empty() {
        println!();
    }
    for m in &result.survived_mutants {
        let ref_style = Style::new().cyan().bold();
        let loc_style = Style::new().dim();
        let op_style = Style::new().magenta();

        println!(
            "  {} {}:{} {} {}",
            ref_style.apply_to(format!("@{}", m.ref_id)),
            m.file,
            m.line,
            loc_style.apply_to(format!("[{}]", m.operator)),
            op_style.apply_to(&m.description),
        );
    }
}

pub fn print_mutant_detail(m: &SurvivedMutant) {
    let ref_style = Style::new().cyan().bold();
    let dim = Style::new().dim();

    println!(
        "{} {}:{}:{} [{}]",
        ref_style.apply_to(format!("@{}", m.ref_id)),
        m.file,
        m.line,
        m.column,
        m.operator,
    );
    println!("  {}", dim.apply_to(format!("{} ({})", m.description, m.id)));
    println!();

    for line in m.diff.lines() {
        if line.starts_with('-') {
            let del_style = Style::new().red();
            println!("  {}", del_style.apply_to(line));
        } else if line.starts_with('+') {
            let add_style = Style::new().green();
            println!("  {}", add_style.apply_to(line));
        }
    }
}

pub fn print_status(result: &RunReport) {
    println!(
        "Last run ({}): {} mutants, {} killed, {} survived (score {})",
        result.state,
        result.total,
        result.killed,
        result.survived,
        score_text(result.score),
    );

    if result.survived > 0 {
        println!();
        for m in &result.survived_mutants {
            let ref_style = Style::new().cyan().bold();
            println!(
                "  {} {}:{} {}",
                ref_style.apply_to(format!("@{}", m.ref_id)),
                m.file,
                m.line,
                m.description,
            );
        }
        println!();
        println!("Use `schemata show @m1` for details on a specific mutant.");
    }
}

fn print_candidate(c: &CandidateMutation) {
    let loc_style = Style::new().dim();
    println!(
        "  {}:{}:{} {} {}",
        c.file_path.display(),
        c.position.line,
        c.position.column,
        loc_style.apply_to(format!("[{}]", c.operator)),
        c.description,
    );
}

pub fn print_discovery(discovery: &Discovery) {
    let candidates = discovery.candidates();
    println!(
        "{} mutants in {} files",
        candidates.len(),
        discovery.files.len()
    );
    for c in candidates {
        print_candidate(c);
    }
    if !discovery.skipped.is_empty() {
        let warn_style = Style::new().yellow();
        println!();
        for s in &discovery.skipped {
            println!("  {} {}: {}", warn_style.apply_to("skipped"), s.path.display(), s.reason);
        }
    }
}
