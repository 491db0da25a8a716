use schemata::exclusions::{self, CoverageRegion, ExclusionZone};
use schemata::operators::MutationOperatorKind;
use schemata::parser::{self, Discovery, DiscoveryOptions};
use schemata::{EngineError, Language, dialect};
use std::path::{Path, PathBuf};

fn discover_with(source: &str, options: &DiscoveryOptions) -> Result<Discovery, EngineError> {
    parser::discover_sources(&[(PathBuf::from("src/sample.rs"), source.to_string())], options)
}

fn lines(source: &str) -> Vec<u32> {
    let d = discover_with(source, &DiscoveryOptions::default()).unwrap();
    d.candidates().iter().map(|c| c.position.line).collect()
}

// --- skip ---

#[test]
fn skip_marker_excludes_next_statement() {
    let source = r#"fn f(a: i32, b: bool) -> bool {
    // schemata:skip
    let x = a == 1;
    x && b
}
"#;
    assert_eq!(lines(source), vec![4]);
}

#[test]
fn trailing_skip_marker_excludes_its_line() {
    let source = r#"fn f(a: i32, b: bool) -> bool {
    let x = a == 1; // schemata:skip
    let y = a > 2;
    x && y && b
}
"#;
    assert_eq!(lines(source), vec![3, 4, 4]);
}

#[test]
fn trailing_skip_inside_expression_keeps_enclosing_operator() {
    let source = "fn f(a: i32) -> bool {\n    a == 1 // schemata:skip\n        || a == 2\n}\n";
    let d = discover_with(source, &DiscoveryOptions::default()).unwrap();
    let found: Vec<(u32, MutationOperatorKind)> =
        d.candidates().iter().map(|c| (c.position.line, c.operator)).collect();
    assert_eq!(
        found,
        vec![
            (3, MutationOperatorKind::LogicalConnectorReplacement),
            (3, MutationOperatorKind::RelationalOperatorReplacement),
        ]
    );
}

#[test]
fn skip_marker_records_line_zone() {
    let source = r#"fn f(a: i32, b: bool) -> bool {
    // schemata:skip
    let x = a == 1;
    x && b
}
"#;
    let d = discover_with(source, &DiscoveryOptions::default()).unwrap();
    assert!(d.files[0].zones.contains(&ExclusionZone::Line {
        path: PathBuf::from("src/sample.rs"),
        line: 3,
    }));
}

#[test]
fn javascript_block_comment_skip() {
    let source = "function f(a, b) {\n  /* schemata:skip */\n  const x = a === 1;\n  return x || b;\n}\n";
    let d = parser::discover_sources(
        &[(PathBuf::from("src/app.js"), source.to_string())],
        &DiscoveryOptions::default(),
    )
    .unwrap();
    let found: Vec<u32> = d.candidates().iter().map(|c| c.position.line).collect();
    assert_eq!(found, vec![4]);
}

// --- disable / enable ---

#[test]
fn disable_enable_excludes_enclosed_statements() {
    let source = r#"fn f(a: i32) -> bool {
    // schemata:disable
    let x = a == 1;
    let y = a > 2;
    // schemata:enable
    x || y
}
"#;
    assert_eq!(lines(source), vec![6]);

    let d = discover_with(source, &DiscoveryOptions::default()).unwrap();
    assert!(d.files[0].zones.iter().any(|z| matches!(
        z,
        ExclusionZone::Range { line_start: 2, line_end: 5, .. }
    )));
}

#[test]
fn disable_nests() {
    let source = r#"fn f(a: i32) -> bool {
    // schemata:disable
    let x = a == 1;
    // schemata:disable
    let y = a > 2;
    // schemata:enable
    let z = a < 3;
    // schemata:enable
    x || y || z
}
"#;
    assert_eq!(lines(source), vec![9, 9]);
}

#[test]
fn unmatched_enable_is_ignored() {
    let source = r#"fn f(a: i32) -> bool {
    // schemata:enable
    a == 1
}
"#;
    assert_eq!(lines(source), vec![3]);
}

#[test]
fn open_disable_ends_with_its_block() {
    let source = r#"fn f(a: i32) -> bool {
    if a > 0 {
        // schemata:disable
        return a == 1;
    }
    a < 5
}
"#;
    assert_eq!(lines(source), vec![2, 6]);
}

#[test]
fn leading_disable_turns_off_the_file() {
    let source = "// schemata:disable\nfn f(a: i32) -> bool {\n    a == 1\n}\n";
    let err = discover_with(source, &DiscoveryOptions::default()).unwrap_err();
    assert!(matches!(err, EngineError::NoMutationsDiscovered));

    let tree = dialect::parse(source, Language::Rust).unwrap().unwrap();
    let set = exclusions::resolve_exclusions(&tree, source, Language::Rust, Path::new("src/sample.rs"), &[]);
    assert!(set.file_disabled());
    let start = source.find("a ==").unwrap();
    assert!(set.is_excluded(start, start + "a == 1".len()));
}

#[test]
fn leading_disable_closed_at_file_level_does_not_disable_file() {
    let source = "// schemata:disable\n// schemata:enable\nfn f(a: i32) -> bool {\n    a == 1\n}\n";
    let tree = dialect::parse(source, Language::Rust).unwrap().unwrap();
    let set = exclusions::resolve_exclusions(&tree, source, Language::Rust, Path::new("src/sample.rs"), &[]);
    assert!(!set.file_disabled());
    assert_eq!(lines(source), vec![4]);
}

// --- coverage ---

#[test]
fn uncovered_regions_are_not_mutated() {
    let source = r#"fn f(a: i32) -> bool {
    let x = a == 1;
    x && a > 2
}
"#;
    let options = DiscoveryOptions {
        coverage: vec![CoverageRegion {
            path: PathBuf::from("src/sample.rs"),
            line_start: 2,
            column_start: 1,
            line_end: 3,
            column_end: 1,
        }],
        ..DiscoveryOptions::default()
    };
    let d = discover_with(source, &options).unwrap();
    let found: Vec<u32> = d.candidates().iter().map(|c| c.position.line).collect();
    assert_eq!(found, vec![3, 3]);
    assert!(d.files[0].zones.iter().any(|z| matches!(z, ExclusionZone::Range { line_start: 2, .. })));
}

#[test]
fn coverage_for_other_files_is_ignored() {
    let source = "fn f(a: i32) -> bool {\n    a == 1\n}\n";
    let options = DiscoveryOptions {
        coverage: vec![CoverageRegion {
            path: PathBuf::from("src/other.rs"),
            line_start: 1,
            column_start: 1,
            line_end: 10,
            column_end: 1,
        }],
        ..DiscoveryOptions::default()
    };
    assert_eq!(discover_with(source, &options).unwrap().candidates().len(), 1);
}

#[test]
fn coverage_regions_deserialize_from_json() {
    let json = r#"[{"path":"src/lib.rs","line_start":3,"column_start":1,"line_end":9,"column_end":2}]"#;
    let regions: Vec<CoverageRegion> = serde_json::from_str(json).unwrap();
    assert_eq!(regions[0].line_end, 9);
}

// --- compile-time contexts ---

#[test]
fn array_lengths_are_not_mutated() {
    let source = r#"fn f(a: i32) -> bool {
    let _buf = [0u8; (1 < 2) as usize];
    a > 0
}
"#;
    assert_eq!(lines(source), vec![3]);
}
