use schemata::EngineError;
use schemata::mutants::CandidateMutation;
use schemata::operators::MutationOperatorKind;
use schemata::parser::{self, Discovery, DiscoveryOptions};
use std::path::PathBuf;

fn discover_at(path: &str, source: &str) -> Result<Discovery, EngineError> {
    parser::discover_sources(&[(PathBuf::from(path), source.to_string())], &DiscoveryOptions::default())
}

fn js(source: &str) -> Discovery {
    discover_at("src/app.js", source).unwrap()
}

fn of_kind(d: &Discovery, kind: MutationOperatorKind) -> Vec<CandidateMutation> {
    d.candidates().into_iter().filter(|c| c.operator == kind).cloned().collect()
}

// --- operators ---

#[test]
fn strict_equality_is_negated() {
    let d = js("function eq(a) {\n  return a === 1;\n}\n");
    let found = of_kind(&d, MutationOperatorKind::RelationalOperatorReplacement);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id.as_str(), "app_2_12_28");
    assert_eq!(found[0].snapshot.after, "a !== 1");
}

#[test]
fn ternary_branches_are_swapped() {
    let d = js("function pick(a) {\n  return a ? true : false;\n}\n");
    let found = of_kind(&d, MutationOperatorKind::TernaryOperatorSwap);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].snapshot.after, "a ? false : true");
    assert_eq!(found[0].mutated_text, "\n  return a ? false : true;\n");
}

#[test]
fn complex_ternary_branches_are_kept() {
    let err = discover_at("src/app.js", "function pick(a, b) {\n  return a ? b + 1 : () => 2;\n}\n").unwrap_err();
    assert!(matches!(err, EngineError::NoMutationsDiscovered));
}

#[test]
fn logical_connector_is_flipped() {
    let d = js("function both(a, b) {\n  return a || b;\n}\n");
    let found = of_kind(&d, MutationOperatorKind::LogicalConnectorReplacement);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].snapshot.after, "a && b");
}

#[test]
fn nullish_coalescing_is_not_a_logical_site() {
    assert!(matches!(
        discover_at("src/app.js", "function f(a, b) {\n  return a ?? b;\n}\n"),
        Err(EngineError::NoMutationsDiscovered)
    ));
}

// --- side effects ---

#[test]
fn void_call_is_removed() {
    let d = js("function run() {\n  void save();\n  return 1;\n}\n");
    let found = of_kind(&d, MutationOperatorKind::RemoveSideEffects);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].snapshot.before, "void save();");
    assert_eq!(found[0].mutated_text, "\n  return 1;\n");
}

#[test]
fn awaited_call_statement_is_removed() {
    let d = js("async function run() {\n  await flushAll();\n}\n");
    let found = of_kind(&d, MutationOperatorKind::RemoveSideEffects);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].description, "removed call to flushAll");
}

#[test]
fn console_and_exit_calls_are_kept() {
    let source = r#"
function stop(code) {
  console.log("bye");
  process.exit(code);
  save();
}
"#;
    let d = js(source);
    let found = of_kind(&d, MutationOperatorKind::RemoveSideEffects);
    let descriptions: Vec<&str> = found.iter().map(|c| c.description.as_str()).collect();
    assert_eq!(descriptions, vec!["removed call to save"]);
}

#[test]
fn lock_calls_are_kept() {
    let d = js("async function guarded(mutex) {\n  await mutex.acquire();\n  work();\n  mutex.release();\n}\n");
    let found = of_kind(&d, MutationOperatorKind::RemoveSideEffects);
    let descriptions: Vec<&str> = found.iter().map(|c| c.description.as_str()).collect();
    assert_eq!(descriptions, vec!["removed call to work"]);
}

// --- typescript ---

#[test]
fn typescript_cast_in_ternary_is_not_swapped() {
    let source = "function f(a: boolean, x: unknown): number {\n  return a ? (x as number) : 0;\n}\n";
    let err = discover_at("src/app.ts", source).unwrap_err();
    assert!(matches!(err, EngineError::NoMutationsDiscovered));
}

#[test]
fn typescript_comparison_is_mutated() {
    let source = "export function big(n: number): boolean {\n  return n >= 10;\n}\n";
    let d = discover_at("src/size.ts", source).unwrap();
    let found = of_kind(&d, MutationOperatorKind::RelationalOperatorReplacement);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].snapshot.after, "n <= 10");
}

#[test]
fn tsx_component_is_instrumented() {
    let source = "export function Badge(props: { n: number }) {\n  if (props.n > 1) {\n    return <b>many</b>;\n  }\n  return null;\n}\n";
    let d = discover_at("src/badge.tsx", source).unwrap();
    let found = of_kind(&d, MutationOperatorKind::RelationalOperatorReplacement);
    assert_eq!(found.len(), 1);
    assert!(d.files[0].instrumented.contains("props.n < 1"));
}

// --- rewriting ---

#[test]
fn instrumented_output_checks_process_env() {
    let d = js("function eq(a) {\n  return a === 1;\n}\n");
    let instrumented = &d.files[0].instrumented;
    assert!(instrumented.contains("if (process.env[\"app_2_12_28\"] !== undefined) {\n  return a !== 1;\n} else {"));
    assert!(instrumented.ends_with("\n  return a === 1;\n}}\n"));
}

#[test]
fn top_level_code_has_no_region() {
    let err = discover_at("src/app.js", "const flag = 1 === 1;\nconsole.log(flag && true);\n").unwrap_err();
    assert!(matches!(err, EngineError::NoMutationsDiscovered));
}

#[test]
fn arrow_function_block_body_is_a_region() {
    let d = js("const check = (x) => {\n  return x < 0;\n};\n");
    let found = of_kind(&d, MutationOperatorKind::RelationalOperatorReplacement);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].original_text, "\n  return x < 0;\n");
}

#[test]
fn class_method_body_is_a_region() {
    let d = js("class Foo {\n  check(x) {\n    return x > 0;\n  }\n}\n");
    assert_eq!(d.candidates().len(), 1);
    assert_eq!(d.candidates()[0].position.line, 3);
}
