use schemata::EngineError;
use schemata::operators::{self, MutationOperatorKind, TextEdit};

// --- replacement tables ---

#[test]
fn relational_pairs_are_symmetric() {
    for (a, b) in [("==", "!="), (">=", "<="), ("<", ">"), ("===", "!==")] {
        assert_eq!(operators::relational_replacement(a), Some(b));
        assert_eq!(operators::relational_replacement(b), Some(a));
    }
}

#[test]
fn relational_ignores_other_operators() {
    assert_eq!(operators::relational_replacement("+"), None);
    assert_eq!(operators::relational_replacement("&&"), None);
}

#[test]
fn logical_flips_both_ways() {
    assert_eq!(operators::logical_replacement("&&"), Some("||"));
    assert_eq!(operators::logical_replacement("||"), Some("&&"));
    assert_eq!(operators::logical_replacement("??"), None);
}

// --- operator names ---

#[test]
fn operator_names_round_trip() {
    for kind in MutationOperatorKind::ALL {
        let parsed: MutationOperatorKind = kind.name().parse().unwrap();
        assert_eq!(parsed, kind);
    }
}

#[test]
fn operator_accepts_full_name_and_dashes() {
    let kind: MutationOperatorKind = "RemoveSideEffects".parse().unwrap();
    assert_eq!(kind, MutationOperatorKind::RemoveSideEffects);
    let kind: MutationOperatorKind = "side-effects".parse().unwrap();
    assert_eq!(kind, MutationOperatorKind::RemoveSideEffects);
}

#[test]
fn unknown_operator_is_an_error() {
    let err = "arith".parse::<MutationOperatorKind>().unwrap_err();
    assert!(matches!(err, EngineError::UnknownOperator(name) if name == "arith"));
}

#[test]
fn empty_operator_list_selects_all() {
    assert_eq!(
        operators::parse_operator_list(&[]).unwrap(),
        MutationOperatorKind::ALL.to_vec()
    );
}

#[test]
fn operator_list_dedups_and_sorts() {
    let names = vec!["ternary".to_string(), "relational".to_string(), "ternary".to_string()];
    assert_eq!(
        operators::parse_operator_list(&names).unwrap(),
        vec![
            MutationOperatorKind::RelationalOperatorReplacement,
            MutationOperatorKind::TernaryOperatorSwap
        ]
    );
}

// --- text transforms ---

#[test]
fn apply_edit_replaces_span() {
    let edit = TextEdit { start: 2, end: 4, replacement: "!=".to_string() };
    assert_eq!(operators::apply_edit("a == 5", &edit), "a != 5");
}

#[test]
fn swap_spans_keeps_middle() {
    let source = "a ? true : false";
    let edit = operators::swap_spans(source, (4, 8), (11, 16));
    assert_eq!(operators::apply_edit(source, &edit), "a ? false : true");
}

#[test]
fn removal_takes_whole_line_when_alone() {
    let source = "{\n    let _ = side_effect();\n    return 1;\n}";
    let start = source.find("let").unwrap();
    let end = source.find(";").unwrap() + 1;
    let edit = operators::removal_edit(source, start, end);
    assert_eq!(operators::apply_edit(source, &edit), "{\n    return 1;\n}");
}

#[test]
fn removal_keeps_line_with_other_code() {
    let source = "{ f(); g(); }";
    let edit = operators::removal_edit(source, 2, 6);
    assert_eq!(operators::apply_edit(source, &edit), "{  g(); }");
}

#[test]
fn removal_spans_multiple_lines() {
    let source = "{\n    call(\n        1,\n    );\n    done();\n}";
    let start = source.find("call").unwrap();
    let end = source.find(");").unwrap() + 2;
    let edit = operators::removal_edit(source, start, end);
    assert_eq!(operators::apply_edit(source, &edit), "{\n    done();\n}");
}

#[test]
fn diff_span_finds_minimal_edit() {
    let edit = operators::diff_span("\n    a == 5\n", "\n    a != 5\n");
    assert_eq!(edit, TextEdit { start: 7, end: 8, replacement: "!".to_string() });
}

#[test]
fn diff_span_handles_deletion() {
    let original = "\n    f();\n    return 1;\n";
    let mutated = "\n    return 1;\n";
    let edit = operators::diff_span(original, mutated);
    assert_eq!(operators::apply_edit(original, &edit), mutated);
    assert!(edit.replacement.is_empty());
}

#[test]
fn diff_span_respects_char_boundaries() {
    let original = "x == \"é\"";
    let mutated = "x == \"è\"";
    let edit = operators::diff_span(original, mutated);
    assert_eq!(operators::apply_edit(original, &edit), mutated);
}

#[test]
fn rewrite_uses_region_relative_offsets() {
    let region = " a == 5 ";
    let edit = TextEdit { start: 13, end: 15, replacement: "!=".to_string() };
    assert_eq!(operators::rewrite(region, 10, &edit), " a != 5 ");
}
