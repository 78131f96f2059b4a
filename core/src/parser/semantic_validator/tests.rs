//! Tests for the semantic validation system

use super::*;
use crate::commands::{CommandDef, CommandEntry, Condition};
use crate::definition::BlockDef;
use crate::parser::parse_flowchart;
use crate::types::CompareOperator;
use crate::variables::{Data, Value};

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse source and validate, returning errors
fn validate(source: &str) -> Vec<ValidationError> {
    let def = parse_flowchart(source).expect("Parse should succeed");
    validate_flowchart(&def)
}

/// Check if errors contain a specific rule
fn has_rule(errors: &[ValidationError], rule_id: &str) -> bool {
    errors.iter().any(|e| e.rule_id == rule_id)
}

/// Get errors for a specific rule
fn for_rule<'a>(errors: &'a [ValidationError], rule_id: &str) -> Vec<&'a ValidationError> {
    errors.iter().filter(|e| e.rule_id == rule_id).collect()
}

fn cond() -> Condition {
    Condition {
        variable: "x".into(),
        op: CompareOperator::Equals,
        value: Data::literal(Value::Int(1)),
    }
}

/// Definition with one block built from raw command defs (no spans)
fn raw_block(commands: Vec<CommandDef>) -> FlowchartDef {
    FlowchartDef {
        name: "raw".into(),
        variables: Vec::new(),
        blocks: vec![BlockDef::new(
            "Main",
            commands.into_iter().map(CommandEntry::from).collect(),
        )],
    }
}

// ============================================================================
// Clean Definitions
// ============================================================================

#[test]
fn test_clean_flowchart_has_no_findings() {
    let source = r#"
flowchart "Clean"
var score: int = 0
var open: bool = true

block Start on start {
    say Guide: "Score {$score}"
    while score < 3 {
        set score += 1
        if score == 2 { break }
    }
    menu "Enter" -> Hall when open
    jump Done
    label Done
}

block Hall {
    call Start and wait
}
"#;

    let errors = validate(source);
    assert!(errors.is_empty(), "unexpected findings: {:?}", errors);
    assert!(!has_errors(&parse_flowchart(source).unwrap()));
}

// ============================================================================
// Undefined Block Tests
// ============================================================================

#[test]
fn test_undefined_block_call() {
    let errors = validate("block A { call Missing }");
    let found = for_rule(&errors, "undefined-block");
    assert_eq!(found.len(), 1);
    assert!(found[0].message.contains("'Missing'"));
    assert!(found[0].is_error());
    assert_eq!(found[0].block.as_deref(), Some("A"));
    assert_eq!(found[0].command, Some(0));
}

#[test]
fn test_undefined_block_menu_and_stop() {
    let errors = validate(
        r#"
block A {
    menu "Go" -> Nowhere
    stop block Elsewhere
}
"#,
    );
    assert_eq!(for_rule(&errors, "undefined-block").len(), 2);
}

#[test]
fn test_call_into_other_flowchart_not_checked() {
    let errors = validate(r#"block A { call Intro in "Credits" and wait }"#);
    assert!(!has_rule(&errors, "undefined-block"));
}

// ============================================================================
// Undefined Variable Tests
// ============================================================================

#[test]
fn test_undefined_variable_in_condition_and_binding() {
    let errors = validate(
        r#"
var known: int
block A {
    if unknown == 1 { set known = other }
}
"#,
    );
    let found = for_rule(&errors, "undefined-variable");
    assert_eq!(found.len(), 2);
    assert!(found.iter().any(|e| e.message.contains("'unknown'")));
    assert!(found.iter().any(|e| e.message.contains("'other'")));
}

#[test]
fn test_undefined_variable_ok_when_declared() {
    let errors = validate(
        r#"
var delay: float = 0.5
block A { wait delay }
"#,
    );
    assert!(!has_rule(&errors, "undefined-variable"));
}

// ============================================================================
// Undefined Label Tests
// ============================================================================

#[test]
fn test_label_in_other_block_is_undefined() {
    let errors = validate(
        r#"
block A { jump Done }
block B { label Done }
"#,
    );
    let found = for_rule(&errors, "undefined-label");
    assert_eq!(found.len(), 1);
    assert!(found[0].message.contains("'Done'"));
}

#[test]
fn test_disabled_label_is_undefined() {
    let errors = validate("block A { jump Done\n - label Done }");
    assert!(has_rule(&errors, "undefined-label"));
}

// ============================================================================
// Duplicate Name Tests
// ============================================================================

#[test]
fn test_duplicate_block_is_error() {
    let errors = validate("block A { stop }\nblock A { stop }");
    let found = for_rule(&errors, "duplicate-name");
    assert_eq!(found.len(), 1);
    assert!(found[0].is_error());
    assert_eq!(found[0].span.start_line, 1);
}

#[test]
fn test_duplicate_variable_is_error() {
    let errors = validate("var x: int\nvar x: bool\nblock A { stop }");
    assert!(for_rule(&errors, "duplicate-name")[0].is_error());
}

#[test]
fn test_duplicate_label_is_warning() {
    let errors = validate("block A { label L\n label L\n jump L }");
    let found = for_rule(&errors, "duplicate-name");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].severity, Severity::Warning);
}

// ============================================================================
// Scope Tests
// ============================================================================

#[test]
fn test_parsed_scopes_are_balanced() {
    let errors = validate(
        r#"
var x: int
block A {
    if x == 1 { say "one" } elif x == 2 { say "two" } else { say "many" }
    while x < 3 { set x += 1 }
}
"#,
    );
    assert!(!has_rule(&errors, "unbalanced-scope"));
}

#[test]
fn test_if_without_end() {
    let def = raw_block(vec![
        CommandDef::Stop,
        CommandDef::If {
            condition: cond(),
        },
        CommandDef::Stop,
    ]);
    let errors = validate_flowchart(&def);
    let found = for_rule(&errors, "unbalanced-scope");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].command, Some(1));
    assert_eq!(
        found[0].to_string(),
        "error in block 'Main' at command 1: 'If' has no matching 'End' [unbalanced-scope]"
    );
}

#[test]
fn test_stray_else_and_end() {
    let def = raw_block(vec![CommandDef::Else, CommandDef::End]);
    let errors = validate_flowchart(&def);
    assert_eq!(for_rule(&errors, "unbalanced-scope").len(), 2);
}

#[test]
fn test_else_if_after_else() {
    let def = raw_block(vec![
        CommandDef::If {
            condition: cond(),
        },
        CommandDef::Else,
        CommandDef::ElseIf {
            condition: cond(),
        },
        CommandDef::End,
    ]);
    let errors = validate_flowchart(&def);
    let found = for_rule(&errors, "unbalanced-scope");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].command, Some(2));
}

// ============================================================================
// Break Tests
// ============================================================================

#[test]
fn test_break_outside_loop_is_warning() {
    let errors = validate("var x: int\nblock A { if x == 0 { break } }");
    let found = for_rule(&errors, "break-outside-loop");
    assert_eq!(found.len(), 1);
    assert!(!found[0].is_error());
}

#[test]
fn test_break_inside_nested_if_in_loop_ok() {
    let errors = validate("var x: int\nblock A { while x < 1 { if x == 0 { break } } }");
    assert!(!has_rule(&errors, "break-outside-loop"));
}

// ============================================================================
// Validator
// ============================================================================

#[test]
fn test_validator_lists_rules() {
    let ids: Vec<&str> = Validator::default().rules().map(|(id, _)| id).collect();
    assert_eq!(
        ids,
        vec![
            "duplicate-name",
            "undefined-block",
            "undefined-variable",
            "undefined-label",
            "unbalanced-scope",
            "break-outside-loop",
        ]
    );
}

#[test]
fn test_display_uses_source_position() {
    let errors = validate("block A {\n    call Missing\n}");
    let error = for_rule(&errors, "undefined-block")[0];
    assert_eq!(
        error.to_string(),
        "error at line 2, col 5: Block 'Missing' is not defined [undefined-block]"
    );
}
