//! Command sequencing, signals and the per-pump step budget

use super::helpers::*;
use crate::error::EngineError;
use crate::types::{BlockStatus, ExecuteOutcome};

#[test]
fn test_commands_run_in_order() {
    let mut h = build(
        r#"
        var x: int = 0
        block Main {
            set x = 1
            set x *= 5
            set x -= 2
        }
        "#,
    );

    let outcome = h.flowchart.execute_block("Main", 0).unwrap();

    assert_eq!(outcome, ExecuteOutcome::Started);
    assert_eq!(h.int("x"), 3);
    assert_eq!(h.flowchart.status("Main"), Some(BlockStatus::Idle));
    assert_eq!(h.flowchart.execution_count("Main"), Some(1));
    assert_eq!(
        h.events(),
        vec!["start:Main", "exec:Main:0", "exec:Main:1", "exec:Main:2", "end:Main"]
    );
}

#[test]
fn test_empty_block_completes() {
    let mut h = build("block Main { }");
    h.run("Main");
    assert_eq!(h.events(), vec!["start:Main", "end:Main"]);
}

#[test]
fn test_disabled_and_passive_commands_are_skipped() {
    let mut h = build(
        r#"
        var x: int = 0
        block Main {
            # only a note
            - set x = 5
            label Here
            set x += 1
        }
        "#,
    );

    h.run("Main");

    assert_eq!(h.int("x"), 1);
    assert_eq!(h.events_with("exec:"), vec!["exec:Main:3"]);
}

#[test]
fn test_stop_ends_block_as_stopped() {
    let mut h = build(
        r#"
        var x: int = 0
        block Main {
            set x = 1
            stop
            set x = 2
        }
        "#,
    );

    h.run("Main");

    assert_eq!(h.int("x"), 1);
    // Stop itself is not reported as executed
    assert_eq!(
        h.events(),
        vec!["start:Main", "exec:Main:0", "end:Main:stopped"]
    );
}

#[test]
fn test_start_index_skips_earlier_commands() {
    let mut h = build(
        r#"
        var x: int = 0
        block Main {
            set x = 100
            set x += 1
        }
        "#,
    );

    h.flowchart.execute_block("Main", 1).unwrap();
    assert_eq!(h.int("x"), 1);

    // Starting past the end completes straight away
    h.flowchart.execute_block("Main", 9).unwrap();
    assert_eq!(h.int("x"), 1);
    assert_eq!(h.flowchart.execution_count("Main"), Some(2));
}

#[test]
fn test_unknown_block_is_an_error() {
    let mut h = build("block Main { }");
    let err = h.flowchart.execute_block("Missing", 0).unwrap_err();
    assert!(matches!(err, EngineError::BlockNotFound(name) if name == "Missing"));
    assert!(!h.flowchart.stop_block("Missing"));
}

#[test]
fn test_step_budget_yields_until_next_tick() {
    let mut h = build_with_budget(
        r#"
        var x: int = 0
        block Main {
            set x += 1
            set x += 1
            set x += 1
            set x += 1
            set x += 1
        }
        "#,
        3,
    );

    h.run("Main");
    assert_eq!(h.int("x"), 3);
    assert_eq!(h.flowchart.status("Main"), Some(BlockStatus::Running));
    assert!(!h.flowchart.is_idle());

    h.flowchart.tick(0.0);
    assert_eq!(h.int("x"), 5);
    assert_eq!(h.flowchart.status("Main"), Some(BlockStatus::Idle));
    assert!(h.flowchart.is_idle());
}

#[test]
fn test_endless_loop_does_not_starve_the_host() {
    let mut h = build_with_budget(
        r#"
        var x: int = 0
        block Spin {
            label Top
            set x += 1
            jump Top
        }
        "#,
        10,
    );

    h.run("Spin");
    assert_eq!(h.int("x"), 5);

    h.flowchart.tick(0.1);
    assert_eq!(h.int("x"), 10);

    assert!(h.flowchart.stop_block("Spin"));
    h.flowchart.tick(0.1);
    assert_eq!(h.int("x"), 10);
    assert_eq!(h.events().last().unwrap(), "end:Spin:stopped");
}

#[test]
fn test_invoke_runs_registered_callback() {
    let mut h = build(
        r#"
        var x: int = 0
        block Main {
            invoke bump
            set x += 1
            invoke missing
        }
        "#,
    );
    h.flowchart.register_callback("bump", |vars| {
        vars.set("x", crate::variables::Value::Int(41)).unwrap();
    });

    h.run("Main");

    assert_eq!(h.int("x"), 42);
    assert_eq!(h.flowchart.status("Main"), Some(BlockStatus::Idle));
}

#[test]
fn test_failed_set_leaves_block_running() {
    let mut h = build(
        r#"
        var x: int = 4
        var flag: bool = true
        block Main {
            set x /= 0
            set flag += 1
            set x += 1
        }
        "#,
    );

    h.run("Main");

    assert_eq!(h.int("x"), 5);
    assert_eq!(h.events().last().unwrap(), "end:Main");
}
