//! If / else-if / else chains, while loops, break and jumps

use super::helpers::*;
use crate::commands::{Condition, If, Set};
use crate::config::EngineConfig;
use crate::engine::{Block, Command, Flowchart};
use crate::signals::SignalBus;
use crate::types::{CompareOperator, SetOperator, VariableScope};
use crate::variables::{Data, Value};

fn chain(x: i64) -> i64 {
    let mut h = build(&format!(
        r#"
        var x: int = {}
        var y: int = 0
        block Main {{
            if x == 1 {{
                set y = 10
            }} elif x == 2 {{
                set y = 20
            }} else {{
                set y = 30
            }}
            set y += 1
        }}
        "#,
        x
    ));
    h.run("Main");
    h.int("y")
}

#[test]
fn test_if_elif_else_takes_one_branch() {
    assert_eq!(chain(1), 11);
    assert_eq!(chain(2), 21);
    assert_eq!(chain(3), 31);
}

fn empty_branches(x: i64) -> i64 {
    let mut h = build(&format!(
        r#"
        var x: int = {}
        var y: int = 0
        block Main {{
            if x == 1 {{
            }} elif x == 2 {{
            }} else {{
                set y = 1
            }}
        }}
        "#,
        x
    ));
    h.run("Main");
    h.int("y")
}

#[test]
fn test_empty_branch_does_not_fall_into_the_next() {
    assert_eq!(empty_branches(1), 0);
    assert_eq!(empty_branches(2), 0);
    assert_eq!(empty_branches(3), 1);
}

#[test]
fn test_later_elif_is_evaluated_after_failed_siblings() {
    let mut h = build(
        r#"
        var x: int = 3
        var y: int = 0
        block Main {
            if x == 1 {
                set y = 1
            } elif x == 2 {
                set y = 2
            } elif x == 3 {
                set y = 3
            }
        }
        "#,
    );
    h.run("Main");
    assert_eq!(h.int("y"), 3);
}

#[test]
fn test_condition_compares_against_variable() {
    let mut h = build(
        r#"
        var x: int = 2
        var limit: int = 5
        var y: int = 0
        block Main {
            if x < limit {
                set y = 1
            }
        }
        "#,
    );
    h.run("Main");
    assert_eq!(h.int("y"), 1);
}

#[test]
fn test_nested_if() {
    let mut h = build(
        r#"
        var a: bool = true
        var b: bool = false
        var y: int = 0
        block Main {
            if a == true {
                if b == true {
                    set y = 1
                } else {
                    set y = 2
                }
                set y *= 10
            } else {
                set y = 3
            }
        }
        "#,
    );
    h.run("Main");
    assert_eq!(h.int("y"), 20);
}

#[test]
fn test_while_loop_repeats_until_false() {
    let mut h = build(
        r#"
        var x: int = 0
        var total: int = 0
        block Main {
            while x < 5 {
                set x += 1
                set total += x
            }
        }
        "#,
    );
    h.run("Main");
    assert_eq!(h.int("x"), 5);
    assert_eq!(h.int("total"), 15);
}

#[test]
fn test_break_leaves_the_innermost_loop() {
    let mut h = build(
        r#"
        var x: int = 0
        var after: int = 0
        block Main {
            while x < 100 {
                set x += 1
                if x == 3 {
                    break
                }
            }
            set after = 1
        }
        "#,
    );
    h.run("Main");
    assert_eq!(h.int("x"), 3);
    assert_eq!(h.int("after"), 1);
}

#[test]
fn test_nested_loops() {
    let mut h = build(
        r#"
        var i: int = 0
        var j: int = 0
        var count: int = 0
        block Main {
            while i < 3 {
                set i += 1
                set j = 0
                while j < 4 {
                    set j += 1
                    if j == 2 {
                        break
                    }
                    set count += 1
                }
            }
        }
        "#,
    );
    h.run("Main");
    assert_eq!(h.int("i"), 3);
    assert_eq!(h.int("count"), 3);
}

#[test]
fn test_jump_out_of_an_if_scope() {
    let mut h = build(
        r#"
        var x: int = 0
        block Main {
            set x = 1
            if x == 1 {
                jump A
            }
            set x = 2
            label A
            set x = 3
        }
        "#,
    );
    h.run("Main");
    assert_eq!(h.int("x"), 3);
    assert!(!h.events().contains(&"exec:Main:4".to_string()));
}

#[test]
fn test_jump_backwards_loops() {
    let mut h = build(
        r#"
        var x: int = 0
        block Main {
            label Again
            set x += 1
            if x < 4 {
                jump Again
            }
        }
        "#,
    );
    h.run("Main");
    assert_eq!(h.int("x"), 4);
}

#[test]
fn test_missing_end_stops_the_block() {
    let bus = SignalBus::new();
    let mut flowchart = Flowchart::new("Raw", bus, EngineConfig::default());
    flowchart
        .declare_variable("x", VariableScope::Private, Value::Int(0))
        .unwrap();

    let commands: Vec<Box<dyn Command>> = vec![
        Box::new(If {
            condition: Condition {
                variable: "x".into(),
                op: CompareOperator::Equals,
                value: Data::literal(Value::Int(1)),
            },
        }),
        Box::new(Set {
            variable: "x".into(),
            op: SetOperator::Assign,
            value: Data::literal(Value::Int(5)),
        }),
    ];
    flowchart.add_block(Block::new("Main", commands, &[])).unwrap();

    flowchart.execute_block("Main", 0).unwrap();

    assert_eq!(flowchart.variables().get("x"), Some(&Value::Int(0)));
    assert!(!flowchart.is_executing("Main"));
}

#[test]
fn test_condition_on_incomparable_types_is_false() {
    let mut h = build(
        r#"
        var name: string = "Ada"
        var y: int = 0
        block Main {
            if name > 3 {
                set y = 1
            } else {
                set y = 2
            }
        }
        "#,
    );
    h.run("Main");
    assert_eq!(h.int("y"), 2);
}
