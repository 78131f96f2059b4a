//! Rule: Undefined Variable
//!
//! Reports an error when a condition, `set` or bound parameter refers to a
//! variable the flowchart does not declare.
//!
//! # Examples
//!
//! ```flow
//! // Error: 'score' is never declared
//! block Start { set score += 1 }
//! ```
//!
//! ```flow
//! // OK
//! var score: int
//! block Start { set score += 1 }
//! ```

use std::collections::HashSet;

use crate::definition::FlowchartDef;

use super::super::{ValidationError, ValidationRule};

pub struct UndefinedVariableRule;

impl ValidationRule for UndefinedVariableRule {
    fn id(&self) -> &'static str {
        "undefined-variable"
    }

    fn description(&self) -> &'static str {
        "Variables must be declared before commands can use them"
    }

    fn validate(&self, def: &FlowchartDef) -> Vec<ValidationError> {
        let declared: HashSet<&str> = def.variables.iter().map(|v| v.name.as_str()).collect();
        let mut errors = Vec::new();

        for block in &def.blocks {
            for (index, entry) in block.commands.iter().enumerate() {
                for name in entry.def.referenced_variables() {
                    if name.is_empty() {
                        errors.push(
                            ValidationError::error(
                                entry.span,
                                format!("{} has no variable selected", entry.def.type_name()),
                                self.id(),
                            )
                            .in_block(block, Some(index)),
                        );
                    } else if !declared.contains(name) {
                        errors.push(
                            ValidationError::error(
                                entry.span,
                                format!("Variable '{}' is not declared", name),
                                self.id(),
                            )
                            .in_block(block, Some(index)),
                        );
                    }
                }
            }
        }

        errors
    }
}
