//! Rule: Break Outside Loop
//!
//! A `Break` with no enclosing `While` does nothing at runtime, so it is
//! reported as a warning.
//!
//! # Examples
//!
//! ```flow
//! // Warning
//! block A { if x == 1 { break } }
//! ```

use crate::commands::CommandDef;
use crate::definition::FlowchartDef;

use super::super::{ValidationError, ValidationRule};

pub struct BreakOutsideLoopRule;

impl ValidationRule for BreakOutsideLoopRule {
    fn id(&self) -> &'static str {
        "break-outside-loop"
    }

    fn description(&self) -> &'static str {
        "Break must be inside a While"
    }

    fn validate(&self, def: &FlowchartDef) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for block in &def.blocks {
            // true for each open While, false for each open If
            let mut scopes: Vec<bool> = Vec::new();
            for (index, entry) in block.commands.iter().enumerate() {
                match &entry.def {
                    CommandDef::If { .. } => scopes.push(false),
                    CommandDef::While { .. } => scopes.push(true),
                    CommandDef::End => {
                        scopes.pop();
                    }
                    CommandDef::Break if !scopes.contains(&true) => errors.push(
                        ValidationError::warning(
                            entry.span,
                            "'Break' is not inside a 'While' and has no effect",
                            self.id(),
                        )
                        .in_block(block, Some(index)),
                    ),
                    _ => {}
                }
            }
        }

        errors
    }
}
