//! Rule: Undefined Label
//!
//! Jumps only search their own block, so the label must be defined there.
//!
//! # Examples
//!
//! ```flow
//! // Error: 'Done' is defined in another block
//! block A { jump Done }
//! block B { label Done }
//! ```

use std::collections::HashSet;

use crate::commands::CommandDef;
use crate::definition::FlowchartDef;

use super::super::{ValidationError, ValidationRule};

pub struct UndefinedLabelRule;

impl ValidationRule for UndefinedLabelRule {
    fn id(&self) -> &'static str {
        "undefined-label"
    }

    fn description(&self) -> &'static str {
        "Jump targets must be labels in the same block"
    }

    fn validate(&self, def: &FlowchartDef) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for block in &def.blocks {
            let labels: HashSet<&str> = block
                .commands
                .iter()
                .filter(|e| e.enabled)
                .filter_map(|e| match &e.def {
                    CommandDef::Label { name } => Some(name.as_str()),
                    _ => None,
                })
                .collect();

            for (index, entry) in block.commands.iter().enumerate() {
                let CommandDef::Jump { label } = &entry.def else {
                    continue;
                };
                if !labels.contains(label.as_str()) {
                    errors.push(
                        ValidationError::error(
                            entry.span,
                            format!("Label '{}' is not defined in block '{}'", label, block.name),
                            self.id(),
                        )
                        .in_block(block, Some(index)),
                    );
                }
            }
        }

        errors
    }
}
