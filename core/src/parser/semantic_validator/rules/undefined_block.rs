//! Rule: Undefined Block
//!
//! Reports an error when a `call`, `stop block` or `menu` names a block the
//! flowchart does not define. Calls into another flowchart
//! (`call Intro in "Credits"`) are resolved when they are routed.
//!
//! # Examples
//!
//! ```flow
//! // Error: no block named 'Ending'
//! block Start { call Ending }
//! ```

use std::collections::HashSet;

use crate::definition::FlowchartDef;

use super::super::{ValidationError, ValidationRule};

pub struct UndefinedBlockRule;

impl ValidationRule for UndefinedBlockRule {
    fn id(&self) -> &'static str {
        "undefined-block"
    }

    fn description(&self) -> &'static str {
        "Calls, stops and menu options must target an existing block"
    }

    fn validate(&self, def: &FlowchartDef) -> Vec<ValidationError> {
        let known: HashSet<&str> = def.blocks.iter().map(|b| b.name.as_str()).collect();
        let mut errors = Vec::new();

        for block in &def.blocks {
            for (index, entry) in block.commands.iter().enumerate() {
                for target in entry.def.referenced_blocks() {
                    if target.is_empty() {
                        errors.push(
                            ValidationError::error(
                                entry.span,
                                format!("{} has no target block", entry.def.type_name()),
                                self.id(),
                            )
                            .in_block(block, Some(index)),
                        );
                    } else if !known.contains(target) {
                        errors.push(
                            ValidationError::error(
                                entry.span,
                                format!("Block '{}' is not defined", target),
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
