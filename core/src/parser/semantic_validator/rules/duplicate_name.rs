//! Rule: Duplicate Name
//!
//! Block and variable names must be unique within a flowchart. Two labels
//! with the same name in one block are reported as a warning: jumps always
//! land on the first.
//!
//! # Examples
//!
//! ```flow
//! // Error: block 'Intro' is defined twice
//! block Intro { say "a" }
//! block Intro { say "b" }
//! ```

use std::collections::HashSet;

use crate::commands::CommandDef;
use crate::definition::FlowchartDef;

use super::super::{ValidationError, ValidationRule};

pub struct DuplicateNameRule;

impl ValidationRule for DuplicateNameRule {
    fn id(&self) -> &'static str {
        "duplicate-name"
    }

    fn description(&self) -> &'static str {
        "Block, variable and label names must be unique"
    }

    fn validate(&self, def: &FlowchartDef) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let mut blocks = HashSet::new();
        for block in &def.blocks {
            if !blocks.insert(block.name.as_str()) {
                errors.push(
                    ValidationError::error(
                        block.span,
                        format!("Block '{}' is defined more than once", block.name),
                        self.id(),
                    )
                    .in_block(block, None),
                );
            }
        }

        let mut variables = HashSet::new();
        for var in &def.variables {
            if !variables.insert(var.name.as_str()) {
                errors.push(ValidationError::error(
                    Default::default(),
                    format!("Variable '{}' is declared more than once", var.name),
                    self.id(),
                ));
            }
        }

        for block in &def.blocks {
            let mut labels = HashSet::new();
            for (index, entry) in block.commands.iter().enumerate() {
                if let CommandDef::Label { name } = &entry.def {
                    if !labels.insert(name.as_str()) {
                        errors.push(
                            ValidationError::warning(
                                entry.span,
                                format!("Label '{}' appears more than once; jumps use the first", name),
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
