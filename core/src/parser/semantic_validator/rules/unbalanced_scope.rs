//! Rule: Unbalanced Scope
//!
//! Checks the flat command list of each block for `If`/`While` without a
//! matching `End`, `Else`/`Else If` outside an `If`, and `End` without an
//! opener. Only relevant to JSON/TOML definitions; `.flow` bodies are always
//! balanced.
//!
//! # Examples
//!
//! ```json
//! // Error: 'If' at command 0 is never closed
//! [{ "type": "if", ... }, { "type": "say", "text": "hi" }]
//! ```

use crate::commands::CommandDef;
use crate::definition::FlowchartDef;

use super::super::{ValidationError, ValidationRule};

pub struct UnbalancedScopeRule;

struct Open {
    index: usize,
    is_if: bool,
    seen_else: bool,
}

impl ValidationRule for UnbalancedScopeRule {
    fn id(&self) -> &'static str {
        "unbalanced-scope"
    }

    fn description(&self) -> &'static str {
        "If, While, Else and End must nest correctly"
    }

    fn validate(&self, def: &FlowchartDef) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for block in &def.blocks {
            let mut stack: Vec<Open> = Vec::new();
            for (index, entry) in block.commands.iter().enumerate() {
                let mut report = |message: String| {
                    errors.push(
                        ValidationError::error(entry.span, message, self.id())
                            .in_block(block, Some(index)),
                    );
                };
                match &entry.def {
                    CommandDef::If { .. } | CommandDef::While { .. } => stack.push(Open {
                        index,
                        is_if: matches!(entry.def, CommandDef::If { .. }),
                        seen_else: false,
                    }),
                    CommandDef::ElseIf { .. } | CommandDef::Else => {
                        let name = entry.def.type_name();
                        match stack.last_mut() {
                            Some(open) if open.is_if && !open.seen_else => {
                                if matches!(entry.def, CommandDef::Else) {
                                    open.seen_else = true;
                                }
                            }
                            Some(open) if open.is_if => {
                                report(format!("'{}' follows the 'Else' of this If", name))
                            }
                            _ => report(format!("'{}' has no matching 'If'", name)),
                        }
                    }
                    CommandDef::End => {
                        if stack.pop().is_none() {
                            report("'End' has no matching 'If' or 'While'".to_string());
                        }
                    }
                    _ => {}
                }
            }

            for open in stack {
                let entry = &block.commands[open.index];
                errors.push(
                    ValidationError::error(
                        entry.span,
                        format!("'{}' has no matching 'End'", entry.def.type_name()),
                        self.id(),
                    )
                    .in_block(block, Some(open.index)),
                );
            }
        }

        errors
    }
}
