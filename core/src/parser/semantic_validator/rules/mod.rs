//! Validation Rules
//!
//! Each file in this module contains one validation rule:
//!
//! - `duplicate_name.rs` - Blocks, variables or labels declared twice
//! - `undefined_block.rs` - Calls, menus and stops naming missing blocks
//! - `undefined_variable.rs` - Conditions, sets and bindings on undeclared variables
//! - `undefined_label.rs` - Jumps to labels missing from the block
//! - `unbalanced_scope.rs` - `If`/`While` without `End`, stray `Else`/`End`
//! - `break_outside_loop.rs` - `Break` with no enclosing `While`

mod break_outside_loop;
mod duplicate_name;
mod unbalanced_scope;
mod undefined_block;
mod undefined_label;
mod undefined_variable;

pub use break_outside_loop::BreakOutsideLoopRule;
pub use duplicate_name::DuplicateNameRule;
pub use unbalanced_scope::UnbalancedScopeRule;
pub use undefined_block::UndefinedBlockRule;
pub use undefined_label::UndefinedLabelRule;
pub use undefined_variable::UndefinedVariableRule;
