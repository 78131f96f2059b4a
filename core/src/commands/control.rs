//! Indentation-scoped control flow: if / else-if / else / while / end / break

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::scope::{
    find_enclosing_loop, find_matching_end, find_next_branch, find_scope_opener,
};
use crate::engine::{Command, CommandKind, Context, Flow};
use crate::types::CompareOperator;
use crate::variables::{Data, Value, VariableStore};

/* ===================== Condition ===================== */

/// `variable <op> value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub variable: String,
    pub op: CompareOperator,
    pub value: Data<Value>,
}

impl Condition {
    /// Unknown variables and incomparable types evaluate to false
    pub fn evaluate(&self, vars: &VariableStore) -> bool {
        let Some(lhs) = vars.get(&self.variable) else {
            warn!(variable = %self.variable, "condition on unknown variable");
            return false;
        };
        let rhs = self.value.get(vars);
        match lhs.compare(self.op, &rhs) {
            Some(result) => result,
            None => {
                warn!(
                    variable = %self.variable,
                    op = self.op.symbol(),
                    lhs = ?lhs.value_type(),
                    rhs = ?rhs.value_type(),
                    "incomparable condition operands"
                );
                false
            }
        }
    }

    pub fn describe(&self) -> String {
        if self.variable.is_empty() {
            return "Error: No variable selected".to_string();
        }
        format!(
            "{} {} {}",
            self.variable,
            self.op.symbol(),
            self.value.description()
        )
    }
}

/// Continuation for a condition that evaluated false
fn branch_on_false(ctx: &Context<'_>) -> Flow {
    match find_next_branch(ctx.layout(), ctx.index()) {
        Some(i) if ctx.layout()[i].kind == CommandKind::ElseIf => Flow::Jump(i),
        Some(i) => Flow::Jump(i + 1),
        None => missing_end(ctx),
    }
}

/// Continuation past the `End` of the current scope
fn skip_past_end(ctx: &Context<'_>) -> Flow {
    match find_matching_end(ctx.layout(), ctx.index()) {
        Some(end) => Flow::Jump(end + 1),
        None => missing_end(ctx),
    }
}

fn missing_end(ctx: &Context<'_>) -> Flow {
    warn!(
        block = ctx.block_name(),
        index = ctx.index(),
        "no matching End, stopping block"
    );
    Flow::Stop
}

/* ===================== Commands ===================== */

#[derive(Debug, Clone)]
pub struct If {
    pub condition: Condition,
}

impl Command for If {
    fn name(&self) -> &str {
        "If"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::If
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        if self.condition.evaluate(ctx.variables()) {
            Flow::Continue
        } else {
            branch_on_false(ctx)
        }
    }

    fn summary(&self) -> String {
        self.condition.describe()
    }
}

#[derive(Debug, Clone)]
pub struct ElseIf {
    pub condition: Condition,
}

impl Command for ElseIf {
    fn name(&self) -> &str {
        "Else If"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::ElseIf
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        // Only evaluated when a sibling condition just failed and jumped here;
        // falling in from a taken branch skips the rest of the chain.
        let indent = ctx.meta().indent;
        let from_failed_sibling = ctx.arrived_by_jump()
            && ctx.previous_active().is_some_and(|prev| {
                matches!(prev.kind, CommandKind::If | CommandKind::ElseIf) && prev.indent == indent
            });

        if !from_failed_sibling {
            return skip_past_end(ctx);
        }
        if self.condition.evaluate(ctx.variables()) {
            Flow::Continue
        } else {
            branch_on_false(ctx)
        }
    }

    fn summary(&self) -> String {
        self.condition.describe()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Else;

impl Command for Else {
    fn name(&self) -> &str {
        "Else"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Else
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        skip_past_end(ctx)
    }
}

#[derive(Debug, Clone, Default)]
pub struct End;

impl Command for End {
    fn name(&self) -> &str {
        "End"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::End
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        match find_scope_opener(ctx.layout(), ctx.index()) {
            Some(opener) if ctx.layout()[opener].kind == CommandKind::While => Flow::Jump(opener),
            _ => Flow::Continue,
        }
    }
}

#[derive(Debug, Clone)]
pub struct While {
    pub condition: Condition,
}

impl Command for While {
    fn name(&self) -> &str {
        "While"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::While
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        if self.condition.evaluate(ctx.variables()) {
            Flow::Continue
        } else {
            skip_past_end(ctx)
        }
    }

    fn summary(&self) -> String {
        self.condition.describe()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Break;

impl Command for Break {
    fn name(&self) -> &str {
        "Break"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Break
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        let Some(looped) = find_enclosing_loop(ctx.layout(), ctx.index()) else {
            warn!(
                block = ctx.block_name(),
                index = ctx.index(),
                "break outside of a loop"
            );
            return Flow::Continue;
        };
        match find_matching_end(ctx.layout(), looped) {
            Some(end) => Flow::Jump(end + 1),
            None => missing_end(ctx),
        }
    }
}
