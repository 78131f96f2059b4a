//! Variable, message, callback and log commands

use tracing::{info, warn};

use crate::engine::{Command, Context, Flow};
use crate::types::SetOperator;
use crate::variables::{Data, Value};

#[derive(Debug, Clone)]
pub struct Set {
    pub variable: String,
    pub op: SetOperator,
    pub value: Data<Value>,
}

impl Command for Set {
    fn name(&self) -> &str {
        "Set Variable"
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        let operand = self.value.get(ctx.variables());
        if let Err(err) = ctx.variables_mut().apply(&self.variable, self.op, operand) {
            warn!(block = ctx.block_name(), error = %err, "set variable failed");
        }
        Flow::Continue
    }

    fn summary(&self) -> String {
        if self.variable.is_empty() {
            return "Error: Variable not selected".to_string();
        }
        format!(
            "{} {} {}",
            self.variable,
            self.op.symbol(),
            self.value.description()
        )
    }
}

#[derive(Debug, Clone)]
pub struct SendMessage {
    pub message: String,
    /// Deliver to every flowchart instead of only this one
    pub all_flowcharts: bool,
}

impl Command for SendMessage {
    fn name(&self) -> &str {
        "Send Message"
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        if self.message.is_empty() {
            warn!(block = ctx.block_name(), "send message without a message");
            return Flow::Continue;
        }
        let message = ctx.substitute(&self.message);
        if self.all_flowcharts {
            ctx.broadcast(&message);
        } else {
            ctx.send_message(&message);
        }
        Flow::Continue
    }

    fn summary(&self) -> String {
        if self.message.is_empty() {
            "Error: No message specified".to_string()
        } else if self.all_flowcharts {
            format!("{} (all flowcharts)", self.message)
        } else {
            self.message.clone()
        }
    }
}

/// Run a host-registered callback synchronously
#[derive(Debug, Clone)]
pub struct Invoke {
    pub callback: String,
}

impl Command for Invoke {
    fn name(&self) -> &str {
        "Invoke"
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        if !ctx.invoke(&self.callback) {
            warn!(block = ctx.block_name(), callback = %self.callback, "no such callback");
        }
        Flow::Continue
    }

    fn summary(&self) -> String {
        if self.callback.is_empty() {
            "Error: No callback selected".to_string()
        } else {
            self.callback.clone()
        }
    }
}

/// Write a substituted line to the log
#[derive(Debug, Clone)]
pub struct Log {
    pub message: String,
}

impl Command for Log {
    fn name(&self) -> &str {
        "Log"
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        let message = ctx.substitute(&self.message);
        info!(
            flowchart = ctx.flowchart_name(),
            block = ctx.block_name(),
            "{}",
            message
        );
        Flow::Continue
    }

    fn summary(&self) -> String {
        self.message.clone()
    }
}
