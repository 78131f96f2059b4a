//! Labels, jumps, calls between blocks, stopping and waiting

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::scope::find_label;
use crate::engine::{Command, CommandKind, Context, Flow, Resume, Wait};
use crate::variables::Data;

#[derive(Debug, Clone)]
pub struct Label {
    pub name: String,
}

impl Command for Label {
    fn name(&self) -> &str {
        "Label"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Label
    }

    fn label(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn on_enter(&mut self, _ctx: &mut Context<'_>) -> Flow {
        Flow::Continue
    }

    fn summary(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub text: String,
}

impl Command for Comment {
    fn name(&self) -> &str {
        "Comment"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Comment
    }

    fn on_enter(&mut self, _ctx: &mut Context<'_>) -> Flow {
        Flow::Continue
    }

    fn summary(&self) -> String {
        self.text.clone()
    }
}

#[derive(Debug, Clone)]
pub struct Jump {
    pub label: String,
}

impl Command for Jump {
    fn name(&self) -> &str {
        "Jump"
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        match find_label(ctx.layout(), &self.label) {
            Some(index) => Flow::Jump(index),
            None => {
                warn!(block = ctx.block_name(), label = %self.label, "jump to unknown label");
                Flow::Continue
            }
        }
    }

    fn summary(&self) -> String {
        if self.label.is_empty() {
            "Error: No label selected".to_string()
        } else {
            self.label.clone()
        }
    }
}

/* ===================== Calls ===================== */

/// How a `Call` treats the calling block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    /// Start the target and stop this block
    #[default]
    Stop,
    /// Start the target and keep going
    Continue,
    /// Start the target and wait for it to end
    Wait,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub block: String,
    /// Flowchart owning `block`; `None` for the caller's own
    pub flowchart: Option<String>,
    pub start_index: usize,
    pub mode: CallMode,
}

impl Call {
    /// Target flowchart when it is not the one running this command
    fn remote<'a>(&'a self, ctx: &Context<'_>) -> Option<&'a str> {
        self.flowchart
            .as_deref()
            .filter(|name| *name != ctx.flowchart_name())
    }
}

impl Command for Call {
    fn name(&self) -> &str {
        "Call"
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        if self.block.is_empty() {
            warn!(caller = ctx.block_name(), "call without a target block");
            return Flow::Continue;
        }
        if let Some(flowchart) = self.remote(ctx) {
            let flowchart = flowchart.to_string();
            return match self.mode {
                CallMode::Stop => {
                    ctx.spawn_in(&flowchart, &self.block, self.start_index);
                    Flow::Stop
                }
                CallMode::Continue => {
                    ctx.spawn_in(&flowchart, &self.block, self.start_index);
                    Flow::Continue
                }
                CallMode::Wait => ctx.call_in_and_wait(&flowchart, &self.block, self.start_index),
            };
        }

        let Some(target) = ctx.find_block(&self.block) else {
            warn!(caller = ctx.block_name(), target = %self.block, "call to unknown block");
            return Flow::Continue;
        };

        // Calling the running block restarts it in place
        if target == ctx.block_id() {
            return Flow::Jump(self.start_index);
        }

        match self.mode {
            CallMode::Stop => ctx.handoff(target, self.start_index),
            CallMode::Continue => {
                ctx.spawn(target, self.start_index);
                Flow::Continue
            }
            CallMode::Wait => ctx.call_and_wait(target, self.start_index),
        }
    }

    fn on_resume(&mut self, ctx: &mut Context<'_>, resume: Resume) -> Flow {
        if resume == Resume::CallRejected {
            warn!(
                caller = ctx.block_name(),
                target = %self.block,
                "called block was already executing"
            );
        }
        Flow::Continue
    }

    fn summary(&self) -> String {
        if self.block.is_empty() {
            return "Error: No target block selected".to_string();
        }
        let target = match &self.flowchart {
            Some(flowchart) => format!("{} in {}", self.block, flowchart),
            None => self.block.clone(),
        };
        match self.mode {
            CallMode::Stop => target,
            CallMode::Continue => format!("{} (continue)", target),
            CallMode::Wait => format!("{} (wait until finished)", target),
        }
    }

    fn connected_blocks(&self) -> Vec<&str> {
        if self.flowchart.is_some() {
            return Vec::new();
        }
        vec![self.block.as_str()]
    }
}

/* ===================== Stopping ===================== */

#[derive(Debug, Clone, Default)]
pub struct Stop;

impl Command for Stop {
    fn name(&self) -> &str {
        "Stop"
    }

    fn on_enter(&mut self, _ctx: &mut Context<'_>) -> Flow {
        Flow::Stop
    }
}

#[derive(Debug, Clone)]
pub struct StopBlock {
    pub block: String,
}

impl Command for StopBlock {
    fn name(&self) -> &str {
        "Stop Block"
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        let Some(target) = ctx.find_block(&self.block) else {
            warn!(target = %self.block, "stop of unknown block");
            return Flow::Continue;
        };
        if target == ctx.block_id() {
            return Flow::Stop;
        }
        ctx.stop_block(target);
        Flow::Continue
    }

    fn summary(&self) -> String {
        if self.block.is_empty() {
            "Error: No block selected".to_string()
        } else {
            self.block.clone()
        }
    }
}

/* ===================== Waiting ===================== */

#[derive(Debug, Clone)]
pub struct WaitSeconds {
    pub seconds: Data<f64>,
}

impl Command for WaitSeconds {
    fn name(&self) -> &str {
        "Wait"
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        let seconds = self.seconds.get(ctx.variables());
        if !seconds.is_finite() || seconds < 0.0 {
            warn!(seconds, "invalid wait duration, waiting zero seconds");
            return Flow::Suspend(Wait::Timer { seconds: 0.0 });
        }
        Flow::Suspend(Wait::Timer { seconds })
    }

    fn summary(&self) -> String {
        format!("{} seconds", self.seconds.description())
    }
}
