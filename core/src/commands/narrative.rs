//! Narrative commands that talk to the host: say and menu

use crate::engine::{Command, Context, Flow, RequestKind, Resume, Wait};
use crate::signals::{NarrationState, Signal, SignalBus};
use crate::variables::Data;
use tracing::{debug, warn};

/// Show a line of narration and wait for the host to acknowledge it
#[derive(Debug, Clone)]
pub struct Say {
    pub text: String,
    pub character: Option<String>,
    /// When false, the line is shown at most `show_count` times per reset
    pub show_always: bool,
    pub show_count: u32,
    execution_count: u32,
    shown: Option<String>,
}

impl Say {
    pub fn new(text: impl Into<String>, character: Option<String>) -> Self {
        Self {
            text: text.into(),
            character,
            show_always: true,
            show_count: 1,
            execution_count: 0,
            shown: None,
        }
    }

    pub fn limited(mut self, show_count: u32) -> Self {
        self.show_always = false;
        self.show_count = show_count;
        self
    }
}

impl Command for Say {
    fn name(&self) -> &str {
        "Say"
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        if !self.show_always && self.execution_count >= self.show_count {
            debug!(block = ctx.block_name(), "say already shown, skipping");
            return Flow::Continue;
        }
        self.execution_count += 1;

        let text = ctx.substitute(&self.text);
        ctx.emit(Signal::Narration {
            state: NarrationState::Start,
            character: self.character.clone(),
            text: text.clone(),
        });
        self.shown = Some(text.clone());
        Flow::Suspend(Wait::Host(RequestKind::Say {
            character: self.character.clone(),
            text,
        }))
    }

    fn on_resume(&mut self, ctx: &mut Context<'_>, _resume: Resume) -> Flow {
        if let Some(text) = self.shown.take() {
            ctx.emit(Signal::Narration {
                state: NarrationState::End,
                character: self.character.clone(),
                text,
            });
        }
        Flow::Continue
    }

    fn on_reset(&mut self) {
        self.execution_count = 0;
        self.shown = None;
    }

    fn on_stop(&mut self, signals: &SignalBus) {
        if let Some(text) = self.shown.take() {
            signals.emit(&Signal::Narration {
                state: NarrationState::End,
                character: self.character.clone(),
                text,
            });
        }
    }

    fn summary(&self) -> String {
        match &self.character {
            Some(character) => format!("{}: \"{}\"", character, self.text),
            None => format!("\"{}\"", self.text),
        }
    }
}

/// Offer a choice that starts `target` when picked
#[derive(Debug, Clone)]
pub struct Menu {
    pub text: String,
    pub target: String,
    /// Hide once the target block has run at least once
    pub hide_if_visited: bool,
    pub interactable: Data<bool>,
}

impl Command for Menu {
    fn name(&self) -> &str {
        "Menu"
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow {
        if self.text.is_empty() {
            warn!(block = ctx.block_name(), "menu option without text");
            return Flow::Continue;
        }
        let Some(target) = ctx.find_block(&self.target) else {
            warn!(block = ctx.block_name(), target = %self.target, "menu target not found");
            return Flow::Continue;
        };
        if self.hide_if_visited && ctx.execution_count(target) > 0 {
            return Flow::Continue;
        }

        let text = ctx.substitute(&self.text);
        let interactable = self.interactable.get(ctx.variables());
        ctx.post(RequestKind::MenuOption {
            text,
            target: self.target.clone(),
            interactable,
        });
        Flow::Continue
    }

    fn summary(&self) -> String {
        if self.target.is_empty() {
            return "Error: No target block selected".to_string();
        }
        if self.text.is_empty() {
            return "Error: No button text selected".to_string();
        }
        format!("{} : {}", self.text, self.target)
    }

    fn connected_blocks(&self) -> Vec<&str> {
        vec![self.target.as_str()]
    }
}
