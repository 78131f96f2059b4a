//! Event handlers: external triggers mapped to block entry points

use serde::{Deserialize, Serialize};

/// Condition under which a handler fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "on", rename_all = "snake_case")]
pub enum TriggerCondition {
    FlowchartStarted,
    MessageReceived { message: String },
    KeyPressed { key: String },
    Clicked { object: String },
    Collision { tag: String },
    TimerElapsed {
        interval: f64,
        #[serde(default)]
        repeat: bool,
    },
}

/// Something that happened on the host side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    FlowchartStarted,
    Message(String),
    Key(String),
    Click(String),
    Collision(String),
}

impl TriggerCondition {
    pub fn matches(&self, trigger: &Trigger) -> bool {
        match (self, trigger) {
            (TriggerCondition::FlowchartStarted, Trigger::FlowchartStarted) => true,
            (TriggerCondition::MessageReceived { message }, Trigger::Message(m)) => message == m,
            (TriggerCondition::KeyPressed { key }, Trigger::Key(k)) => key == k,
            (TriggerCondition::Clicked { object }, Trigger::Click(o)) => object == o,
            (TriggerCondition::Collision { tag }, Trigger::Collision(t)) => tag == t,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventHandler {
    pub block: String,
    pub start_index: usize,
    pub trigger: TriggerCondition,
    /// Flowchart time of the next firing, for timer handlers
    pub(crate) next_fire: Option<f64>,
}

impl EventHandler {
    pub fn new(block: impl Into<String>, trigger: TriggerCondition) -> Self {
        let next_fire = match &trigger {
            TriggerCondition::TimerElapsed { interval, .. } => Some(interval.max(0.0)),
            _ => None,
        };
        Self {
            block: block.into(),
            start_index: 0,
            trigger,
            next_fire,
        }
    }

    pub fn starting_at(mut self, index: usize) -> Self {
        self.start_index = index;
        self
    }

    /// Advance a timer handler to `now`; true when it should fire
    pub(crate) fn poll_timer(&mut self, now: f64) -> bool {
        let TriggerCondition::TimerElapsed { interval, repeat } = self.trigger else {
            return false;
        };
        match self.next_fire {
            Some(at) if now >= at => {
                self.next_fire = if repeat && interval > 0.0 {
                    let mut next = at + interval;
                    while next <= now {
                        next += interval;
                    }
                    Some(next)
                } else {
                    None
                };
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_by_payload() {
        let cond = TriggerCondition::MessageReceived {
            message: "door".into(),
        };
        assert!(cond.matches(&Trigger::Message("door".into())));
        assert!(!cond.matches(&Trigger::Message("window".into())));
        assert!(!cond.matches(&Trigger::Key("door".into())));
    }

    #[test]
    fn test_timer_once_and_repeat() {
        let mut once = EventHandler::new(
            "A",
            TriggerCondition::TimerElapsed {
                interval: 1.0,
                repeat: false,
            },
        );
        assert!(!once.poll_timer(0.5));
        assert!(once.poll_timer(1.0));
        assert!(!once.poll_timer(5.0));

        let mut repeating = EventHandler::new(
            "B",
            TriggerCondition::TimerElapsed {
                interval: 1.0,
                repeat: true,
            },
        );
        assert!(repeating.poll_timer(1.0));
        assert!(!repeating.poll_timer(1.5));
        assert!(repeating.poll_timer(2.0));
    }

    #[test]
    fn test_condition_toml_shape() {
        let cond: TriggerCondition = toml::from_str("on = \"key_pressed\"\nkey = \"space\"").unwrap();
        assert_eq!(cond, TriggerCondition::KeyPressed { key: "space".into() });
    }
}
