//! Save and restore of flowchart runtime state
//!
//! A [`FlowchartSnapshot`] records, per block, where its cursor is and
//! whether it was executing, and per variable its type and value. Restoring
//! puts executing blocks back at their saved command without re-running the
//! commands before it. A block suspended in `call .. and wait` is linked
//! back to the block it waits on instead of calling it again; links into
//! other flowcharts are kept by name, so restoring each flowchart's snapshot
//! brings them back together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::block::Pending;
use crate::engine::exec_loop::Job;
use crate::engine::{BlockId, Caller, Flowchart, Ticket, Wait};
use crate::error::{EngineError, Result};
use crate::variables::{Value, ValueType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    pub id: Uuid,
    pub flowchart: String,
    pub created_at: DateTime<Utc>,
    /// Hash of the definition the flowchart was built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub name: String,
    /// Command to resume at (the suspended command, or the next to run)
    pub command_index: usize,
    pub was_executing: bool,
    pub execution_count: u32,
    /// Block this one is suspended on through `call .. and wait`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_on: Option<String>,
    /// Flowchart of `waiting_on` when it is not this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_in: Option<String>,
    /// Block of another flowchart waiting for this one to end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_from: Option<RemoteCaller>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCaller {
    pub flowchart: String,
    pub block: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowchartSnapshot {
    pub metadata: SaveMetadata,
    pub blocks: Vec<BlockSnapshot>,
    pub variables: Vec<VariableSnapshot>,
}

impl FlowchartSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Flowchart {
    /// Capture block cursors, execution counts and variable values
    pub fn snapshot(&self) -> Result<FlowchartSnapshot> {
        let blocks = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let (waiting_on, waiting_in) = match self.waiting_on(BlockId(i)) {
                    Some((target, flowchart)) => (Some(target), flowchart),
                    None => (None, None),
                };
                let called_from = match &block.caller {
                    Some(Caller::Remote { flowchart, block }) => Some(RemoteCaller {
                        flowchart: flowchart.clone(),
                        block: block.clone(),
                    }),
                    _ => None,
                };
                BlockSnapshot {
                    name: block.name.clone(),
                    command_index: block.active.unwrap_or(block.cursor),
                    was_executing: block.is_executing(),
                    execution_count: self.directory.execution_count(BlockId(i)),
                    waiting_on,
                    waiting_in,
                    called_from,
                }
            })
            .collect();

        let variables = self
            .variables
            .iter()
            .map(|var| {
                Ok(VariableSnapshot {
                    name: var.key.clone(),
                    value_type: var.value_type(),
                    value: serde_json::to_value(var.value())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let snapshot = FlowchartSnapshot {
            metadata: SaveMetadata {
                id: Uuid::new_v4(),
                flowchart: self.name.clone(),
                created_at: Utc::now(),
                definition_hash: self.definition_hash.clone(),
            },
            blocks,
            variables,
        };
        debug!(flowchart = %self.name, id = %snapshot.metadata.id, "snapshot taken");
        Ok(snapshot)
    }

    /// Apply `snapshot`, stopping whatever is executing now.
    ///
    /// The snapshot is checked in full before anything changes: the
    /// definition hash must match and every block and variable must exist
    /// with the recorded type.
    pub fn restore(&mut self, snapshot: &FlowchartSnapshot) -> Result<()> {
        if let (Some(saved), Some(current)) =
            (&snapshot.metadata.definition_hash, &self.definition_hash)
        {
            if saved != current {
                return Err(EngineError::Snapshot(format!(
                    "snapshot was taken from a different definition of '{}'",
                    snapshot.metadata.flowchart
                )));
            }
        }

        let mut blocks = Vec::with_capacity(snapshot.blocks.len());
        for saved in &snapshot.blocks {
            let id = self.find_block(&saved.name).ok_or_else(|| {
                EngineError::Snapshot(format!("block '{}' does not exist", saved.name))
            })?;
            blocks.push((id, saved));
        }

        let mut values = Vec::with_capacity(snapshot.variables.len());
        for saved in &snapshot.variables {
            let current = self.variables.variable(&saved.name).ok_or_else(|| {
                EngineError::Snapshot(format!("variable '{}' does not exist", saved.name))
            })?;
            if current.value_type() != saved.value_type {
                return Err(EngineError::Snapshot(format!(
                    "variable '{}' is {} but was saved as {}",
                    saved.name,
                    current.value_type().name(),
                    saved.value_type.name()
                )));
            }
            let value: Value = serde_json::from_value(saved.value.clone())?;
            let value = value.coerce(saved.value_type).ok_or_else(|| {
                EngineError::Snapshot(format!(
                    "saved value of '{}' is not a {}",
                    saved.name,
                    saved.value_type.name()
                ))
            })?;
            values.push((saved.name.as_str(), value));
        }

        self.stop_all();
        self.timers.clear();
        self.yielded.clear();
        self.requests.clear();

        for (key, value) in values {
            self.variables
                .set(key, value)
                .map_err(|e| EngineError::Snapshot(e.to_string()))?;
        }

        self.begin_pump();
        let mut active = Vec::new();
        for (id, saved) in &blocks {
            self.directory.set_execution_count(*id, saved.execution_count);
            if saved.was_executing {
                let epoch = self.activate(*id, saved.command_index, None);
                active.push((*id, epoch));
            }
        }

        // Waiting callers get their wait back without re-entering the call
        for (id, saved) in &blocks {
            if !saved.was_executing {
                continue;
            }
            if let Some(caller) = &saved.called_from {
                self.blocks[id.0].caller = Some(Caller::Remote {
                    flowchart: caller.flowchart.clone(),
                    block: caller.block.clone(),
                });
            }
            let Some(callee) = saved.waiting_on.clone() else {
                continue;
            };
            match saved.waiting_in.clone() {
                Some(flowchart) => {
                    let wait = Wait::Flowchart {
                        flowchart,
                        block: callee,
                        start_index: 0,
                    };
                    self.relink_wait(*id, wait, saved.command_index);
                }
                None => {
                    let Some(target) = self.find_block(&callee) else {
                        continue;
                    };
                    if self.blocks[target.0].is_executing() {
                        let wait = Wait::Block {
                            target,
                            start_index: 0,
                        };
                        let ticket = self.relink_wait(*id, wait, saved.command_index);
                        self.blocks[target.0].caller = Some(Caller::Local(ticket));
                    }
                }
            }
        }

        for (id, epoch) in active {
            self.jobs.push_back(Job::Step { block: id, epoch });
        }
        self.drain();

        info!(
            flowchart = %self.name,
            id = %snapshot.metadata.id,
            "snapshot restored"
        );
        Ok(())
    }

    /// Block `id` is suspended on through `call .. and wait`, with its
    /// flowchart when that is another one
    fn waiting_on(&self, id: BlockId) -> Option<(String, Option<String>)> {
        let pending = self.blocks[id.0].pending.as_ref()?;
        match &pending.wait {
            Wait::Block { target, .. } => {
                let callee = self.blocks.get(target.0)?;
                let linked = callee.caller == Some(Caller::Local(pending.ticket));
                (callee.is_executing() && linked).then(|| (callee.name.clone(), None))
            }
            Wait::Flowchart {
                flowchart, block, ..
            } => Some((block.clone(), Some(flowchart.clone()))),
            _ => None,
        }
    }

    /// Suspend `caller` at `index` on `wait` without starting anything
    fn relink_wait(&mut self, caller: BlockId, wait: Wait, index: usize) -> Ticket {
        self.serial += 1;
        let block = &mut self.blocks[caller.0];
        let ticket = Ticket {
            block: caller,
            epoch: block.epoch,
            serial: self.serial,
        };
        block.cursor = index;
        block.active = Some(index);
        debug!(flowchart = %self.name, caller = %block.name, ?wait, "wait relinked");
        block.pending = Some(Pending { ticket, wait });
        ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandRegistry;
    use crate::config::EngineConfig;
    use crate::definition::FlowchartDef;
    use crate::engine::{Resume, RequestKind};
    use crate::signals::SignalBus;
    use crate::types::{BlockStatus, RestartPolicy};

    const SOURCE: &str = r#"
flowchart "Saves"
var visits: int = 0
var mood: float = 0.5
var name: string = "Ann"

block Main {
    set visits += 1
    say "first"
    set visits += 10
    say "second"
    set visits += 100
}
block Idle { }
"#;

    const CALLS: &str = r#"
var after: int = 0
var worked: int = 0

block Caller {
    call Worker and wait
    set after = 1
}
block Worker {
    set worked += 1
    wait 5.0
}
"#;

    fn build() -> Flowchart {
        build_from(SOURCE, EngineConfig::default())
    }

    fn build_from(source: &str, config: EngineConfig) -> Flowchart {
        let def = FlowchartDef::from_source(source).unwrap();
        Flowchart::from_def(&def, &CommandRegistry::default(), SignalBus::new(), config).unwrap()
    }

    fn value(flowchart: &Flowchart, key: &str) -> Option<Value> {
        flowchart.variables().get(key).cloned()
    }

    fn say_texts(flowchart: &mut Flowchart) -> Vec<String> {
        flowchart
            .take_requests()
            .into_iter()
            .filter_map(|r| match r.kind {
                RequestKind::Say { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_snapshot_records_cursor_and_values() {
        let mut flowchart = build();
        flowchart.execute_block("Main", 0).unwrap();

        let snapshot = flowchart.snapshot().unwrap();
        let main = &snapshot.blocks[0];
        assert_eq!(main.name, "Main");
        assert!(main.was_executing);
        assert_eq!(main.command_index, 1);
        assert_eq!(main.execution_count, 1);
        assert!(!snapshot.blocks[1].was_executing);

        assert_eq!(snapshot.variables[0].value, serde_json::json!(1));
        assert_eq!(snapshot.variables[1].value_type, ValueType::Float);
        assert_eq!(snapshot.metadata.flowchart, "Saves");
        assert!(snapshot.metadata.definition_hash.is_some());
    }

    #[test]
    fn test_restore_resumes_without_rerunning_earlier_commands() {
        let mut original = build();
        original.execute_block("Main", 0).unwrap();
        let json = original.snapshot().unwrap().to_json().unwrap();

        let mut restored = build();
        restored
            .restore(&FlowchartSnapshot::from_json(&json).unwrap())
            .unwrap();

        // Suspended Say re-entered, the first Set not repeated
        assert_eq!(restored.variables().get("visits"), Some(&Value::Int(1)));
        assert_eq!(restored.status("Main"), Some(BlockStatus::Suspended));
        assert_eq!(say_texts(&mut restored), vec!["first"]);
        assert_eq!(restored.execution_count("Main"), Some(1));

        let ticket = restored.block("Main").unwrap().pending_ticket().unwrap();
        restored.resume(ticket, Resume::Done);
        assert_eq!(restored.variables().get("visits"), Some(&Value::Int(11)));
    }

    #[test]
    fn test_restore_rejects_other_definition() {
        let mut flowchart = build();
        let mut snapshot = flowchart.snapshot().unwrap();
        snapshot.metadata.definition_hash = Some("0".repeat(64));
        let err = flowchart.restore(&snapshot).unwrap_err();
        assert!(matches!(err, EngineError::Snapshot(_)));
    }

    #[test]
    fn test_restore_rejects_type_change_without_side_effects() {
        let mut flowchart = build();
        flowchart.execute_block("Main", 0).unwrap();
        let mut snapshot = flowchart.snapshot().unwrap();
        snapshot.variables[2].value_type = ValueType::Int;

        assert!(flowchart.restore(&snapshot).is_err());
        assert!(flowchart.is_executing("Main"));
    }

    #[test]
    fn test_snapshot_records_waiting_caller() {
        let mut flowchart = build_from(CALLS, EngineConfig::default());
        flowchart.execute_block("Caller", 0).unwrap();

        let snapshot = flowchart.snapshot().unwrap();
        assert_eq!(snapshot.blocks[0].waiting_on.as_deref(), Some("Worker"));
        assert_eq!(snapshot.blocks[1].waiting_on, None);
    }

    #[test]
    fn test_restore_keeps_caller_waiting_on_target() {
        for policy in [RestartPolicy::Ignore, RestartPolicy::Restart] {
            let config = EngineConfig {
                restart_policy: policy,
                ..EngineConfig::default()
            };
            let mut original = build_from(CALLS, config.clone());
            original.execute_block("Caller", 0).unwrap();
            let json = original.snapshot().unwrap().to_json().unwrap();

            let mut restored = build_from(CALLS, config);
            restored
                .restore(&FlowchartSnapshot::from_json(&json).unwrap())
                .unwrap();

            assert_eq!(value(&restored, "after"), Some(Value::Int(0)), "{policy:?}");
            assert_eq!(value(&restored, "worked"), Some(Value::Int(1)), "{policy:?}");
            assert_eq!(restored.status("Caller"), Some(BlockStatus::Suspended));
            assert_eq!(restored.status("Worker"), Some(BlockStatus::Suspended));
            assert_eq!(restored.execution_count("Worker"), Some(1));

            restored.tick(5.0);
            assert_eq!(value(&restored, "after"), Some(Value::Int(1)), "{policy:?}");
            assert_eq!(value(&restored, "worked"), Some(Value::Int(1)), "{policy:?}");
            assert!(!restored.has_executing_blocks());
        }
    }

    #[test]
    fn test_restored_caller_sees_stopped_target() {
        let mut original = build_from(CALLS, EngineConfig::default());
        original.execute_block("Caller", 0).unwrap();
        let snapshot = original.snapshot().unwrap();

        let mut restored = build_from(CALLS, EngineConfig::default());
        restored.restore(&snapshot).unwrap();
        assert!(restored.stop_block("Worker"));

        assert_eq!(value(&restored, "after"), Some(Value::Int(1)));
        assert!(!restored.is_executing("Caller"));
    }
}
