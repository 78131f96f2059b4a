//! Public variables shared between flowcharts
//!
//! Each flowchart publishes the current values of its `public` variables
//! into a shared [`PublicVariables`] handle whenever it finishes draining
//! its job queue. Other flowcharts on the same handle read them for
//! `{$Name}` tokens they cannot resolve locally.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::substitute::substitute;
use super::{Value, VariableStore};
use crate::types::VariableScope;

type Published = BTreeMap<String, BTreeMap<String, Value>>;

/// Cloneable handle to the public variables of every flowchart on it
#[derive(Debug, Clone, Default)]
pub struct PublicVariables {
    inner: Rc<RefCell<Published>>,
}

impl PublicVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace what `flowchart` has published with its current public values
    pub fn publish(&self, flowchart: &str, store: &VariableStore) {
        let values: BTreeMap<String, Value> = store
            .iter()
            .filter(|v| v.scope == VariableScope::Public)
            .map(|v| (v.key.clone(), v.value().clone()))
            .collect();
        let mut inner = self.inner.borrow_mut();
        if values.is_empty() {
            inner.remove(flowchart);
        } else {
            inner.insert(flowchart.to_string(), values);
        }
    }

    pub fn withdraw(&self, flowchart: &str) {
        self.inner.borrow_mut().remove(flowchart);
    }

    /// Value of `key` as published by `flowchart`
    pub fn get(&self, flowchart: &str, key: &str) -> Option<Value> {
        self.inner.borrow().get(flowchart)?.get(key).cloned()
    }

    /// First value of `key` published by a flowchart other than `except`,
    /// in flowchart name order
    pub fn find(&self, key: &str, except: &str) -> Option<Value> {
        self.inner
            .borrow()
            .iter()
            .filter(|(name, _)| name.as_str() != except)
            .find_map(|(_, values)| values.get(key).cloned())
    }

    /// Replace `{$Name}` tokens with values published by other flowcharts
    pub fn substitute(&self, template: &str, except: &str) -> String {
        if !template.contains("{$") {
            return template.to_string();
        }
        substitute(template, |key| self.find(key, except).map(|v| v.to_string()))
    }
}
