//! Data indirection for command parameters
//!
//! A parameter is either an inline literal or bound to a flowchart variable
//! by name. When bound, the variable always wins.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use super::{Value, VariableStore, VariableType};

#[derive(Debug, Clone, PartialEq)]
pub struct Data<T> {
    var: Option<String>,
    literal: T,
}

impl<T: VariableType> Data<T> {
    pub fn literal(value: T) -> Self {
        Self {
            var: None,
            literal: value,
        }
    }

    pub fn bound(key: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self::bound_or(key, T::default())
    }

    /// Bound to `key`, reading `fallback` if the variable is missing
    pub fn bound_or(key: impl Into<String>, fallback: T) -> Self {
        Self {
            var: Some(key.into()),
            literal: fallback,
        }
    }

    pub fn variable(&self) -> Option<&str> {
        self.var.as_deref()
    }

    pub fn is_bound(&self) -> bool {
        self.var.is_some()
    }

    pub fn get(&self, vars: &VariableStore) -> T {
        let Some(key) = &self.var else {
            return self.literal.clone();
        };
        match vars.get(key).and_then(T::from_value) {
            Some(value) => value,
            None => {
                warn!(variable = %key, "bound variable missing or mistyped, using literal");
                self.literal.clone()
            }
        }
    }

    /// Write through the binding; the literal is only touched when unbound
    pub fn set(&mut self, vars: &mut VariableStore, value: T) {
        match &self.var {
            Some(key) => {
                if let Err(err) = vars.set(key, value.into_value()) {
                    warn!(variable = %key, error = %err, "dropping write through bound data");
                }
            }
            None => self.literal = value,
        }
    }

    pub fn description(&self) -> String {
        match &self.var {
            Some(key) => format!("{{${}}}", key),
            None => self.literal.clone().into_value().to_string(),
        }
    }
}

impl<T: VariableType + Default> Default for Data<T> {
    fn default() -> Self {
        Self::literal(T::default())
    }
}

impl<T> From<T> for Data<T> {
    fn from(value: T) -> Self {
        Self {
            var: None,
            literal: value,
        }
    }
}

/* ===================== Serde ===================== */

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DataRepr<T> {
    Bound {
        var: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        literal: Option<T>,
    },
    Literal(T),
}

impl<T: Serialize + Clone> Serialize for Data<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match &self.var {
            Some(var) => DataRepr::Bound {
                var: var.clone(),
                literal: Some(self.literal.clone()),
            },
            None => DataRepr::Literal(self.literal.clone()),
        };
        repr.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de> + Default> Deserialize<'de> for Data<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match DataRepr::deserialize(deserializer)? {
            DataRepr::Bound { var, literal } => Data {
                var: Some(var),
                literal: literal.unwrap_or_default(),
            },
            DataRepr::Literal(literal) => Data { var: None, literal },
        })
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Bool(false)
    }
}
