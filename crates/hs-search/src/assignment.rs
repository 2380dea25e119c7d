//! Concrete hyperparameter assignments produced by sampling.

use hs_types::ParamValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One concrete value per declared parameter.
///
/// Entries are kept sorted by name so the serialized `config.json` and the
/// generated command line are stable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperparameterAssignment {
    values: BTreeMap<String, ParamValue>,
}

impl HyperparameterAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) -> Option<ParamValue> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The assignment as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        ParamValue::Integer(i) => serde_json::Value::from(*i),
                        ParamValue::Real(r) => serde_json::Value::from(*r),
                        ParamValue::Text(t) => serde_json::Value::String(t.clone()),
                    };
                    (k.clone(), value)
                })
                .collect(),
        )
    }

    /// Append `--<name> <value>` for every entry to `base`.
    pub fn command_line(&self, base: &str) -> String {
        let mut command = base.to_string();
        for (name, value) in &self.values {
            command.push_str(&format!(" --{name} {value}"));
        }
        command
    }
}

impl FromIterator<(String, ParamValue)> for HyperparameterAssignment {
    fn from_iter<T: IntoIterator<Item = (String, ParamValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
