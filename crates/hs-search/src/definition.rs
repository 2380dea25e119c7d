//! JSON description of a parameter space.
//!
//! ```json
//! {
//!   "statics":        [{"name": "batch_size", "value": 128}],
//!   "stepped_ranges": [{"name": "dropout_1", "min": 0.1, "max": 0.9, "step": 0.1}],
//!   "power_ranges":   [{"name": "dense_1", "min_exponent": 6, "max_exponent": 11, "base": 2}],
//!   "lists":          [{"name": "optimizer", "values": ["sgd", "adam"]}]
//! }
//! ```
//!
//! Conversion goes through [`ParameterSpaceBuilder`], so a file-loaded space
//! is validated exactly like one declared in code.

use hs_types::{type_mismatch, Numeric, ParamValue, SpaceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::space::{ParameterSpace, ParameterSpaceBuilder};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpaceDefinition {
    #[serde(default)]
    pub statics: Vec<StaticEntry>,
    #[serde(default)]
    pub stepped_ranges: Vec<SteppedEntry>,
    #[serde(default)]
    pub power_ranges: Vec<PowerEntry>,
    #[serde(default)]
    pub lists: Vec<ListEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticEntry {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteppedEntry {
    pub name: String,
    pub min: Value,
    pub max: Value,
    pub step: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerEntry {
    pub name: String,
    pub min_exponent: i32,
    pub max_exponent: i32,
    pub base: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEntry {
    pub name: String,
    pub values: Vec<Value>,
}

impl SpaceDefinition {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Validate and build the space.
    pub fn into_space(self) -> Result<ParameterSpace, SpaceError> {
        let mut builder = ParameterSpaceBuilder::new();

        for entry in self.statics {
            let value = scalar(&entry.name, &entry.value)?;
            builder = builder.add_static(entry.name, value)?;
        }
        for entry in self.stepped_ranges {
            let min = numeric(&entry.name, &entry.min)?;
            let max = numeric(&entry.name, &entry.max)?;
            let step = numeric(&entry.name, &entry.step)?;
            builder = builder.add_stepped_range(entry.name, min, max, step)?;
        }
        for entry in self.power_ranges {
            let base = numeric(&entry.name, &entry.base)?;
            builder = builder.add_power_range(entry.name, entry.min_exponent, entry.max_exponent, base)?;
        }
        for entry in self.lists {
            let values = entry
                .values
                .iter()
                .map(|v| scalar(&entry.name, v))
                .collect::<Result<Vec<_>, _>>()?;
            builder = builder.add_enumerated_list(entry.name, values)?;
        }

        Ok(builder.build())
    }
}

impl TryFrom<SpaceDefinition> for ParameterSpace {
    type Error = SpaceError;

    fn try_from(definition: SpaceDefinition) -> Result<Self, Self::Error> {
        definition.into_space()
    }
}

fn scalar(name: &str, value: &Value) -> Result<ParamValue, SpaceError> {
    ParamValue::from_json(value)
        .ok_or_else(|| type_mismatch!(name, "unsupported value {value}: expected integer, real or string"))
}

fn numeric(name: &str, value: &Value) -> Result<Numeric, SpaceError> {
    scalar(name, value)?
        .as_numeric()
        .ok_or_else(|| type_mismatch!(name, "expected a number, found {value}"))
}
