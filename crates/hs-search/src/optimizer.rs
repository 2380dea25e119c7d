//! Configuration documents for the model-based (RBFOpt) optimizer backend.
//!
//! The optimizer runs inside the remote training service and explores the
//! whole space in one managed job. It reads a document describing its
//! method parameters and one descriptor per hyperparameter; the training
//! script reports the objective to [`OBJECTIVE_FILENAME`] after each run.

use hs_types::{type_mismatch, ConfigError, Numeric, ParamValue, SpaceError, SweepResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::space::{ParameterDef, ParameterKind, ParameterSpace};

/// Algorithm identifier understood by the optimizer backend.
pub const OPTIMIZER_NAME: &str = "rbfopt";

/// File the training script writes objective values to.
pub const OBJECTIVE_FILENAME: &str = "val_dict_list.json";

pub const OBJECTIVE_ACCURACY: &str = "accuracy";
pub const OBJECTIVE_LOSS: &str = "loss";

/// Whether the optimizer maximizes or minimizes the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Goal {
    Maximize,
    Minimize,
}

impl Goal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maximize => "maximize",
            Self::Minimize => "minimize",
        }
    }
}

impl FromStr for Goal {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "maximize" => Ok(Self::Maximize),
            "minimize" => Ok(Self::Minimize),
            _ => Err(ConfigError::InvalidValue {
                field: "goal".to_string(),
                value: s.to_string(),
                expected: "'maximize' or 'minimize'".to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Goal {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interval at which the training script reports the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum TimeUnit {
    Epoch,
    Iteration,
    Step,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epoch => "epoch",
            Self::Iteration => "iteration",
            Self::Step => "step",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "epoch" => Ok(Self::Epoch),
            "iteration" => Ok(Self::Iteration),
            "step" => Ok(Self::Step),
            _ => Err(ConfigError::InvalidValue {
                field: "time interval".to_string(),
                value: s.to_string(),
                expected: "'epoch', 'iteration' or 'step'".to_string(),
            }),
        }
    }
}

impl TryFrom<String> for TimeUnit {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optimizer meta-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Number of training runs the optimizer may launch.
    pub run_budget: u32,
    /// Objective metric name (e.g. "accuracy"); omitted from the document when absent.
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub time_unit: Option<TimeUnit>,
    #[serde(default)]
    pub goal: Option<Goal>,
}

// ---------------------------------------------------------------------------
// Wire document
// ---------------------------------------------------------------------------

/// The document handed to the optimizer backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfigDocument {
    pub method: MethodBlock,
    pub hyper_parameters: Vec<HyperparameterDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodBlock {
    pub name: String,
    pub parameters: Vec<MethodParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodParameter {
    pub name: String,
    #[serde(flatten)]
    pub value: MethodValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodValue {
    StringValue(String),
    IntValue(i64),
}

/// Search domain of one hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub domain: Domain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    IntRange(RangeDomain<i64>),
    DoubleRange(RangeDomain<f64>),
    IntValues(Vec<i64>),
    DoubleValues(Vec<f64>),
    StringValues(Vec<String>),
}

/// Closed range; `range` carries a linear step, `power` a base for
/// exponent ranges. Neither is set for a fixed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeDomain<T> {
    pub min_value: T,
    pub max_value: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<Numeric>,
}

impl<T: Copy> RangeDomain<T> {
    fn fixed(value: T) -> Self {
        Self {
            min_value: value,
            max_value: value,
            range: None,
            power: None,
        }
    }
}

impl OptimizerConfigDocument {
    pub fn method_parameter(&self, name: &str) -> Option<&MethodValue> {
        self.method
            .parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    pub fn descriptor(&self, name: &str) -> Option<&HyperparameterDescriptor> {
        self.hyper_parameters.iter().find(|d| d.name == name)
    }

    /// The document wrapped the way the training service expects it inside
    /// a bundle's params file.
    pub fn to_envelope(&self) -> Result<serde_json::Value, serde_json::Error> {
        Ok(serde_json::json!({
            "hyper_parameters_optimization": serde_json::to_value(self)?
        }))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Turns a [`ParameterSpace`] plus [`OptimizerSettings`] into an
/// [`OptimizerConfigDocument`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfigBuilder {
    settings: OptimizerSettings,
}

impl OptimizerConfigBuilder {
    pub fn new(run_budget: u32) -> Self {
        Self {
            settings: OptimizerSettings {
                run_budget,
                objective: None,
                time_unit: None,
                goal: None,
            },
        }
    }

    pub fn from_settings(settings: OptimizerSettings) -> Self {
        Self { settings }
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.settings.objective = Some(objective.into());
        self
    }

    pub fn with_time_unit(mut self, time_unit: TimeUnit) -> Self {
        self.settings.time_unit = Some(time_unit);
        self
    }

    pub fn with_goal(mut self, goal: Goal) -> Self {
        self.settings.goal = Some(goal);
        self
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Build the document. Descriptors follow the space's order: statics,
    /// stepped ranges, power ranges, lists.
    pub fn build(&self, space: &ParameterSpace) -> SweepResult<OptimizerConfigDocument> {
        let method = self.method_block()?;
        let hyper_parameters = space
            .iter()
            .map(describe)
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            optimizer = OPTIMIZER_NAME,
            run_budget = self.settings.run_budget,
            descriptors = hyper_parameters.len(),
            "optimizer configuration built"
        );

        Ok(OptimizerConfigDocument {
            method,
            hyper_parameters,
        })
    }

    fn method_block(&self) -> Result<MethodBlock, ConfigError> {
        let settings = &self.settings;
        if settings.run_budget == 0 {
            return Err(ConfigError::InvalidValue {
                field: "run budget".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }

        let mut parameters = vec![
            MethodParameter {
                name: "filename".to_string(),
                value: MethodValue::StringValue(OBJECTIVE_FILENAME.to_string()),
            },
            MethodParameter {
                name: "num_optimizer_steps".to_string(),
                value: MethodValue::IntValue(i64::from(settings.run_budget)),
            },
        ];

        if let Some(time_unit) = settings.time_unit {
            parameters.push(MethodParameter {
                name: "time_interval".to_string(),
                value: MethodValue::StringValue(time_unit.as_str().to_string()),
            });
        }
        if let Some(objective) = &settings.objective {
            if objective.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "objective".to_string(),
                    value: objective.clone(),
                    expected: "a non-empty metric name".to_string(),
                });
            }
            parameters.push(MethodParameter {
                name: "objective".to_string(),
                value: MethodValue::StringValue(objective.clone()),
            });
        }
        if let Some(goal) = settings.goal {
            parameters.push(MethodParameter {
                name: "maximize_or_minimize".to_string(),
                value: MethodValue::StringValue(goal.as_str().to_string()),
            });
        }

        Ok(MethodBlock {
            name: OPTIMIZER_NAME.to_string(),
            parameters,
        })
    }
}

/// Build with the meta-parameters given as strings, validating each one.
pub fn build_optimizer_config(
    space: &ParameterSpace,
    run_budget: u32,
    objective: Option<&str>,
    time_unit: Option<&str>,
    goal: Option<&str>,
) -> SweepResult<OptimizerConfigDocument> {
    let goal = goal.map(Goal::from_str).transpose()?;
    let time_unit = time_unit.map(TimeUnit::from_str).transpose()?;

    OptimizerConfigBuilder::from_settings(OptimizerSettings {
        run_budget,
        objective: objective.map(str::to_string),
        time_unit,
        goal,
    })
    .build(space)
}

/// Wire descriptor for one parameter. Numeric statics become a degenerate
/// range with `min_value == max_value`; a text static has no range form and
/// is written as a one-element `string_values` list.
fn describe(param: &ParameterDef) -> Result<HyperparameterDescriptor, SpaceError> {
    let name = &param.name;
    let domain = match &param.kind {
        ParameterKind::Static { value } => match value {
            ParamValue::Integer(v) => Domain::IntRange(RangeDomain::fixed(*v)),
            ParamValue::Real(v) => Domain::DoubleRange(RangeDomain::fixed(*v)),
            // A range cannot express text; a one-element list pins it instead.
            ParamValue::Text(v) => Domain::StringValues(vec![v.clone()]),
        },
        ParameterKind::SteppedRange { min, max, step } => match (min, max, step) {
            (Numeric::Integer(min), Numeric::Integer(max), Numeric::Integer(step)) => {
                Domain::IntRange(RangeDomain {
                    min_value: *min,
                    max_value: *max,
                    range: Some(*step),
                    power: None,
                })
            }
            (Numeric::Real(min), Numeric::Real(max), Numeric::Real(step)) => {
                Domain::DoubleRange(RangeDomain {
                    min_value: *min,
                    max_value: *max,
                    range: Some(*step),
                    power: None,
                })
            }
            _ => {
                return Err(type_mismatch!(
                    name,
                    "range mixes {}, {} and {} values",
                    min.kind(),
                    max.kind(),
                    step.kind()
                ))
            }
        },
        ParameterKind::PowerRange {
            min_exponent,
            max_exponent,
            base,
        } => Domain::IntRange(RangeDomain {
            min_value: i64::from(*min_exponent),
            max_value: i64::from(*max_exponent),
            range: None,
            power: Some(*base),
        }),
        ParameterKind::List { values } => list_domain(name, values)?,
    };

    Ok(HyperparameterDescriptor {
        name: name.clone(),
        domain,
    })
}

fn list_domain(name: &str, values: &[ParamValue]) -> Result<Domain, SpaceError> {
    let mismatch = |v: &ParamValue| type_mismatch!(name, "list element {v} differs from the first element");

    match values.first() {
        Some(ParamValue::Integer(_)) => values
            .iter()
            .map(|v| v.as_i64().ok_or_else(|| mismatch(v)))
            .collect::<Result<Vec<_>, _>>()
            .map(Domain::IntValues),
        Some(ParamValue::Real(_)) => values
            .iter()
            .map(|v| match v {
                ParamValue::Real(r) => Ok(*r),
                other => Err(mismatch(other)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Domain::DoubleValues),
        Some(ParamValue::Text(_)) => values
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| mismatch(v)))
            .collect::<Result<Vec<_>, _>>()
            .map(Domain::StringValues),
        None => Err(type_mismatch!(name, "list has no elements")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_types::SweepError;
    use serde_json::json;

    fn scenario_space() -> ParameterSpace {
        ParameterSpace::builder()
            .add_static("batch_size", 128)
            .unwrap()
            .add_stepped_range("dropout", 0.1, 0.3, 0.1)
            .unwrap()
            .add_power_range("filters", 5, 6, 2)
            .unwrap()
            .build()
    }

    #[test]
    fn end_to_end_scenario() {
        let doc = build_optimizer_config(
            &scenario_space(),
            15,
            Some("accuracy"),
            Some("epoch"),
            Some("maximize"),
        )
        .unwrap();

        assert_eq!(
            doc.method_parameter("num_optimizer_steps"),
            Some(&MethodValue::IntValue(15))
        );
        assert_eq!(doc.hyper_parameters.len(), 3);
        assert_eq!(
            doc.descriptor("dropout").unwrap().domain,
            Domain::DoubleRange(RangeDomain {
                min_value: 0.1,
                max_value: 0.3,
                range: Some(0.1),
                power: None,
            })
        );
    }

    #[test]
    fn serialized_wire_shape() {
        let space = scenario_space();
        let doc = OptimizerConfigBuilder::new(15)
            .with_objective(OBJECTIVE_ACCURACY)
            .with_time_unit(TimeUnit::Epoch)
            .with_goal(Goal::Maximize)
            .build(&space)
            .unwrap();

        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({
                "method": {
                    "name": "rbfopt",
                    "parameters": [
                        {"name": "filename", "string_value": "val_dict_list.json"},
                        {"name": "num_optimizer_steps", "int_value": 15},
                        {"name": "time_interval", "string_value": "epoch"},
                        {"name": "objective", "string_value": "accuracy"},
                        {"name": "maximize_or_minimize", "string_value": "maximize"}
                    ]
                },
                "hyper_parameters": [
                    {"name": "batch_size", "int_range": {"min_value": 128, "max_value": 128}},
                    {"name": "dropout", "double_range": {"min_value": 0.1, "max_value": 0.3, "range": 0.1}},
                    {"name": "filters", "int_range": {"min_value": 5, "max_value": 6, "power": 2}}
                ]
            })
        );
    }

    #[test]
    fn document_deserializes_from_wire_shape() {
        let doc = OptimizerConfigBuilder::new(4)
            .with_goal(Goal::Minimize)
            .build(&scenario_space())
            .unwrap();
        let text = serde_json::to_string(&doc).unwrap();
        let back: OptimizerConfigDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn optional_method_parameters_are_omitted() {
        let doc = OptimizerConfigBuilder::new(10).build(&scenario_space()).unwrap();
        let names: Vec<&str> = doc.method.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["filename", "num_optimizer_steps"]);

        let doc = build_optimizer_config(&scenario_space(), 10, Some("loss"), None, None).unwrap();
        assert_eq!(
            doc.method_parameter("objective"),
            Some(&MethodValue::StringValue("loss".into()))
        );
        assert!(doc.method_parameter("time_interval").is_none());
    }

    #[test]
    fn rejects_unknown_time_unit() {
        let err = build_optimizer_config(
            &scenario_space(),
            10,
            Some("accuracy"),
            Some("decade"),
            Some("maximize"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SweepError::Config(ConfigError::InvalidValue { ref value, .. }) if value == "decade"
        ));
    }

    #[test]
    fn rejects_unknown_goal() {
        let err =
            build_optimizer_config(&scenario_space(), 10, None, Some("epoch"), Some("maximise"))
                .unwrap_err();
        assert!(matches!(err, SweepError::Config(_)));
    }

    #[test]
    fn meta_parameters_are_case_insensitive() {
        assert_eq!("MAXIMIZE".parse::<Goal>().unwrap(), Goal::Maximize);
        assert_eq!(" Iteration ".parse::<TimeUnit>().unwrap(), TimeUnit::Iteration);
    }

    #[test]
    fn rejects_zero_budget_and_blank_objective() {
        let err = OptimizerConfigBuilder::new(0).build(&scenario_space()).unwrap_err();
        assert!(matches!(err, SweepError::Config(_)));

        let err = OptimizerConfigBuilder::new(5)
            .with_objective("  ")
            .build(&scenario_space())
            .unwrap_err();
        assert!(matches!(err, SweepError::Config(_)));
    }

    #[test]
    fn list_and_static_descriptors() {
        let space = ParameterSpace::builder()
            .add_static("epochs", 10)
            .unwrap()
            .add_static("weight_decay", 0.0005)
            .unwrap()
            .add_static("framework", "pytorch")
            .unwrap()
            .add_enumerated_list("optimizer", ["sgd", "adam"])
            .unwrap()
            .add_enumerated_list("hidden", [64, 128])
            .unwrap()
            .add_enumerated_list("lr", [0.01, 0.001])
            .unwrap()
            .build();

        let doc = OptimizerConfigBuilder::new(3).build(&space).unwrap();
        assert_eq!(doc.hyper_parameters.len(), space.len());
        assert_eq!(
            doc.descriptor("epochs").unwrap().domain,
            Domain::IntRange(RangeDomain::fixed(10))
        );
        assert_eq!(
            doc.descriptor("weight_decay").unwrap().domain,
            Domain::DoubleRange(RangeDomain::fixed(0.0005))
        );
        assert_eq!(
            doc.descriptor("framework").unwrap().domain,
            Domain::StringValues(vec!["pytorch".into()])
        );
        assert_eq!(
            doc.descriptor("optimizer").unwrap().domain,
            Domain::StringValues(vec!["sgd".into(), "adam".into()])
        );
        assert_eq!(
            doc.descriptor("hidden").unwrap().domain,
            Domain::IntValues(vec![64, 128])
        );
        assert_eq!(
            doc.descriptor("lr").unwrap().domain,
            Domain::DoubleValues(vec![0.01, 0.001])
        );
    }

    #[test]
    fn building_twice_is_idempotent() {
        let space = scenario_space();
        let builder = OptimizerConfigBuilder::new(15).with_goal(Goal::Maximize);
        assert_eq!(builder.build(&space).unwrap(), builder.build(&space).unwrap());
    }

    #[test]
    fn envelope_wraps_document() {
        let doc = OptimizerConfigBuilder::new(2).build(&scenario_space()).unwrap();
        let envelope = doc.to_envelope().unwrap();
        assert_eq!(
            envelope["hyper_parameters_optimization"]["method"]["name"],
            json!("rbfopt")
        );
    }

    #[test]
    fn settings_deserialize_with_validation() {
        let settings: OptimizerSettings = serde_json::from_value(json!({
            "run_budget": 10,
            "objective": "accuracy",
            "time_unit": "epoch",
            "goal": "minimize"
        }))
        .unwrap();
        assert_eq!(settings.goal, Some(Goal::Minimize));
        assert_eq!(settings.time_unit, Some(TimeUnit::Epoch));

        let bad = serde_json::from_value::<OptimizerSettings>(json!({
            "run_budget": 10,
            "time_unit": "decade"
        }));
        assert!(bad.is_err());
    }
}
