//! # hs-search
//!
//! Hyperparameter space declaration and the two strategies that consume it.
//!
//! A [`ParameterSpace`] is declared once (static values, stepped ranges,
//! power ranges, enumerated lists) and then either sampled by
//! [`RandomSampler`] into concrete [`HyperparameterAssignment`]s, or turned by
//! [`OptimizerConfigBuilder`] into an [`OptimizerConfigDocument`] for the
//! remote model-based optimizer.

mod assignment;
mod definition;
mod optimizer;
mod sampler;
mod space;

pub use assignment::HyperparameterAssignment;
pub use definition::{ListEntry, PowerEntry, SpaceDefinition, StaticEntry, SteppedEntry};
pub use optimizer::{
    build_optimizer_config, Domain, Goal, HyperparameterDescriptor, MethodBlock, MethodParameter,
    MethodValue, OptimizerConfigBuilder, OptimizerConfigDocument, OptimizerSettings, RangeDomain,
    TimeUnit, OBJECTIVE_ACCURACY, OBJECTIVE_FILENAME, OBJECTIVE_LOSS, OPTIMIZER_NAME,
};
pub use sampler::RandomSampler;
pub use space::{Category, ParameterDef, ParameterKind, ParameterSpace, ParameterSpaceBuilder};
