//! # hs-experiment
//!
//! Everything that happens after a sweep has been planned: bundle packaging,
//! experiment submission to a [`TrainingService`], remote run-id resolution,
//! status tracking, and metric collection from object storage.

pub mod bundle;
pub mod experiment;
pub mod metrics;
pub mod service;
pub mod settings;
pub mod storage;

pub use bundle::{
    read_bundle_document, BundlePackager, BundleRef, ZipBundlePackager, ASSIGNMENT_FILENAME,
    OPTIMIZER_PARAMS_FILENAME,
};
pub use experiment::{
    ExecutionReport, ExperimentConfig, ExperimentId, ExperimentSummary, PollPolicy,
    RunOrchestrator, RunPayload, RunSummary, TrainingRunRecord,
};
pub use metrics::{training_log_key, FinalMetrics};
pub use service::{
    ExperimentDefinition, ExperimentTag, RunStatus, Runtime, TrainingReference, TrainingService,
};
pub use settings::{PollSettings, ProjectSettings, SETTINGS_ENV_VAR};
pub use storage::{create_unique_bucket, LocalObjectStore, ObjectStore};
