//! Training-service abstraction.
//!
//! The remote service stores an experiment definition, launches its training
//! runs, and reports their progress. Every call blocks the calling thread.

use hs_types::RemoteServiceError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::bundle::BundleRef;

/// A named, versioned framework or language runtime (e.g. "pytorch" "0.4").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    pub name: String,
    pub version: String,
}

impl Runtime {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Free-form label attached to an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentTag {
    pub value: String,
    pub description: String,
}

/// One training run inside an [`ExperimentDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReference {
    /// Unique within the experiment; status reports are keyed by it.
    pub name: String,
    /// Full execution command, hyperparameter flags included.
    pub command: String,
    /// Bundle holding the training code and its embedded config document.
    pub bundle: BundleRef,
    /// Compute profile requested for the run (e.g. "k80", "p100").
    pub compute_profile: String,
}

/// Everything the training service needs to launch an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    pub name: String,
    pub description: String,
    pub framework: Runtime,
    pub runtime: Runtime,
    pub tags: Vec<ExperimentTag>,
    /// Bucket the training data is read from.
    pub data_bucket: Option<String>,
    /// Bucket training logs and results are written to.
    pub results_bucket: Option<String>,
    pub training_references: Vec<TrainingReference>,
}

/// Remote state of a training run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
    /// A state string this client does not recognize.
    Other(String),
}

impl RunStatus {
    /// Map a state string reported by the service.
    pub fn from_remote(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "pending" | "queued" | "initializing" => Self::Pending,
            "running" | "started" | "training" => Self::Running,
            "completed" | "complete" | "succeeded" | "success" => Self::Completed,
            "failed" | "error" => Self::Failed,
            "canceled" | "cancelled" | "stopped" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }

    /// Extract the state from a run-details document.
    pub fn from_details(details: &serde_json::Value) -> Option<Self> {
        ["/entity/status/state", "/status/state", "/status"]
            .iter()
            .find_map(|pointer| details.pointer(pointer).and_then(|v| v.as_str()))
            .map(Self::from_remote)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
            Self::Other(state) => write!(f, "{state}"),
        }
    }
}

/// Remote training service.
///
/// Implementations may talk to a managed training API or, in tests, answer
/// from memory.
pub trait TrainingService {
    /// Store and start an experiment. Returns the experiment-run id.
    fn submit_experiment(
        &mut self,
        definition: &ExperimentDefinition,
    ) -> Result<String, RemoteServiceError>;

    /// Remote run ids known so far, keyed by training reference name.
    /// Runs the service has not scheduled yet are simply absent.
    fn get_run_status(
        &self,
        experiment_run_id: &str,
    ) -> Result<HashMap<String, String>, RemoteServiceError>;

    /// Arbitrary metadata document for one run.
    fn get_run_details(&self, run_id: &str) -> Result<serde_json::Value, RemoteServiceError>;
}

impl<T: TrainingService + ?Sized> TrainingService for Box<T> {
    fn submit_experiment(
        &mut self,
        definition: &ExperimentDefinition,
    ) -> Result<String, RemoteServiceError> {
        (**self).submit_experiment(definition)
    }

    fn get_run_status(
        &self,
        experiment_run_id: &str,
    ) -> Result<HashMap<String, String>, RemoteServiceError> {
        (**self).get_run_status(experiment_run_id)
    }

    fn get_run_details(&self, run_id: &str) -> Result<serde_json::Value, RemoteServiceError> {
        (**self).get_run_details(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_states_map_to_status() {
        assert_eq!(RunStatus::from_remote("QUEUED"), RunStatus::Pending);
        assert_eq!(RunStatus::from_remote("running"), RunStatus::Running);
        assert_eq!(RunStatus::from_remote("completed"), RunStatus::Completed);
        assert_eq!(RunStatus::from_remote("error"), RunStatus::Failed);
        assert_eq!(RunStatus::from_remote("cancelled"), RunStatus::Canceled);
        assert_eq!(
            RunStatus::from_remote("paused"),
            RunStatus::Other("paused".to_string())
        );
    }

    #[test]
    fn terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Other("paused".into()).is_terminal());
    }

    #[test]
    fn status_extracted_from_details() {
        let nested = json!({"entity": {"status": {"state": "running"}}});
        assert_eq!(RunStatus::from_details(&nested), Some(RunStatus::Running));

        let flat = json!({"status": "completed"});
        assert_eq!(RunStatus::from_details(&flat), Some(RunStatus::Completed));

        assert_eq!(RunStatus::from_details(&json!({"metadata": {}})), None);
    }

    #[test]
    fn definition_serializes() {
        let definition = ExperimentDefinition {
            name: "Fashion MNIST".into(),
            description: "random search".into(),
            framework: Runtime::new("tensorflow", "1.5"),
            runtime: Runtime::new("python", "3.5"),
            tags: vec![],
            data_bucket: Some("fashion-mnist-data".into()),
            results_bucket: None,
            training_references: vec![TrainingReference {
                name: "run_1".into(),
                command: "python3 experiment.py --epochs 10".into(),
                bundle: BundleRef::new("bundles/tf_run_1.zip"),
                compute_profile: "k80".into(),
            }],
        };

        let value = serde_json::to_value(&definition).unwrap();
        assert_eq!(value["training_references"][0]["bundle"], json!("bundles/tf_run_1.zip"));
        let back: ExperimentDefinition = serde_json::from_value(value).unwrap();
        assert_eq!(back, definition);
    }
}
