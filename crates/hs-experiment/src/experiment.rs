//! Experiment assembly, submission and run tracking.

use chrono::{DateTime, Utc};
use hs_search::{HyperparameterAssignment, OptimizerConfigDocument};
use hs_types::{RunError, SweepError, SweepResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bundle::BundleRef;
use crate::metrics::{training_log_key, FinalMetrics};
use crate::service::{
    ExperimentDefinition, ExperimentTag, RunStatus, Runtime, TrainingReference, TrainingService,
};
use crate::settings::ProjectSettings;
use crate::storage::ObjectStore;

/// Local experiment identifier.
pub type ExperimentId = Uuid;

/// What a training run was launched with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "document", rename_all = "snake_case")]
pub enum RunPayload {
    /// One concrete assignment, run once.
    Assignment(HyperparameterAssignment),
    /// A whole space handed to the remote optimizer as one managed job.
    Optimizer(OptimizerConfigDocument),
}

impl RunPayload {
    /// Execution command for this payload. Assignments are passed as
    /// `--name value` flags; optimizer runs read their document from the bundle.
    pub fn command_line(&self, base: &str) -> String {
        match self {
            Self::Assignment(assignment) => assignment.command_line(base),
            Self::Optimizer(_) => base.to_string(),
        }
    }
}

impl From<HyperparameterAssignment> for RunPayload {
    fn from(assignment: HyperparameterAssignment) -> Self {
        Self::Assignment(assignment)
    }
}

impl From<OptimizerConfigDocument> for RunPayload {
    fn from(document: OptimizerConfigDocument) -> Self {
        Self::Optimizer(document)
    }
}

/// Identifier-resolution timing after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Experiment-level metadata sent with every submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub id: ExperimentId,
    pub name: String,
    pub description: String,
    pub framework: Runtime,
    pub runtime: Runtime,
    pub project_id: Option<String>,
    pub data_bucket: Option<String>,
    pub results_bucket: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExperimentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        let defaults = ProjectSettings::default();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            framework: defaults.framework,
            runtime: defaults.runtime,
            project_id: None,
            data_bucket: None,
            results_bucket: None,
            created_at: Utc::now(),
        }
    }

    /// Take framework, runtime, project and buckets from project settings.
    pub fn from_settings(name: impl Into<String>, settings: &ProjectSettings) -> Self {
        Self {
            framework: settings.framework.clone(),
            runtime: settings.runtime.clone(),
            project_id: settings.project_id().map(str::to_string),
            data_bucket: settings.data_bucket.clone(),
            results_bucket: settings.results_bucket.clone(),
            ..Self::new(name)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_framework(mut self, framework: Runtime) -> Self {
        self.framework = framework;
        self
    }

    pub fn with_runtime(mut self, runtime: Runtime) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_buckets(mut self, data: impl Into<String>, results: impl Into<String>) -> Self {
        self.data_bucket = Some(data.into());
        self.results_bucket = Some(results.into());
        self
    }

    fn tags(&self) -> Vec<ExperimentTag> {
        self.project_id
            .iter()
            .map(|id| ExperimentTag {
                value: format!("dsx-project.{id}"),
                description: "project guid".to_string(),
            })
            .collect()
    }
}

/// A training run registered with an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRunRecord {
    pub name: String,
    pub payload: RunPayload,
    pub command: String,
    pub bundle: BundleRef,
    pub compute_profile: String,
    /// Remote id, once the service has reported it.
    pub run_id: Option<String>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TrainingRunRecord {
    fn new(
        name: String,
        payload: RunPayload,
        submit_command: &str,
        bundle: BundleRef,
        compute_profile: String,
    ) -> Self {
        let command = payload.command_line(submit_command);
        Self {
            name,
            payload,
            command,
            bundle,
            compute_profile,
            run_id: None,
            status: RunStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.run_id.is_some()
    }

    fn mark_resolved(&mut self, run_id: String) {
        self.run_id = Some(run_id);
        self.resolved_at = Some(Utc::now());
    }

    fn training_reference(&self) -> TrainingReference {
        TrainingReference {
            name: self.name.clone(),
            command: self.command.clone(),
            bundle: self.bundle.clone(),
            compute_profile: self.compute_profile.clone(),
        }
    }
}

/// Outcome of [`RunOrchestrator::execute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub experiment_run_id: String,
    /// Run name to remote run id.
    pub resolved: BTreeMap<String, String>,
    /// Runs still without a remote id when polling stopped.
    pub unresolved: Vec<String>,
    pub polls: u32,
}

impl ExecutionReport {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    pub run_id: Option<String>,
    pub status: RunStatus,
    pub payload: RunPayload,
}

/// Read-only snapshot of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub experiment_id: ExperimentId,
    pub name: String,
    pub experiment_run_id: Option<String>,
    pub runs: Vec<RunSummary>,
}

impl ExperimentSummary {
    pub fn to_json_pretty(&self) -> SweepResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Drives one experiment: run registration, a single submission, then
/// remote-id resolution and status tracking.
pub struct RunOrchestrator<S: TrainingService> {
    config: ExperimentConfig,
    service: S,
    runs: Vec<TrainingRunRecord>,
    experiment_run_id: Option<String>,
    poll: PollPolicy,
    submitted_at: Option<DateTime<Utc>>,
}

impl<S: TrainingService> RunOrchestrator<S> {
    pub fn new(config: ExperimentConfig, service: S) -> Self {
        Self {
            config,
            service,
            runs: Vec::new(),
            experiment_run_id: None,
            poll: PollPolicy::default(),
            submitted_at: None,
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn runs(&self) -> &[TrainingRunRecord] {
        &self.runs
    }

    pub fn run(&self, name: &str) -> Option<&TrainingRunRecord> {
        self.runs.iter().find(|run| run.name == name)
    }

    pub fn experiment_run_id(&self) -> Option<&str> {
        self.experiment_run_id.as_deref()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    /// Names of registered runs that have no remote id yet.
    pub fn unresolved_runs(&self) -> Vec<&str> {
        self.runs
            .iter()
            .filter(|run| !run.is_resolved())
            .map(|run| run.name.as_str())
            .collect()
    }

    /// Register a pending run. The submitted command is `submit_command`
    /// with the assignment's flags appended for assignment payloads.
    pub fn add_run(
        &mut self,
        name: impl Into<String>,
        payload: impl Into<RunPayload>,
        submit_command: &str,
        bundle: BundleRef,
        compute_profile: impl Into<String>,
    ) -> SweepResult<()> {
        let name = name.into();
        if let Some(experiment_run_id) = &self.experiment_run_id {
            return Err(RunError::AlreadyExecuted {
                experiment_run_id: experiment_run_id.clone(),
            }
            .into());
        }
        if self.run(&name).is_some() {
            return Err(RunError::DuplicateName { name }.into());
        }

        let record = TrainingRunRecord::new(
            name,
            payload.into(),
            submit_command,
            bundle,
            compute_profile.into(),
        );
        debug!(run = %record.name, command = %record.command, "training run registered");
        self.runs.push(record);
        Ok(())
    }

    /// The definition that [`Self::execute`] submits.
    pub fn definition(&self) -> ExperimentDefinition {
        ExperimentDefinition {
            name: self.config.name.clone(),
            description: self.config.description.clone(),
            framework: self.config.framework.clone(),
            runtime: self.config.runtime.clone(),
            tags: self.config.tags(),
            data_bucket: self.config.data_bucket.clone(),
            results_bucket: self.config.results_bucket.clone(),
            training_references: self
                .runs
                .iter()
                .map(TrainingRunRecord::training_reference)
                .collect(),
        }
    }

    /// Submit every registered run in one call, then poll until each run's
    /// remote id is known or the poll timeout expires. Runs left unresolved
    /// are reported, not raised.
    pub fn execute(&mut self) -> SweepResult<ExecutionReport> {
        if let Some(experiment_run_id) = &self.experiment_run_id {
            return Err(RunError::AlreadyExecuted {
                experiment_run_id: experiment_run_id.clone(),
            }
            .into());
        }
        if self.runs.is_empty() {
            return Err(RunError::NoRuns.into());
        }

        let definition = self.definition();
        let experiment_run_id = self.service.submit_experiment(&definition)?;
        self.experiment_run_id = Some(experiment_run_id.clone());
        self.submitted_at = Some(Utc::now());
        info!(
            experiment = %self.config.name,
            experiment_run_id = %experiment_run_id,
            runs = self.runs.len(),
            "experiment submitted"
        );

        let polls = self.resolve_run_ids(&experiment_run_id);

        let resolved: BTreeMap<String, String> = self
            .runs
            .iter()
            .filter_map(|run| run.run_id.clone().map(|id| (run.name.clone(), id)))
            .collect();
        let unresolved: Vec<String> = self
            .unresolved_runs()
            .into_iter()
            .map(str::to_string)
            .collect();

        if unresolved.is_empty() {
            info!(runs = resolved.len(), polls, "all run ids resolved");
        } else {
            warn!(
                resolved = resolved.len(),
                unresolved = ?unresolved,
                timeout_secs = self.poll.timeout.as_secs_f64(),
                "poll timeout expired before every run id was resolved"
            );
        }

        Ok(ExecutionReport {
            experiment_run_id,
            resolved,
            unresolved,
            polls,
        })
    }

    fn resolve_run_ids(&mut self, experiment_run_id: &str) -> u32 {
        let started = Instant::now();
        let mut polls = 0u32;

        while self.runs.iter().any(|run| !run.is_resolved()) {
            let elapsed = started.elapsed();
            if elapsed >= self.poll.timeout {
                break;
            }
            thread::sleep(self.poll.interval.min(self.poll.timeout - elapsed));
            polls += 1;

            match self.service.get_run_status(experiment_run_id) {
                Ok(ids) => {
                    for run in self.runs.iter_mut().filter(|run| !run.is_resolved()) {
                        if let Some(run_id) = ids.get(&run.name) {
                            debug!(run = %run.name, run_id = %run_id, "run id resolved");
                            run.mark_resolved(run_id.clone());
                        }
                    }
                    debug!(poll = polls, reported = ids.len(), "run status polled");
                }
                Err(error) => {
                    warn!(poll = polls, error = %error, "run status poll failed, retrying");
                }
            }
        }

        polls
    }

    /// Snapshot of every registered run. Does not touch the service.
    pub fn summary(&self) -> ExperimentSummary {
        ExperimentSummary {
            experiment_id: self.config.id,
            name: self.config.name.clone(),
            experiment_run_id: self.experiment_run_id.clone(),
            runs: self
                .runs
                .iter()
                .map(|run| RunSummary {
                    name: run.name.clone(),
                    run_id: run.run_id.clone(),
                    status: run.status.clone(),
                    payload: run.payload.clone(),
                })
                .collect(),
        }
    }

    /// Update the status of every resolved, non-terminal run from its remote
    /// details. Returns how many statuses changed.
    pub fn refresh_statuses(&mut self) -> SweepResult<usize> {
        let mut changed = 0;

        for run in self.runs.iter_mut().filter(|run| !run.status.is_terminal()) {
            let Some(run_id) = run.run_id.as_deref() else {
                continue;
            };
            let details = self.service.get_run_details(run_id)?;
            match RunStatus::from_details(&details) {
                Some(status) if status != run.status => {
                    info!(run = %run.name, from = %run.status, to = %status, "run status changed");
                    run.status = status;
                    changed += 1;
                }
                Some(_) => {}
                None => debug!(run = %run.name, "run details carry no state"),
            }
        }

        Ok(changed)
    }

    /// Remote metadata document for a registered run.
    pub fn run_details(&self, name: &str) -> SweepResult<serde_json::Value> {
        let run_id = self.resolved_id(name)?;
        Ok(self.service.get_run_details(run_id)?)
    }

    /// Download the run's training log from the results bucket and scrape
    /// its final metrics.
    pub fn fetch_final_metrics(&self, name: &str, store: &dyn ObjectStore) -> SweepResult<FinalMetrics> {
        let run_id = self.resolved_id(name)?;
        let bucket = self
            .config
            .results_bucket
            .as_deref()
            .ok_or_else(|| SweepError::Settings("no results bucket configured".to_string()))?;

        let log = store.download(bucket, &training_log_key(run_id))?;
        let metrics = FinalMetrics::parse(&String::from_utf8_lossy(&log));
        debug!(run = name, run_id = run_id, metrics = ?metrics, "final metrics fetched");
        Ok(metrics)
    }

    fn resolved_id(&self, name: &str) -> SweepResult<&str> {
        let run = self.run(name).ok_or_else(|| RunError::UnknownRun {
            name: name.to_string(),
        })?;
        run.run_id.as_deref().ok_or_else(|| {
            RunError::Unresolved {
                name: name.to_string(),
            }
            .into()
        })
    }
}
