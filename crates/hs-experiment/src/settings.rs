//! Project settings file.

use hs_types::{SweepError, SweepResult};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::experiment::PollPolicy;
use crate::service::Runtime;

/// Environment variable naming the settings file.
pub const SETTINGS_ENV_VAR: &str = "HYPERSWEEP_SETTINGS";

const PROJECT_ID_PLACEHOLDER: &str = "xxxxx";

/// Project-level configuration shared by every experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Project id; values containing the `xxxxx` placeholder count as unset.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub data_bucket: Option<String>,
    #[serde(default)]
    pub results_bucket: Option<String>,
    #[serde(default = "default_framework")]
    pub framework: Runtime,
    #[serde(default = "default_runtime")]
    pub runtime: Runtime,
    #[serde(default = "default_compute_profile")]
    pub compute_profile: String,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default = "default_bundle_dir")]
    pub bundle_dir: PathBuf,
}

/// Identifier-resolution polling, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            timeout_secs: default_poll_timeout(),
        }
    }
}

fn default_framework() -> Runtime {
    Runtime::new("tensorflow", "1.5")
}

fn default_runtime() -> Runtime {
    Runtime::new("python", "3.5")
}

fn default_compute_profile() -> String {
    "k80".to_string()
}

fn default_bundle_dir() -> PathBuf {
    PathBuf::from("bundles")
}

fn default_poll_interval() -> u64 {
    1
}

fn default_poll_timeout() -> u64 {
    60
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            project_id: None,
            data_bucket: None,
            results_bucket: None,
            framework: default_framework(),
            runtime: default_runtime(),
            compute_profile: default_compute_profile(),
            poll: PollSettings::default(),
            bundle_dir: default_bundle_dir(),
        }
    }
}

impl ProjectSettings {
    /// `<config_dir>/hypersweep/settings.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hypersweep").join("settings.json"))
    }

    /// Pick the settings file: `explicit`, then `$HYPERSWEEP_SETTINGS`, then
    /// the default location.
    pub fn resolve_path(explicit: Option<&Path>, env_value: Option<OsString>) -> SweepResult<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(value) = env_value.filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(value));
        }
        Self::default_path()
            .ok_or_else(|| SweepError::Settings("no configuration directory on this platform".to_string()))
    }

    /// Load settings following the resolution order of [`Self::resolve_path`].
    pub fn load(explicit: Option<&Path>) -> SweepResult<Self> {
        let path = Self::resolve_path(explicit, std::env::var_os(SETTINGS_ENV_VAR))?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> SweepResult<Self> {
        if !path.is_file() {
            return Err(SweepError::Settings(format!(
                "settings file not found: {}",
                path.display()
            )));
        }
        let text = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        info!(path = %path.display(), project = ?settings.project_id(), "settings loaded");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> SweepResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// The configured project id, unless it is missing or still the placeholder.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && !id.contains(PROJECT_ID_PLACEHOLDER))
    }

    pub fn set_project_id(&mut self, project_id: impl Into<String>) {
        self.project_id = Some(project_id.into());
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll.interval_secs),
            timeout: Duration::from_secs(self.poll.timeout_secs),
        }
    }
}
