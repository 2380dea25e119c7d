use thiserror::Error;

/// Main error type for the HyperSweep system
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Parameter space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteServiceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

/// Errors raised while declaring a parameter space
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("Invalid range for `{name}`: {message}")]
    InvalidRange { name: String, message: String },

    #[error("Type mismatch for `{name}`: {message}")]
    TypeMismatch { name: String, message: String },

    #[error("Parameter `{name}` is already declared")]
    DuplicateParameter { name: String },
}

/// Optimizer meta-parameter and request validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid {field} `{value}`: must be {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Run registration and orchestration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("Training run `{name}` is already registered")]
    DuplicateName { name: String },

    #[error("Experiment has no registered training runs")]
    NoRuns,

    #[error("Experiment has already been submitted as run {experiment_run_id}")]
    AlreadyExecuted { experiment_run_id: String },

    #[error("Training run not found: {name}")]
    UnknownRun { name: String },

    #[error("Training run `{name}` has no remote identifier yet")]
    Unresolved { name: String },
}

/// Failure reported by the training service or object storage
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{operation} failed: {message}")]
pub struct RemoteServiceError {
    pub operation: String,
    pub message: String,
}

impl RemoteServiceError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for HyperSweep operations
pub type SweepResult<T> = Result<T, SweepError>;

/// Macro for creating invalid-range errors
#[macro_export]
macro_rules! invalid_range {
    ($name:expr, $($arg:tt)*) => {
        $crate::SpaceError::InvalidRange {
            name: $name.to_string(),
            message: format!($($arg)*),
        }
    };
}

/// Macro for creating type-mismatch errors
#[macro_export]
macro_rules! type_mismatch {
    ($name:expr, $($arg:tt)*) => {
        $crate::SpaceError::TypeMismatch {
            name: $name.to_string(),
            message: format!($($arg)*),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::InvalidValue {
            field: "time unit".to_string(),
            value: "decade".to_string(),
            expected: "one of epoch, iteration, step".to_string(),
        };

        assert!(error.to_string().contains("decade"));
        assert!(error.to_string().contains("epoch, iteration, step"));
    }

    #[test]
    fn test_error_conversion() {
        let run_error = RunError::DuplicateName {
            name: "run_1".to_string(),
        };
        let sweep_error: SweepError = run_error.into();

        match sweep_error {
            SweepError::Run(RunError::DuplicateName { name }) => assert_eq!(name, "run_1"),
            _ => panic!("Expected Run error"),
        }
    }

    #[test]
    fn test_remote_error_display() {
        let error = RemoteServiceError::new("submit_experiment", "503 service unavailable");
        assert_eq!(
            error.to_string(),
            "submit_experiment failed: 503 service unavailable"
        );
    }

    #[test]
    fn test_macros() {
        let err = invalid_range!("dropout", "min {} exceeds max {}", 5, 1);
        assert_eq!(
            err,
            SpaceError::InvalidRange {
                name: "dropout".to_string(),
                message: "min 5 exceeds max 1".to_string(),
            }
        );

        let err = type_mismatch!("filters", "step must be an integer");
        assert!(matches!(err, SpaceError::TypeMismatch { .. }));
    }
}
