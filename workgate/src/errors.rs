// Error handling framework
// The scheduling core itself never fails; these cover its collaborators and wiring.

use thiserror::Error;

/// Cancellation dispatcher errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Cancellation dispatcher is closed")]
    Closed,

    #[error("Cancellation dispatcher dropped the {0} response")]
    ResponseDropped(String),
}

/// In-process execution engine errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Processor command loop is not running")]
    ProcessorStopped,

    #[error("Processor task failed: {0}")]
    TaskFailed(String),
}

/// Scenario replay errors
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read scenario file '{path}': {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),
}

/// Settings validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<serde_json::Error> for ScenarioError {
    fn from(err: serde_json::Error) -> Self {
        ScenarioError::InvalidScenario(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ExecutionError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExecutionError::TaskFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_display() {
        let err = DispatchError::ResponseDropped("flush".to_string());
        assert!(err.to_string().contains("flush"));
        assert!(DispatchError::Closed.to_string().contains("closed"));
    }

    #[test]
    fn test_scenario_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ScenarioError = json_err.into();
        assert!(matches!(err, ScenarioError::InvalidScenario(_)));
    }

    #[tokio::test]
    async fn test_execution_error_from_panicked_task() {
        let join_err = tokio::spawn(async { panic!("payload exploded") })
            .await
            .unwrap_err();
        let err: ExecutionError = join_err.into();

        assert!(matches!(err, ExecutionError::TaskFailed(_)));
        assert!(err.to_string().contains("Processor task failed"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidValue {
            field: "observability.metrics_port".to_string(),
            reason: "must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("metrics_port"));
    }
}
