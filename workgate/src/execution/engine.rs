// Execution engine seams used by schedulers

use crate::models::WorkId;
use async_trait::async_trait;
use std::sync::Weak;

/// Execution engine trait: fire-and-forget start/stop signals
///
/// Both signals must be non-blocking hand-offs; they are issued while a
/// scheduler holds its lock.
#[cfg_attr(test, mockall::automock)]
pub trait ExecutionEngine: Send + Sync {
    /// Request execution of `id`. Starting an id that is already running is a no-op.
    fn start_work(&self, id: &WorkId);

    /// Request that `id` stops. Stopping an unknown id is a no-op.
    fn stop_work(&self, id: &WorkId);

    /// Register a listener for completion reports. Held weakly.
    fn add_execution_listener(&self, listener: Weak<dyn ExecutionListener>);
}

/// Completion reports from the execution engine
#[cfg_attr(test, mockall::automock)]
pub trait ExecutionListener: Send + Sync {
    /// Called once per execution attempt, regardless of which scheduler started it
    fn on_executed(&self, id: &WorkId, success: bool, needs_reschedule: bool);
}

/// Result of one run of a work payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Success,
    Failure,
    Retry,
}

impl WorkOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkOutcome::Success)
    }

    pub fn needs_reschedule(&self) -> bool {
        matches!(self, WorkOutcome::Retry)
    }
}

/// Payload runner used by the in-process [`Processor`](super::Processor)
#[async_trait]
pub trait WorkRunner: Send + Sync {
    async fn run(&self, id: &WorkId) -> WorkOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(
            (
                WorkOutcome::Success.is_success(),
                WorkOutcome::Success.needs_reschedule()
            ),
            (true, false)
        );
        assert_eq!(
            (
                WorkOutcome::Failure.is_success(),
                WorkOutcome::Failure.needs_reschedule()
            ),
            (false, false)
        );
        assert_eq!(
            (
                WorkOutcome::Retry.is_success(),
                WorkOutcome::Retry.needs_reschedule()
            ),
            (false, true)
        );
    }
}
