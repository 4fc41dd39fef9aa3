// Scheduler back-ends, the scheduler registry and cross-scheduler cancellation

pub mod dispatcher;
pub mod greedy;
pub mod registry;

pub use dispatcher::CancellationDispatcher;
pub use greedy::GreedyScheduler;
pub use registry::SchedulerRegistry;

use crate::models::{WorkId, WorkItem};
use async_trait::async_trait;
use std::fmt;
use uuid::Uuid;

/// Identity of one installed scheduler back-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedulerId(Uuid);

impl SchedulerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SchedulerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduler trait implemented by every scheduler back-end
///
/// Several back-ends may be handed the same work item; each decides on its own
/// whether the item belongs to it.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Stable identity, used to skip the origin when broadcasting cancellations
    fn id(&self) -> SchedulerId;

    /// Human readable back-end name for logs and metrics
    fn name(&self) -> &str;

    /// Consider a batch of work items for scheduling
    async fn schedule(&self, items: &[WorkItem]);

    /// Stop tracking and running `id`. Unknown ids are a no-op.
    async fn cancel(&self, id: &WorkId);
}
