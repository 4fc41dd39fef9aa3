// Constraint tracker seams between schedulers and constraint monitoring

use crate::models::{Constraints, WorkId, WorkItem};

/// Monitors the environment for a set of work items and reports, in batches,
/// which of them currently have all constraints met or not met.
///
/// Implementations own their synchronization and deliver callbacks on their
/// own schedule; `replace` must never call back into the caller inline.
#[cfg_attr(test, mockall::automock)]
pub trait ConstraintTracker: Send + Sync {
    /// Reset the monitored set. Must be cheap and safe to call repeatedly,
    /// including with an unchanged or empty set.
    fn replace(&self, items: &[WorkItem]);
}

/// Receiver of constraint batches from a [`ConstraintTracker`]
#[cfg_attr(test, mockall::automock)]
pub trait WorkConstraintsCallback: Send + Sync {
    /// Every id in the batch has all of its constraints met
    fn on_all_constraints_met(&self, ids: &[WorkId]);

    /// Every id in the batch has at least one constraint not met
    fn on_all_constraints_not_met(&self, ids: &[WorkId]);
}

/// Capabilities of the host environment, supplied at construction time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCapabilities {
    /// A background back-end on this host handles content-URI triggers itself
    pub content_uri_triggers_delegated: bool,
}

impl HostCapabilities {
    pub fn new(content_uri_triggers_delegated: bool) -> Self {
        Self {
            content_uri_triggers_delegated,
        }
    }

    /// Whether an in-process scheduler should track items with these constraints
    pub fn supports(&self, constraints: &Constraints) -> bool {
        !(self.content_uri_triggers_delegated && constraints.has_content_uri_triggers())
    }
}
