// Registry of installed scheduler back-ends

use super::Scheduler;
use crate::models::{WorkId, WorkItem};
use futures::future::join_all;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, instrument};

/// SchedulerRegistry holds every installed scheduler back-end
#[derive(Default)]
pub struct SchedulerRegistry {
    schedulers: RwLock<Vec<Arc<dyn Scheduler>>>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a scheduler back-end. Installing the same back-end twice is ignored.
    pub fn register(&self, scheduler: Arc<dyn Scheduler>) {
        let mut schedulers = self
            .schedulers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if schedulers.iter().any(|s| s.id() == scheduler.id()) {
            debug!(scheduler = scheduler.name(), "Scheduler already registered");
            return;
        }
        info!(
            scheduler = scheduler.name(),
            scheduler_id = %scheduler.id(),
            "Scheduler registered"
        );
        schedulers.push(scheduler);
    }

    /// All installed schedulers, including the caller
    pub fn list_schedulers(&self) -> Vec<Arc<dyn Scheduler>> {
        self.schedulers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.schedulers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand a batch of items to every installed scheduler
    #[instrument(skip(self, items), fields(batch = items.len()))]
    pub async fn schedule_all(&self, items: &[WorkItem]) {
        if items.is_empty() {
            return;
        }
        let schedulers = self.list_schedulers();
        join_all(schedulers.iter().map(|s| s.schedule(items))).await;
    }

    /// Cancel `id` on every installed scheduler
    #[instrument(skip(self), fields(work_id = %id))]
    pub async fn cancel_all(&self, id: &WorkId) {
        for scheduler in self.list_schedulers() {
            scheduler.cancel(id).await;
        }
    }
}
