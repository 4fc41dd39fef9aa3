// Greedy in-process scheduler
//
// Starts unconstrained one-shot work immediately and tracks constrained work until
// its constraints are met. All entry points run under one lock.

use super::{CancellationDispatcher, Scheduler, SchedulerId};
use crate::constraints::{ConstraintTracker, HostCapabilities, WorkConstraintsCallback};
use crate::execution::{ExecutionEngine, ExecutionListener};
use crate::models::{WorkId, WorkItem};
use crate::telemetry;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, instrument, warn};

/// GreedyScheduler schedules unconstrained, non-timed work right away and hands
/// constrained work to a [`ConstraintTracker`].
///
/// Eligible items are `Enqueued`, non-periodic and have no initial delay; every
/// other item is left to the other back-ends. Tracked items stay on the watch-list
/// across constraint flips and leave it only on `cancel`, completion, or `prune`.
pub struct GreedyScheduler {
    id: SchedulerId,
    engine: Arc<dyn ExecutionEngine>,
    tracker: Arc<dyn ConstraintTracker>,
    capabilities: HostCapabilities,
    dispatcher: CancellationDispatcher,
    watch_list: Mutex<Vec<WorkItem>>,
}

impl GreedyScheduler {
    /// Create the scheduler and register it as an execution listener.
    ///
    /// `make_tracker` receives the callback the tracker must report to.
    pub fn new<F>(
        engine: Arc<dyn ExecutionEngine>,
        capabilities: HostCapabilities,
        dispatcher: CancellationDispatcher,
        make_tracker: F,
    ) -> Arc<Self>
    where
        F: FnOnce(Weak<dyn WorkConstraintsCallback>) -> Arc<dyn ConstraintTracker>,
    {
        let scheduler = Arc::new_cyclic(|weak: &Weak<Self>| {
            let callback: Weak<dyn WorkConstraintsCallback> = weak.clone();
            Self {
                id: SchedulerId::new(),
                engine: engine.clone(),
                tracker: make_tracker(callback),
                capabilities,
                dispatcher,
                watch_list: Mutex::new(Vec::new()),
            }
        });

        let listener: Weak<dyn ExecutionListener> = Arc::downgrade(&scheduler) as Weak<Self>;
        engine.add_execution_listener(listener);

        info!(scheduler_id = %scheduler.id, "Greedy scheduler created");
        scheduler
    }

    /// Admit or track a batch of items, in order
    #[instrument(skip(self, items), fields(scheduler_id = %self.id, batch = items.len()))]
    pub fn schedule_items(&self, items: &[WorkItem]) {
        let mut watch_list = self.lock();
        let mut changed = false;

        for item in items {
            if !item.is_greedy_eligible() {
                continue;
            }

            if !item.has_constraints() {
                changed |= untrack(&mut watch_list, &item.id);
                debug!(work_id = %item.id, "Starting unconstrained work");
                self.engine.start_work(&item.id);
                telemetry::record_work_started("unconstrained");
                continue;
            }

            if !self.capabilities.supports(&item.constraints) {
                changed |= untrack(&mut watch_list, &item.id);
                debug!(
                    work_id = %item.id,
                    "Leaving content-URI triggered work to a background scheduler"
                );
                continue;
            }

            match watch_list.iter_mut().find(|tracked| tracked.id == item.id) {
                Some(tracked) if tracked == item => {}
                Some(tracked) => {
                    debug!(work_id = %item.id, "Updating tracked work");
                    *tracked = item.clone();
                    changed = true;
                }
                None => {
                    debug!(work_id = %item.id, "Starting tracking");
                    watch_list.push(item.clone());
                    changed = true;
                }
            }
        }

        if changed {
            self.sync_tracker(&watch_list);
        }
    }

    /// Stop `id` and drop it from the watch-list. Safe to repeat.
    #[instrument(skip(self), fields(scheduler_id = %self.id, work_id = %id))]
    pub fn cancel_work(&self, id: &WorkId) {
        let mut watch_list = self.lock();

        debug!("Cancelling work");
        self.engine.stop_work(id);
        telemetry::record_work_stopped("cancelled");

        if untrack(&mut watch_list, id) {
            self.sync_tracker(&watch_list);
        }
    }

    /// Stop and untrack every tracked item whose id is not in `live`.
    ///
    /// Items omitted from a later `schedule` batch stay tracked until pruned.
    #[instrument(skip(self, live), fields(scheduler_id = %self.id, live = live.len()))]
    pub fn prune(&self, live: &HashSet<WorkId>) -> Vec<WorkId> {
        let mut watch_list = self.lock();

        let mut pruned = Vec::new();
        watch_list.retain(|item| {
            let keep = live.contains(&item.id);
            if !keep {
                pruned.push(item.id.clone());
            }
            keep
        });

        for id in &pruned {
            debug!(work_id = %id, "Pruning tracked work");
            self.engine.stop_work(id);
            telemetry::record_work_stopped("pruned");
        }

        if !pruned.is_empty() {
            self.sync_tracker(&watch_list);
        }
        pruned
    }

    /// Ids on the watch-list, in tracking order
    pub fn tracked_ids(&self) -> Vec<WorkId> {
        self.lock().iter().map(|item| item.id.clone()).collect()
    }

    pub fn tracked_len(&self) -> usize {
        self.lock().len()
    }

    fn sync_tracker(&self, watch_list: &[WorkItem]) {
        self.tracker.replace(watch_list);
        telemetry::update_tracked_work(watch_list.len());
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WorkItem>> {
        self.watch_list.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn untrack(watch_list: &mut Vec<WorkItem>, id: &WorkId) -> bool {
    match watch_list.iter().position(|item| &item.id == id) {
        Some(index) => {
            debug!(work_id = %id, "Stopping tracking");
            watch_list.remove(index);
            true
        }
        None => false,
    }
}

#[async_trait]
impl Scheduler for GreedyScheduler {
    fn id(&self) -> SchedulerId {
        self.id
    }

    fn name(&self) -> &str {
        "greedy"
    }

    async fn schedule(&self, items: &[WorkItem]) {
        self.schedule_items(items);
    }

    async fn cancel(&self, id: &WorkId) {
        self.cancel_work(id);
    }
}

impl WorkConstraintsCallback for GreedyScheduler {
    fn on_all_constraints_met(&self, ids: &[WorkId]) {
        let watch_list = self.lock();
        for id in ids {
            if !watch_list.iter().any(|item| &item.id == id) {
                debug!(work_id = %id, "Work is no longer tracked, ignoring constraints met");
                continue;
            }
            debug!(work_id = %id, "Constraints met: starting work");
            self.engine.start_work(id);
            telemetry::record_work_started("constraints_met");
        }
    }

    fn on_all_constraints_not_met(&self, ids: &[WorkId]) {
        let _guard = self.lock();
        for id in ids {
            debug!(work_id = %id, "Constraints not met: stopping work");
            self.engine.stop_work(id);
            telemetry::record_work_stopped("constraints_not_met");
        }
    }
}

impl ExecutionListener for GreedyScheduler {
    fn on_executed(&self, id: &WorkId, success: bool, needs_reschedule: bool) {
        {
            let mut watch_list = self.lock();
            if untrack(&mut watch_list, id) {
                self.sync_tracker(&watch_list);
            }
        }

        debug!(
            work_id = %id,
            success,
            needs_reschedule,
            "Work executed, cancelling on sibling schedulers"
        );
        if let Err(e) = self.dispatcher.submit(self.id, id.clone()) {
            warn!(work_id = %id, error = %e, "Failed to queue sibling cancellation");
        }
    }
}
