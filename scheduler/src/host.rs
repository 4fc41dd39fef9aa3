// In-process host: registry, dispatcher, processor, tracker and greedy scheduler

use crate::scenario::{Scenario, Step};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use workgate::config::Settings;
use workgate::constraints::{
    ConstraintTracker, DeviceState, HostCapabilities, WorkConstraintsTracker,
};
use workgate::errors::ExecutionError;
use workgate::execution::{
    ExecutionEngine, ExecutionListener, Processor, WorkOutcome, WorkRunner,
};
use workgate::models::WorkId;
use workgate::scheduler::{CancellationDispatcher, GreedyScheduler, SchedulerRegistry};

/// Payload stand-in that sleeps for a fixed duration and succeeds
pub struct SimulatedRunner {
    run_for: Duration,
}

impl SimulatedRunner {
    pub fn new(run_for: Duration) -> Self {
        Self { run_for }
    }
}

#[async_trait]
impl WorkRunner for SimulatedRunner {
    async fn run(&self, id: &WorkId) -> WorkOutcome {
        debug!(work_id = %id, "Running simulated payload");
        tokio::time::sleep(self.run_for).await;
        WorkOutcome::Success
    }
}

/// One completion report from the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: WorkId,
    pub success: bool,
    pub needs_reschedule: bool,
}

/// Keeps every completion report for the end-of-run summary
#[derive(Default)]
pub struct CompletionLog {
    entries: Mutex<Vec<Completion>>,
}

impl CompletionLog {
    pub fn entries(&self) -> Vec<Completion> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ExecutionListener for CompletionLog {
    fn on_executed(&self, id: &WorkId, success: bool, needs_reschedule: bool) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Completion {
                id: id.clone(),
                success,
                needs_reschedule,
            });
    }
}

/// Summary of a replayed scenario
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub completions: Vec<Completion>,
    pub still_tracked: Vec<WorkId>,
    pub still_running: Vec<WorkId>,
}

pub struct Host {
    registry: Arc<SchedulerRegistry>,
    dispatcher: CancellationDispatcher,
    dispatcher_handle: JoinHandle<()>,
    processor: Arc<Processor>,
    processor_handle: JoinHandle<()>,
    tracker: Arc<WorkConstraintsTracker>,
    greedy: Arc<GreedyScheduler>,
    completions: Arc<CompletionLog>,
}

impl Host {
    /// Wire every component and register the greedy scheduler
    #[instrument(skip_all)]
    pub fn start(settings: &Settings, initial: DeviceState) -> Result<Self> {
        let registry = Arc::new(SchedulerRegistry::new());
        let (dispatcher, dispatcher_handle) = CancellationDispatcher::spawn(&registry);

        let runner = Arc::new(SimulatedRunner::new(Duration::from_millis(
            settings.processor.simulated_run_ms,
        )));
        let (processor, processor_handle) = Processor::spawn(runner);

        let completions = Arc::new(CompletionLog::default());
        let listener: Weak<dyn ExecutionListener> = Arc::downgrade(&completions) as Weak<CompletionLog>;
        processor.add_execution_listener(listener);

        let capabilities =
            HostCapabilities::new(settings.scheduler.content_uri_triggers_delegated);

        let mut spawned = None;
        let greedy = GreedyScheduler::new(
            processor.clone(),
            capabilities,
            dispatcher.clone(),
            |callback| {
                let (tracker, handle) = WorkConstraintsTracker::spawn(initial, callback);
                spawned = Some((tracker.clone(), handle));
                tracker as Arc<dyn ConstraintTracker>
            },
        );
        let (tracker, _notifier) =
            spawned.ok_or_else(|| anyhow!("Constraint tracker was not created"))?;

        registry.register(greedy.clone());

        info!(
            content_uri_triggers_delegated = capabilities.content_uri_triggers_delegated,
            schedulers = registry.len(),
            "Host started"
        );

        Ok(Self {
            registry,
            dispatcher,
            dispatcher_handle,
            processor,
            processor_handle,
            tracker,
            greedy,
            completions,
        })
    }

    /// Apply one scenario step
    #[instrument(skip(self))]
    pub async fn apply(&self, step: &Step) {
        match step {
            Step::Schedule { items } => self.registry.schedule_all(items).await,
            Step::Device { state } => self.tracker.update_state(*state),
            Step::Cancel { id } => self.registry.cancel_all(id).await,
            Step::Prune { live } => {
                let live: HashSet<WorkId> = live.iter().cloned().collect();
                let pruned = self.greedy.prune(&live);
                info!(pruned = pruned.len(), "Pruned tracked work");
            }
            Step::Sleep { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
        }
    }

    /// Replay every step in order, then wait for pending sibling cancellations
    pub async fn replay(&self, scenario: &Scenario) -> Result<RunSummary> {
        for (index, step) in scenario.steps.iter().enumerate() {
            debug!(step = index, "Applying scenario step");
            self.apply(step).await;
        }
        self.dispatcher.flush().await?;

        Ok(RunSummary {
            completions: self.completions.entries(),
            still_tracked: self.greedy.tracked_ids(),
            still_running: self.processor.running().await?,
        })
    }

    /// Stop the processor, then drain and stop the dispatcher
    #[instrument(skip(self))]
    pub async fn shutdown(self) -> Result<()> {
        self.processor.shutdown().await?;
        let processor_result = self.processor_handle.await.map_err(ExecutionError::from);
        if let Err(e) = &processor_result {
            warn!(error = %e, "Processor task ended abnormally");
        }

        self.dispatcher.shutdown().await?;
        if let Err(e) = self.dispatcher_handle.await {
            warn!(error = %e, "Dispatcher task ended abnormally");
        }

        processor_result?;
        info!("Host stopped");
        Ok(())
    }
}
