// In-process execution engine running work payloads on tokio tasks

use super::engine::{ExecutionEngine, ExecutionListener, WorkOutcome, WorkRunner};
use crate::errors::ExecutionError;
use crate::models::WorkId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

enum ProcessorCommand {
    Start(WorkId),
    Stop(WorkId),
    Finished {
        id: WorkId,
        attempt: u64,
        outcome: WorkOutcome,
    },
    Running(oneshot::Sender<Vec<WorkId>>),
    Shutdown(oneshot::Sender<()>),
}

type Listeners = Arc<RwLock<Vec<Weak<dyn ExecutionListener>>>>;

/// Processor is the in-process [`ExecutionEngine`].
///
/// `start_work` and `stop_work` only enqueue commands; a single command loop owns
/// the running attempts and notifies listeners. A stopped attempt is reported as
/// `(success = false, needs_reschedule = true)`.
pub struct Processor {
    command_tx: mpsc::UnboundedSender<ProcessorCommand>,
    listeners: Listeners,
}

impl Processor {
    /// Create a processor and spawn its command loop on the current runtime
    pub fn spawn(runner: Arc<dyn WorkRunner>) -> (Arc<Self>, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let listeners: Listeners = Arc::new(RwLock::new(Vec::new()));

        let command_loop = CommandLoop {
            runner,
            running: HashMap::new(),
            next_attempt: 0,
            command_tx: command_tx.downgrade(),
            listeners: listeners.clone(),
        };
        let handle = tokio::spawn(command_loop.run(command_rx));

        let processor = Arc::new(Self {
            command_tx,
            listeners,
        });
        (processor, handle)
    }

    /// Ids with an attempt currently in flight
    pub async fn running(&self) -> Result<Vec<WorkId>, ExecutionError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(ProcessorCommand::Running(tx))
            .map_err(|_| ExecutionError::ProcessorStopped)?;
        rx.await.map_err(|_| ExecutionError::ProcessorStopped)
    }

    /// Abort every in-flight attempt and stop the command loop
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), ExecutionError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(ProcessorCommand::Shutdown(tx))
            .map_err(|_| ExecutionError::ProcessorStopped)?;
        rx.await.map_err(|_| ExecutionError::ProcessorStopped)
    }

    fn send(&self, command: ProcessorCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("Processor command loop is not running, dropping command");
        }
    }
}

impl ExecutionEngine for Processor {
    fn start_work(&self, id: &WorkId) {
        self.send(ProcessorCommand::Start(id.clone()));
    }

    fn stop_work(&self, id: &WorkId) {
        self.send(ProcessorCommand::Stop(id.clone()));
    }

    fn add_execution_listener(&self, listener: Weak<dyn ExecutionListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}

struct CommandLoop {
    runner: Arc<dyn WorkRunner>,
    running: HashMap<WorkId, (u64, JoinHandle<()>)>,
    next_attempt: u64,
    command_tx: mpsc::WeakUnboundedSender<ProcessorCommand>,
    listeners: Listeners,
}

impl CommandLoop {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<ProcessorCommand>) {
        info!("Processor command loop started");

        while let Some(command) = command_rx.recv().await {
            match command {
                ProcessorCommand::Start(id) => self.start(id),
                ProcessorCommand::Stop(id) => self.stop(&id),
                ProcessorCommand::Finished {
                    id,
                    attempt,
                    outcome,
                } => self.finish(id, attempt, outcome),
                ProcessorCommand::Running(reply) => {
                    let _ = reply.send(self.running.keys().cloned().collect());
                }
                ProcessorCommand::Shutdown(reply) => {
                    for (_, (_, handle)) in self.running.drain() {
                        handle.abort();
                    }
                    let _ = reply.send(());
                    break;
                }
            }
        }

        info!("Processor command loop stopped");
    }

    fn start(&mut self, id: WorkId) {
        if self.running.contains_key(&id) {
            debug!(work_id = %id, "Work is already running, ignoring start");
            return;
        }
        let Some(command_tx) = self.command_tx.upgrade() else {
            return;
        };

        self.next_attempt += 1;
        let attempt = self.next_attempt;
        let runner = self.runner.clone();
        let task_id = id.clone();

        let handle = tokio::spawn(async move {
            let outcome = runner.run(&task_id).await;
            let _ = command_tx.send(ProcessorCommand::Finished {
                id: task_id,
                attempt,
                outcome,
            });
        });

        debug!(work_id = %id, attempt, "Work started");
        self.running.insert(id, (attempt, handle));
    }

    fn stop(&mut self, id: &WorkId) {
        match self.running.remove(id) {
            Some((attempt, handle)) => {
                handle.abort();
                info!(work_id = %id, attempt, "Work interrupted");
                self.notify(id, false, true);
            }
            None => debug!(work_id = %id, "Work is not running, ignoring stop"),
        }
    }

    fn finish(&mut self, id: WorkId, attempt: u64, outcome: WorkOutcome) {
        let current = self.running.get(&id).map(|(current, _)| *current);
        if current != Some(attempt) {
            debug!(work_id = %id, attempt, "Discarding result of superseded attempt");
            return;
        }

        self.running.remove(&id);
        info!(work_id = %id, attempt, outcome = ?outcome, "Work finished");
        self.notify(&id, outcome.is_success(), outcome.needs_reschedule());
    }

    fn notify(&self, id: &WorkId, success: bool, needs_reschedule: bool) {
        let live: Vec<Arc<dyn ExecutionListener>> = {
            let mut listeners = self
                .listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            listeners.retain(|listener| listener.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };

        for listener in live {
            listener.on_executed(id, success, needs_reschedule);
        }
    }
}
