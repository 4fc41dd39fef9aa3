// Cross-scheduler cancellation dispatcher
// Requests are replayed by one task, outside every scheduler lock, in submission order.

use super::{SchedulerId, SchedulerRegistry};
use crate::errors::DispatchError;
use crate::models::WorkId;
use crate::telemetry;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

enum DispatchCommand {
    Cancel { origin: SchedulerId, id: WorkId },
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle for submitting sibling cancellations to the dispatcher task
#[derive(Clone)]
pub struct CancellationDispatcher {
    command_tx: mpsc::UnboundedSender<DispatchCommand>,
}

impl CancellationDispatcher {
    /// Spawn the dispatcher task on the current runtime.
    ///
    /// The registry is held weakly; the task exits on `shutdown` or once every
    /// handle is dropped.
    pub fn spawn(registry: &Arc<SchedulerRegistry>) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_dispatcher(command_rx, Arc::downgrade(registry)));
        (Self { command_tx }, handle)
    }

    /// Queue cancellation of `id` on every registered scheduler except `origin`.
    /// Never blocks.
    pub fn submit(&self, origin: SchedulerId, id: WorkId) -> Result<(), DispatchError> {
        self.command_tx
            .send(DispatchCommand::Cancel { origin, id })
            .map_err(|_| DispatchError::Closed)
    }

    /// Wait until every request submitted before this call has been delivered
    pub async fn flush(&self) -> Result<(), DispatchError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(DispatchCommand::Flush(tx))
            .map_err(|_| DispatchError::Closed)?;
        rx.await
            .map_err(|_| DispatchError::ResponseDropped("flush".to_string()))
    }

    /// Deliver pending requests, then stop the dispatcher task
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(DispatchCommand::Shutdown(tx))
            .map_err(|_| DispatchError::Closed)?;
        rx.await
            .map_err(|_| DispatchError::ResponseDropped("shutdown".to_string()))
    }
}

async fn run_dispatcher(
    mut command_rx: mpsc::UnboundedReceiver<DispatchCommand>,
    registry: Weak<SchedulerRegistry>,
) {
    info!("Cancellation dispatcher started");

    while let Some(command) = command_rx.recv().await {
        match command {
            DispatchCommand::Cancel { origin, id } => {
                let Some(registry) = registry.upgrade() else {
                    warn!(work_id = %id, "Scheduler registry is gone, dropping cancellation");
                    continue;
                };
                for scheduler in registry.list_schedulers() {
                    if scheduler.id() == origin {
                        continue;
                    }
                    debug!(
                        work_id = %id,
                        scheduler = scheduler.name(),
                        "Cancelling completed work on sibling scheduler"
                    );
                    scheduler.cancel(&id).await;
                    telemetry::record_sibling_cancellation(scheduler.name());
                }
            }
            DispatchCommand::Flush(reply) => {
                let _ = reply.send(());
            }
            DispatchCommand::Shutdown(reply) => {
                let _ = reply.send(());
                break;
            }
        }
    }

    info!("Cancellation dispatcher stopped");
}
