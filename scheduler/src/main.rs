// Scheduler binary entry point
// Replays a scenario file against the in-process greedy scheduler.

mod host;
mod scenario;

use anyhow::{Context, Result};
use host::Host;
use scenario::Scenario;
use tracing::{error, info, warn};
use workgate::config::Settings;
use workgate::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings.validate().context("Invalid configuration")?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    info!("Starting workgate scheduler");

    let scenario = match std::env::args().nth(1) {
        Some(path) => {
            let scenario = Scenario::load(&path).map_err(|e| {
                error!(error = %e, path = %path, "Failed to load scenario");
                e
            })?;
            info!(path = %path, steps = scenario.steps.len(), "Scenario loaded");
            Some(scenario)
        }
        None => None,
    };

    let initial = scenario
        .as_ref()
        .map(|s| s.device)
        .unwrap_or_default();
    let host = Host::start(&settings, initial)?;

    match &scenario {
        Some(scenario) => {
            tokio::select! {
                result = host.replay(scenario) => {
                    let summary = result?;
                    info!(
                        completions = summary.completions.len(),
                        succeeded = summary.completions.iter().filter(|c| c.success).count(),
                        needs_reschedule = summary
                            .completions
                            .iter()
                            .filter(|c| c.needs_reschedule)
                            .count(),
                        still_tracked = summary.still_tracked.len(),
                        still_running = summary.still_running.len(),
                        "Scenario finished"
                    );
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("Received Ctrl+C signal, abandoning scenario");
                }
            }
        }
        None => {
            info!("No scenario given, idling until Ctrl+C");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C signal, initiating graceful shutdown");
        }
    }

    if let Err(e) = host.shutdown().await {
        error!(error = %e, "Error during shutdown");
    }
    telemetry::shutdown_tracer();

    info!("Scheduler stopped");
    Ok(())
}
