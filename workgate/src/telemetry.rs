// Telemetry module for structured logging, metrics, and tracing

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const WORK_STARTED_TOTAL: &str = "workgate_work_started_total";
pub const WORK_STOPPED_TOTAL: &str = "workgate_work_stopped_total";
pub const SIBLING_CANCELLATIONS_TOTAL: &str = "workgate_sibling_cancellations_total";
pub const TRACKED_WORK: &str = "workgate_tracked_work";

/// Initialize structured logging with JSON formatting and trace context
///
/// Sets up the tracing subscriber with:
/// - JSON formatting for structured logs
/// - Span context in all log entries
/// - Log levels from `RUST_LOG` or the configured level
/// - Optional OpenTelemetry integration
#[tracing::instrument(skip_all)]
pub fn init_logging(log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| level_filter(log_level))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(json_layer);

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        tracing_endpoint = tracing_endpoint,
        "Structured logging initialized with JSON formatting"
    );

    Ok(())
}

/// Build the filter for the configured log level directives
fn level_filter(log_level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(log_level)
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))
}

/// Initialize OpenTelemetry tracer with OTLP exporter
#[tracing::instrument(skip_all)]
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", "workgate"),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    let tracer = tracer_provider.tracer("workgate");

    tracing::info!(
        endpoint = endpoint,
        "OpenTelemetry tracer initialized with OTLP exporter"
    );

    Ok(tracer)
}

/// Shutdown OpenTelemetry tracer provider
///
/// This should be called on graceful shutdown to flush remaining spans
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Initialize Prometheus metrics exporter and describe the scheduler metrics
#[tracing::instrument(skip_all)]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        WORK_STARTED_TOTAL,
        "Total number of start signals issued to the execution engine"
    );
    describe_counter!(
        WORK_STOPPED_TOTAL,
        "Total number of stop signals issued to the execution engine"
    );
    describe_counter!(
        SIBLING_CANCELLATIONS_TOTAL,
        "Total number of cancellations forwarded to sibling schedulers"
    );
    describe_gauge!(
        TRACKED_WORK,
        "Current number of work items on the greedy watch-list"
    );

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

/// Record a start signal. `reason` is "unconstrained" or "constraints_met".
#[inline]
pub fn record_work_started(reason: &'static str) {
    counter!(WORK_STARTED_TOTAL, "reason" => reason).increment(1);
}

/// Record a stop signal. `reason` is "cancelled", "constraints_not_met" or "pruned".
#[inline]
pub fn record_work_stopped(reason: &'static str) {
    counter!(WORK_STOPPED_TOTAL, "reason" => reason).increment(1);
}

#[inline]
pub fn record_sibling_cancellation(scheduler: &str) {
    counter!(SIBLING_CANCELLATIONS_TOTAL, "scheduler" => scheduler.to_string()).increment(1);
}

#[inline]
pub fn update_tracked_work(size: usize) {
    gauge!(TRACKED_WORK).set(size as f64);
}
