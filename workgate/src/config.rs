// Configuration management with layered configuration (file, env)

use crate::errors::ValidationError;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub processor: ProcessorSettings,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerSettings {
    /// The host runs a background back-end that handles content-URI triggers,
    /// so the greedy scheduler leaves such items to it
    #[serde(default)]
    pub content_uri_triggers_delegated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorSettings {
    /// Duration of the simulated payload run by the scheduler binary
    #[serde(default = "default_simulated_run_ms")]
    pub simulated_run_ms: u64,
}

fn default_simulated_run_ms() -> u64 {
    50
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            simulated_run_ms: default_simulated_run_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub tracing_endpoint: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_port: None,
            tracing_endpoint: None,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("WORKGATE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.observability.log_level.trim().is_empty() {
            return Err(ValidationError::MissingField(
                "observability.log_level".to_string(),
            ));
        }

        if self.observability.metrics_port == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "observability.metrics_port".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if let Some(endpoint) = &self.observability.tracing_endpoint {
            if endpoint.is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "observability.tracing_endpoint".to_string(),
                    reason: "must not be empty when set".to_string(),
                });
            }
        }

        Ok(())
    }
}
