//! Telemetry configuration from environment variables.

use std::env;

use crate::TelemetryError;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` expression such as `px_02_signaler=debug,info`)
    pub log_level: String,

    /// Emit JSON formatted logs
    pub json_logs: bool,

    /// Include source file and line in log lines
    pub with_source_location: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "plexus-node".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            with_source_location: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PX_SERVICE_NAME`: Service name (default: plexus-node)
    /// - `PX_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `PX_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `PX_LOG_SOURCE`: Include file/line (default: false)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("PX_SERVICE_NAME")
                .unwrap_or_else(|_| "plexus-node".to_string()),

            log_level: env::var("PX_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("PX_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),

            with_source_location: env::var("PX_LOG_SOURCE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }

    /// Reject configurations that cannot produce a filter.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.log_level.trim().is_empty() {
            return Err(TelemetryError::Config("log level cannot be empty".into()));
        }
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::Config("service name cannot be empty".into()));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}
