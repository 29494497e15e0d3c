//! # Plexus Telemetry
//!
//! Logging and metrics shared by every Plexus subsystem.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber`, either as
//!   human readable lines or as JSON for log shippers.
//! - **Metrics**: Prometheus counters registered in a process-wide registry.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use px_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // node runs here
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PX_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `PX_JSON_LOGS` | `false` | Emit JSON lines |
//! | `PX_SERVICE_NAME` | `plexus-node` | Service name attached to logs |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, record_dispatch, register_metrics, MetricsHandle, CALLBACKS_EXPIRED,
    CALLBACKS_RESOLVED, DISPATCH_REQUESTS, IPC_FRAMES_DECODED, IPC_FRAMING_ERRORS,
    SIGNALS_DELIVERED, SIGNAL_FAILURES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install logging and register metrics.
///
/// Returns a guard to hold for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(&config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        log_level = %config.log_level,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        service_name: config.service_name,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
