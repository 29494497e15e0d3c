//! Prometheus metrics for Plexus subsystems.
//!
//! All metrics follow the naming convention: `px_<area>_<metric>_total`

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // DISPATCH METRICS
    // =========================================================================

    /// Dispatched requests by execution path and outcome
    pub static ref DISPATCH_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("px_dispatch_requests_total", "Dispatched requests"),
        &["path", "outcome"]  // path: query/off_chain/on_chain, outcome: ok or error kind
    ).expect("metric creation failed");

    // =========================================================================
    // CONSENSUS BRIDGE METRICS
    // =========================================================================

    /// Chain callbacks resolved by a commit
    pub static ref CALLBACKS_RESOLVED: Counter = Counter::new(
        "px_callbacks_resolved_total",
        "Chain callbacks resolved by a committed transaction"
    ).expect("metric creation failed");

    /// Chain callbacks dropped by timeout or sweep
    pub static ref CALLBACKS_EXPIRED: Counter = Counter::new(
        "px_callbacks_expired_total",
        "Chain callbacks removed without resolution"
    ).expect("metric creation failed");

    // =========================================================================
    // SIGNALER METRICS
    // =========================================================================

    /// Signals handed to a listener
    pub static ref SIGNALS_DELIVERED: Counter = Counter::new(
        "px_signals_delivered_total",
        "Signals delivered to listeners"
    ).expect("metric creation failed");

    /// Listener deliveries that failed
    pub static ref SIGNAL_FAILURES: Counter = Counter::new(
        "px_signal_failures_total",
        "Listener deliveries that returned an error or panicked"
    ).expect("metric creation failed");

    // =========================================================================
    // IPC METRICS
    // =========================================================================

    /// Frames decoded from sandbox channels
    pub static ref IPC_FRAMES_DECODED: Counter = Counter::new(
        "px_ipc_frames_decoded_total",
        "Frames decoded from sandbox channels"
    ).expect("metric creation failed");

    /// Channels closed because of a framing violation
    pub static ref IPC_FRAMING_ERRORS: Counter = Counter::new(
        "px_ipc_framing_errors_total",
        "Sandbox channels closed on a framing error"
    ).expect("metric creation failed");
}

/// Handle proving metrics are registered.
pub struct MetricsHandle {
    _registry: Registry,
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once: collectors that are already registered are
/// left in place.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(DISPATCH_REQUESTS.clone()),
        Box::new(CALLBACKS_RESOLVED.clone()),
        Box::new(CALLBACKS_EXPIRED.clone()),
        Box::new(SIGNALS_DELIVERED.clone()),
        Box::new(SIGNAL_FAILURES.clone()),
        Box::new(IPC_FRAMES_DECODED.clone()),
        Box::new(IPC_FRAMING_ERRORS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: REGISTRY.clone(),
    })
}

/// Count one dispatched request.
pub fn record_dispatch(path: &str, outcome: &str) {
    DISPATCH_REQUESTS.with_label_values(&[path, outcome]).inc();
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
