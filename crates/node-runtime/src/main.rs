//! # Plexus Node Runtime
//!
//! Entry point of a Plexus node.
//!
//! ## Startup Sequence
//!
//! 1. Install telemetry (logging + metrics registry)
//! 2. Load `NodeConfig` from defaults and `PX_*` overrides
//! 3. Build the `PlatformContext`
//! 4. Start the callback sweep and the block sealing loop
//! 5. Wait for ctrl-c, then signal shutdown through a watch channel

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use node_runtime::{NodeConfig, PlatformContext};
use px_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};

/// Grace period for background tasks after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The running node.
struct NodeRuntime {
    context: Arc<PlatformContext>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NodeRuntime {
    fn new(config: NodeConfig) -> Result<Self> {
        let context = PlatformContext::build(config).context("Failed to build platform context")?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            context: Arc::new(context),
            shutdown_tx,
            shutdown_rx,
        })
    }

    fn start(&self) -> Vec<JoinHandle<()>> {
        let config = &self.context.config;
        info!("===========================================");
        info!("  Plexus Node Starting");
        info!("===========================================");
        info!(origin = %config.node.origin, replica_id = %config.node.replica_id, "Node identity");
        info!(
            callback_ttl_ms = config.consensus.callback_ttl_ms,
            resolution = ?config.consensus.resolution,
            max_frame_bytes = config.ipc.max_frame_bytes,
            echo_to_caller = config.dispatch.echo_to_caller,
            "Runtime limits"
        );

        let tasks = self.context.spawn_background(self.shutdown_rx.clone());
        info!(tasks = tasks.len(), "Background tasks started");
        tasks
    }

    async fn shutdown(&self, tasks: Vec<JoinHandle<()>>) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        for task in tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Background task ended abnormally"),
                Err(_) => warn!("Background task did not stop within the grace period"),
            }
        }

        let pending = self.context.callbacks.pending_count();
        if pending > 0 {
            warn!(pending, "Dropping unresolved callbacks");
        }
        match encode_metrics() {
            Ok(metrics) => debug!(metrics = %metrics, "Final metrics"),
            Err(e) => warn!(error = %e, "Failed to encode metrics"),
        }

        info!("Shutdown complete");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let config = NodeConfig::from_env().context("Failed to load configuration")?;
    let runtime = NodeRuntime::new(config)?;
    let tasks = runtime.start();

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    runtime.shutdown(tasks).await;
    Ok(())
}
