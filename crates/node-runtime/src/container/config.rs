//! # Node Configuration
//!
//! Unified configuration for every subsystem of a Plexus node.
//!
//! Each section is the subsystem's own config type, so a section can be
//! deserialized on its own and the defaults live next to the code that uses
//! them. Environment variables override a handful of fields at startup:
//!
//! | Variable             | Field                        |
//! |----------------------|------------------------------|
//! | `PX_ORIGIN`          | `node.origin`                |
//! | `PX_REPLICA_ID`      | `node.replica_id`            |
//! | `PX_CALLBACK_TTL_MS` | `consensus.callback_ttl_ms`  |
//! | `PX_MAX_FRAME_BYTES` | `ipc.max_frame_bytes`        |
//! | `PX_ECHO_TO_CALLER`  | `dispatch.echo_to_caller`    |

use px_03_dispatch::DispatchConfig;
use px_04_consensus_bridge::{BridgeConfig, ResolutionKind};
use px_05_sandbox_ipc::IpcConfig;
use serde::{Deserialize, Serialize};
use shared_types::ReplicaId;
use thiserror::Error;
use tracing::warn;

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub dispatch: DispatchConfig,
    pub consensus: BridgeConfig,
    pub ipc: IpcConfig,
}

/// Identity of this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Local origin name; `user@other` subjects are federated elsewhere.
    pub origin: String,
    /// This replica's id in the consensus group.
    pub replica_id: ReplicaId,
    /// Signature stamped on packets applets send through their channel.
    /// Recorded with the transaction, never accepted as a signature.
    pub applet_marker: String,
    /// Period at which the local ordering service seals blocks.
    pub block_interval_ms: u64,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            origin: "local".to_string(),
            replica_id: ReplicaId::new("replica-0"),
            applet_marker: "#appletsign".to_string(),
            block_interval_ms: 50,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("node.origin must not be empty")]
    EmptyOrigin,

    #[error("node.replica_id must not be empty")]
    EmptyReplicaId,

    #[error("node.block_interval_ms must be positive")]
    ZeroBlockInterval,

    #[error("consensus.callback_ttl_ms must be positive")]
    ZeroCallbackTtl,

    #[error("consensus.cleanup_interval_ms must be positive")]
    ZeroCleanupInterval,

    #[error("consensus.executors must not be empty under all_executors resolution")]
    NoExecutors,

    #[error("invalid ipc section: {0}")]
    Ipc(String),

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

impl NodeConfig {
    /// Defaults overridden by the `PX_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`. Split out of [`NodeConfig::from_env`]
    /// so tests do not have to touch the process environment.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(origin) = lookup("PX_ORIGIN") {
            self.node.origin = origin;
        }
        if let Some(replica) = lookup("PX_REPLICA_ID") {
            self.node.replica_id = ReplicaId::new(replica);
        }
        if let Some(value) = lookup("PX_CALLBACK_TTL_MS") {
            self.consensus.callback_ttl_ms = parse_env("PX_CALLBACK_TTL_MS", &value)?;
        }
        if let Some(value) = lookup("PX_MAX_FRAME_BYTES") {
            self.ipc.max_frame_bytes = parse_env("PX_MAX_FRAME_BYTES", &value)?;
        }
        if let Some(value) = lookup("PX_ECHO_TO_CALLER") {
            self.dispatch.echo_to_caller = match value.as_str() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "PX_ECHO_TO_CALLER",
                        value,
                    })
                }
            };
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.origin.is_empty() {
            return Err(ConfigError::EmptyOrigin);
        }
        if self.node.replica_id.is_empty() {
            return Err(ConfigError::EmptyReplicaId);
        }
        if self.node.block_interval_ms == 0 {
            return Err(ConfigError::ZeroBlockInterval);
        }
        if self.consensus.callback_ttl_ms == 0 {
            return Err(ConfigError::ZeroCallbackTtl);
        }
        if self.consensus.cleanup_interval_ms == 0 {
            return Err(ConfigError::ZeroCleanupInterval);
        }
        if self.consensus.resolution == ResolutionKind::AllExecutors {
            if self.consensus.executors.is_empty() {
                return Err(ConfigError::NoExecutors);
            }
            if !self.consensus.executors.contains(&self.node.replica_id) {
                warn!(
                    replica_id = %self.node.replica_id,
                    "This replica is not listed as an executor; its reports will be ignored"
                );
            }
        }
        self.ipc.validate().map_err(ConfigError::Ipc)
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}
