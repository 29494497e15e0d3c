use serde::{Deserialize, Serialize};
use shared_types::ReplicaId;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::domain::callbacks::ResolutionPolicy;

/// How a pending callback is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// The submitting replica's own apply result resolves the callback.
    #[default]
    FirstResult,
    /// Every configured executor reports a digest; they must agree.
    AllExecutors,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a caller waits for its transaction to commit.
    pub callback_ttl_ms: u64,
    /// Period of the expired-callback sweep.
    pub cleanup_interval_ms: u64,
    pub resolution: ResolutionKind,
    /// Replicas expected to report under `all_executors`.
    pub executors: Vec<ReplicaId>,
    /// How long an applied correlation id is remembered against redelivery.
    pub applied_window_ms: u64,
    pub applied_max_entries: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            callback_ttl_ms: 30_000,
            cleanup_interval_ms: 1_000,
            resolution: ResolutionKind::FirstResult,
            executors: Vec::new(),
            applied_window_ms: 600_000,
            applied_max_entries: 100_000,
        }
    }
}

impl BridgeConfig {
    pub fn callback_ttl(&self) -> Duration {
        Duration::from_millis(self.callback_ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn applied_window(&self) -> Duration {
        Duration::from_millis(self.applied_window_ms)
    }

    pub fn policy(&self) -> ResolutionPolicy {
        match self.resolution {
            ResolutionKind::FirstResult => ResolutionPolicy::FirstResult,
            ResolutionKind::AllExecutors => ResolutionPolicy::AllExecutors {
                executors: self.executors.iter().cloned().collect::<BTreeSet<_>>(),
            },
        }
    }
}
