use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dispatch pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Deliver signal effects back to the caller by default.
    pub echo_to_caller: bool,
    /// Window in which a repeated `(user, request_id)` is rejected. `0`
    /// disables the replay check.
    pub replay_window_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            echo_to_caller: false,
            replay_window_secs: 120,
        }
    }
}

impl DispatchConfig {
    pub fn replay_window(&self) -> Option<Duration> {
        (self.replay_window_secs > 0).then(|| Duration::from_secs(self.replay_window_secs))
    }
}
