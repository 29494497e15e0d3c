use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::frame::{CALLBACK_ID_LEN, DEFAULT_MAX_FRAME_BYTES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Upper bound on a frame's declared length (callback id + body).
    pub max_frame_bytes: usize,
    /// How long a request to an applet waits for its response.
    pub request_timeout_ms: u64,
    /// Size of a single read from the underlying stream.
    pub read_chunk_bytes: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            request_timeout_ms: 30_000,
            read_chunk_bytes: 64 * 1024,
        }
    }
}

impl IpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_frame_bytes < CALLBACK_ID_LEN {
            return Err(format!(
                "max_frame_bytes must be at least {CALLBACK_ID_LEN}, got {}",
                self.max_frame_bytes
            ));
        }
        if self.max_frame_bytes > u32::MAX as usize {
            return Err("max_frame_bytes must fit in a u32 length header".into());
        }
        if self.read_chunk_bytes == 0 {
            return Err("read_chunk_bytes must be positive".into());
        }
        Ok(())
    }
}
