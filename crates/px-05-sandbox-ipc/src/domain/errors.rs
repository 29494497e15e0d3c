use shared_types::{DispatchError, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: max {max_frame_bytes} got {got_bytes}")]
    FrameTooLarge {
        max_frame_bytes: usize,
        got_bytes: usize,
    },

    #[error("frame too short: {got_bytes} bytes cannot hold a callback id")]
    FrameTooShort { got_bytes: usize },

    #[error("decoder failed earlier and holds no trustworthy state")]
    DecoderFailed,
}

impl From<FrameError> for DispatchError {
    fn from(e: FrameError) -> Self {
        DispatchError::ProtocolFraming(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("channel to {0} is closed")]
    ChannelClosed(UserId),

    #[error("no sandbox attached for {0}")]
    NotAttached(UserId),

    #[error("request {callback_id} to {machine} timed out after {waited_ms}ms")]
    Timeout {
        machine: UserId,
        callback_id: u64,
        waited_ms: u64,
    },

    #[error("applet response is not valid JSON: {0}")]
    InvalidResponse(String),
}

impl From<SandboxError> for DispatchError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::Frame(e) => e.into(),
            SandboxError::NotAttached(machine) => {
                DispatchError::NotFound(format!("sandbox for {machine}"))
            }
            other => DispatchError::Internal(other.to_string()),
        }
    }
}
