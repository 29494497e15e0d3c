pub mod config;
pub mod decoder;
pub mod errors;
pub mod frame;

pub use config::IpcConfig;
pub use decoder::FrameDecoder;
pub use errors::{FrameError, SandboxError};
pub use frame::{encode_frame, Frame, CALLBACK_ID_LEN, DEFAULT_MAX_FRAME_BYTES, EVENT_ID, HEADER_LEN};
