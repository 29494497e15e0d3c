//! # px-05-sandbox-ipc
//!
//! Byte-stream protocol between the node and out-of-process applets.
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────────┬───────────────────┬──────────────────────┐
//! │ len: u32 LE  │ callback_id: u64 LE│ body: len - 8 bytes  │
//! └──────────────┴───────────────────┴──────────────────────┘
//!   len counts callback_id + body, never itself.
//!   callback_id 0  → event (fire and forget)
//!   callback_id ≠0 → request or the response to one
//! ```
//!
//! A declared `len` above `max_frame_bytes` (default 20,000,000) is fatal for
//! the channel: it is closed, never resynchronised.
//!
//! ## Channel Model
//!
//! One reader task per channel owns the decoder. Writes go through a
//! per-channel lock held for the whole frame, so concurrent writers never
//! interleave.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{FrameSink, FrameWriter, IpcChannel};
pub use domain::*;
pub use ports::*;
pub use service::SandboxBridge;
