//! # Frame Decoder
//!
//! Incremental reassembly of frames from arbitrarily fragmented reads.
//!
//! ```text
//! Header ──(4 bytes buffered)──→ check len ──too large/short──→ Failed
//!    ↑                              │
//!    │                              ↓
//!    └──── emit frame ←── Body(len) ──(len bytes buffered)
//! ```
//!
//! The decoder owns its buffer. Surplus bytes after a frame stay buffered
//! for the next one; nothing is dropped or duplicated across boundaries.
//! Once failed, it refuses all further input.

use bytes::{Buf, BytesMut};
use px_telemetry::{IPC_FRAMES_DECODED, IPC_FRAMING_ERRORS};

use crate::domain::errors::FrameError;
use crate::domain::frame::{Frame, CALLBACK_ID_LEN, HEADER_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Header,
    Body { len: usize },
    Failed,
}

#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    state: DecodeState,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            state: DecodeState::Header,
            max_frame_bytes,
        }
    }

    /// Append bytes read from the stream.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.state != DecodeState::Failed {
            self.buf.extend_from_slice(bytes);
        }
    }

    /// Next complete frame, `Ok(None)` if more input is needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        loop {
            match self.state {
                DecodeState::Failed => return Err(FrameError::DecoderFailed),
                DecodeState::Header => {
                    if self.buf.len() < HEADER_LEN {
                        return Ok(None);
                    }
                    let len = self.buf.get_u32_le() as usize;
                    if len > self.max_frame_bytes {
                        return Err(self.fail(FrameError::FrameTooLarge {
                            max_frame_bytes: self.max_frame_bytes,
                            got_bytes: len,
                        }));
                    }
                    if len < CALLBACK_ID_LEN {
                        return Err(self.fail(FrameError::FrameTooShort { got_bytes: len }));
                    }
                    self.buf.reserve(len.saturating_sub(self.buf.len()));
                    self.state = DecodeState::Body { len };
                }
                DecodeState::Body { len } => {
                    if self.buf.len() < len {
                        return Ok(None);
                    }
                    let mut payload = self.buf.split_to(len);
                    let callback_id = payload.get_u64_le();
                    self.state = DecodeState::Header;
                    IPC_FRAMES_DECODED.inc();
                    return Ok(Some(Frame {
                        callback_id,
                        body: payload.freeze(),
                    }));
                }
            }
        }
    }

    /// Bytes buffered but not yet part of an emitted frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_failed(&self) -> bool {
        self.state == DecodeState::Failed
    }

    fn fail(&mut self, error: FrameError) -> FrameError {
        self.state = DecodeState::Failed;
        IPC_FRAMING_ERRORS.inc();
        error
    }
}
