//! Frame layout and the encoder.

use bytes::{BufMut, Bytes, BytesMut};

use crate::domain::errors::FrameError;

pub const HEADER_LEN: usize = 4;
pub const CALLBACK_ID_LEN: usize = 8;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 20_000_000;

/// Callback id reserved for events.
pub const EVENT_ID: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub callback_id: u64,
    pub body: Bytes,
}

impl Frame {
    pub fn new(callback_id: u64, body: impl Into<Bytes>) -> Self {
        Self {
            callback_id,
            body: body.into(),
        }
    }

    pub fn event(body: impl Into<Bytes>) -> Self {
        Self::new(EVENT_ID, body)
    }

    pub fn is_event(&self) -> bool {
        self.callback_id == EVENT_ID
    }

    /// Value written to the length header.
    pub fn declared_len(&self) -> usize {
        CALLBACK_ID_LEN + self.body.len()
    }
}

/// Encode a frame into one contiguous buffer: header, callback id, body.
pub fn encode_frame(
    callback_id: u64,
    body: &[u8],
    max_frame_bytes: usize,
) -> Result<Bytes, FrameError> {
    let declared = CALLBACK_ID_LEN + body.len();
    if declared > max_frame_bytes {
        return Err(FrameError::FrameTooLarge {
            max_frame_bytes,
            got_bytes: declared,
        });
    }
    let header = u32::try_from(declared).map_err(|_| FrameError::FrameTooLarge {
        max_frame_bytes,
        got_bytes: declared,
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + declared);
    buf.put_u32_le(header);
    buf.put_u64_le(callback_id);
    buf.put_slice(body);
    Ok(buf.freeze())
}
