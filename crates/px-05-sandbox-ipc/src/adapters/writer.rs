//! Per-channel frame writer.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::domain::{encode_frame, FrameError};

/// Serializes frame writes on one stream.
///
/// The whole frame is encoded first and written while the lock is held, so
/// a header is always followed by its own body.
pub struct FrameWriter<W> {
    inner: Mutex<W>,
    max_frame_bytes: usize,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(writer: W, max_frame_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(writer),
            max_frame_bytes,
        }
    }

    /// Write one frame. Returns the number of bytes put on the wire.
    pub async fn write_frame(&self, callback_id: u64, body: &[u8]) -> Result<usize, FrameError> {
        let frame = encode_frame(callback_id, body, self.max_frame_bytes)?;
        let mut writer = self.inner.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(frame.len())
    }

    pub async fn shutdown(&self) -> Result<(), FrameError> {
        self.inner.lock().await.shutdown().await?;
        Ok(())
    }
}
