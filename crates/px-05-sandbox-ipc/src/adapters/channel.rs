//! # IPC Channel
//!
//! One duplex stream to one applet.
//!
//! ```text
//!            ┌────────────── reader task (owns FrameDecoder) ─────────────┐
//! stream ──→ │ id 0                    → EventHandler                     │
//!            │ id in pending table     → complete request                 │
//!            │ any other id            → AppletRequestHandler → reply(id) │
//!            │ framing error / EOF     → close channel                    │
//!            └────────────────────────────────────────────────────────────┘
//! request() ─┬→ pending[id] = oneshot
//! event pump ┴→ FrameWriter (one lock per frame) ──→ stream
//! ```
//!
//! Closing fails every outstanding request. The reader seals the pending
//! table under its lock, so a request racing the close fails immediately
//! instead of waiting for its timeout. A channel is never reopened;
//! a reconnecting applet gets a new channel with a fresh decoder.

use bytes::Bytes;
use parking_lot::Mutex;
use shared_types::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::adapters::writer::FrameWriter;
use crate::domain::{Frame, FrameDecoder, IpcConfig, SandboxError, EVENT_ID};
use crate::ports::{AppletRequestHandler, EventHandler};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type PendingTable = Arc<Mutex<Pending>>;

/// Outstanding requests by callback id. Once sealed, nothing is admitted.
#[derive(Default)]
struct Pending {
    waiters: HashMap<u64, oneshot::Sender<Bytes>>,
    sealed: bool,
}

pub struct IpcChannel {
    machine: UserId,
    writer: Arc<FrameWriter<BoxedWriter>>,
    pending: PendingTable,
    next_id: AtomicU64,
    events_out: mpsc::UnboundedSender<Bytes>,
    shutdown: watch::Sender<bool>,
    closed: watch::Receiver<bool>,
    config: IpcConfig,
}

impl IpcChannel {
    /// Start the reader task and the event pump for a new stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<R, W>(
        machine: UserId,
        reader: R,
        writer: W,
        config: IpcConfig,
        events: Arc<dyn EventHandler>,
        requests: Option<Arc<dyn AppletRequestHandler>>,
    ) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: Arc<FrameWriter<BoxedWriter>> =
            Arc::new(FrameWriter::new(Box::new(writer), config.max_frame_bytes));
        let pending: PendingTable = Arc::new(Mutex::new(Pending::default()));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (closed_tx, closed) = watch::channel(false);
        let (events_out, events_rx) = mpsc::unbounded_channel();

        let channel = Arc::new(Self {
            machine: machine.clone(),
            writer: writer.clone(),
            pending: pending.clone(),
            next_id: AtomicU64::new(1),
            events_out,
            shutdown,
            closed,
            config: config.clone(),
        });

        tokio::spawn(event_pump(
            machine.clone(),
            writer.clone(),
            events_rx,
            shutdown_rx.clone(),
            channel.closed.clone(),
        ));
        let router = FrameRouter {
            machine,
            pending,
            writer,
            events,
            requests,
        };
        tokio::spawn(read_loop(
            router,
            reader,
            FrameDecoder::new(config.max_frame_bytes),
            config.read_chunk_bytes.max(1),
            shutdown_rx,
            closed_tx,
        ));

        channel
    }

    pub fn machine(&self) -> &UserId {
        &self.machine
    }

    /// Send `body` as a request and wait for the matching response.
    pub async fn request(&self, body: &[u8], timeout: Option<Duration>) -> Result<Bytes, SandboxError> {
        if self.is_closed() {
            return Err(SandboxError::ChannelClosed(self.machine.clone()));
        }
        let callback_id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.sealed {
                return Err(SandboxError::ChannelClosed(self.machine.clone()));
            }
            pending.waiters.insert(callback_id, tx);
        }

        if let Err(e) = self.writer.write_frame(callback_id, body).await {
            let sealed = {
                let mut pending = self.pending.lock();
                pending.waiters.remove(&callback_id);
                pending.sealed
            };
            // The reader shut the writer down underneath us.
            if sealed {
                return Err(SandboxError::ChannelClosed(self.machine.clone()));
            }
            return Err(e.into());
        }

        let timeout = timeout.unwrap_or_else(|| self.config.request_timeout());
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(SandboxError::ChannelClosed(self.machine.clone())),
            Err(_) => {
                self.pending.lock().waiters.remove(&callback_id);
                Err(SandboxError::Timeout {
                    machine: self.machine.clone(),
                    callback_id,
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Write an event frame directly, bypassing the pump.
    pub async fn send_event(&self, body: &[u8]) -> Result<(), SandboxError> {
        if self.is_closed() {
            return Err(SandboxError::ChannelClosed(self.machine.clone()));
        }
        self.writer.write_frame(EVENT_ID, body).await?;
        Ok(())
    }

    /// Queue an event frame for the pump. Used by the signaler sink.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<Bytes> {
        self.events_out.clone()
    }

    /// Stop the reader and the pump. Outstanding requests fail.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the reader task has stopped.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.lock().waiters.len()
    }

    fn allocate_id(&self) -> u64 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != EVENT_ID {
                return id;
            }
        }
    }
}

impl Drop for IpcChannel {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn event_pump(
    machine: UserId,
    writer: Arc<FrameWriter<BoxedWriter>>,
    mut events: mpsc::UnboundedReceiver<Bytes>,
    mut shutdown: watch::Receiver<bool>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(body) = event else { return };
                if let Err(e) = writer.write_frame(EVENT_ID, &body).await {
                    warn!(machine = %machine, error = %e, "Failed to write event frame");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            changed = closed.changed() => {
                if changed.is_err() || *closed.borrow() {
                    return;
                }
            }
        }
    }
}

/// Routes decoded frames. Everything the reader needs except the stream.
struct FrameRouter {
    machine: UserId,
    pending: PendingTable,
    writer: Arc<FrameWriter<BoxedWriter>>,
    events: Arc<dyn EventHandler>,
    requests: Option<Arc<dyn AppletRequestHandler>>,
}

async fn read_loop<R: AsyncRead + Send + Unpin>(
    router: FrameRouter,
    mut reader: R,
    mut decoder: FrameDecoder,
    chunk: usize,
    mut shutdown: watch::Receiver<bool>,
    closed: watch::Sender<bool>,
) {
    debug!(machine = %router.machine, "IPC reader started");
    let mut buf = vec![0u8; chunk];

    'read: loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!(machine = %router.machine, "IPC stream reached EOF");
                    break 'read;
                }
                Ok(n) => {
                    decoder.feed(&buf[..n]);
                    loop {
                        match decoder.next_frame() {
                            Ok(Some(frame)) => router.dispatch(frame).await,
                            Ok(None) => break,
                            Err(e) => {
                                warn!(machine = %router.machine, error = %e, "Framing error, closing channel");
                                break 'read;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(machine = %router.machine, error = %e, "IPC read failed");
                    break 'read;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break 'read;
                }
            }
        }
    }

    // Dropping the senders fails every outstanding request.
    let abandoned = {
        let mut pending = router.pending.lock();
        pending.sealed = true;
        let count = pending.waiters.len();
        pending.waiters.clear();
        count
    };
    if let Err(e) = router.writer.shutdown().await {
        debug!(machine = %router.machine, error = %e, "Writer shutdown failed");
    }
    closed.send_replace(true);
    info!(machine = %router.machine, abandoned, "IPC channel closed");
}

impl FrameRouter {
    async fn dispatch(&self, frame: Frame) {
        if frame.is_event() {
            self.events.on_event(&self.machine, frame.body).await;
            return;
        }

        let waiter = self.pending.lock().waiters.remove(&frame.callback_id);
        if let Some(waiter) = waiter {
            // The requester may have timed out already.
            let _ = waiter.send(frame.body);
            return;
        }

        let Some(handler) = self.requests.clone() else {
            warn!(machine = %self.machine, callback_id = frame.callback_id, "Unsolicited frame with no request handler");
            let reply = serde_json::json!({ "error": "requests not accepted" }).to_string();
            if let Err(e) = self.writer.write_frame(frame.callback_id, reply.as_bytes()).await {
                warn!(machine = %self.machine, error = %e, "Failed to write reply");
            }
            return;
        };

        // Served off the reader so a slow handler does not stall the stream.
        let machine = self.machine.clone();
        let writer = self.writer.clone();
        tokio::spawn(async move {
            let reply = handler.handle_request(&machine, frame.body).await;
            if let Err(e) = writer.write_frame(frame.callback_id, &reply).await {
                warn!(machine = %machine, callback_id = frame.callback_id, error = %e, "Failed to write reply");
            }
        });
    }
}
