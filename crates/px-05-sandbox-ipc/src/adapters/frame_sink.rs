//! Signaler listener that turns signals into event frames.

use bytes::Bytes;
use px_02_signaler::{SignalError, SignalMessage, SignalSink};
use shared_types::UserId;
use tokio::sync::mpsc;

/// Queues signal payloads for a channel's event pump.
///
/// Delivery never blocks the signaler; the pump writes them as callback id
/// 0 frames in arrival order.
pub struct FrameSink {
    machine: UserId,
    events: mpsc::UnboundedSender<Bytes>,
}

impl FrameSink {
    pub fn new(machine: UserId, events: mpsc::UnboundedSender<Bytes>) -> Self {
        Self { machine, events }
    }
}

impl SignalSink for FrameSink {
    fn deliver(&self, message: &SignalMessage) -> Result<(), SignalError> {
        self.events
            .send(message.payload.clone())
            .map_err(|_| SignalError::ListenerClosed(self.machine.clone()))
    }
}
