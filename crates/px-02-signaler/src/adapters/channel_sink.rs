//! Channel-backed sink for sessions served by an async task.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domain::{SignalError, SignalMessage};
use crate::ports::SignalSink;
use shared_types::UserId;

/// Queues every delivered message on an unbounded channel.
pub struct ChannelSink {
    owner: UserId,
    sender: mpsc::UnboundedSender<SignalMessage>,
}

impl ChannelSink {
    pub fn new(owner: UserId, sender: mpsc::UnboundedSender<SignalMessage>) -> Self {
        Self { owner, sender }
    }

    /// A sink together with the receiver its session task drains.
    pub fn pair(owner: UserId) -> (Arc<Self>, mpsc::UnboundedReceiver<SignalMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self::new(owner, sender)), receiver)
    }
}

impl SignalSink for ChannelSink {
    fn deliver(&self, message: &SignalMessage) -> Result<(), SignalError> {
        self.sender
            .send(message.clone())
            .map_err(|_| SignalError::ListenerClosed(self.owner.clone()))
    }
}
