use bytes::Bytes;
use shared_types::UserId;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::domain::SignalError;
use crate::ports::SignalSink;

/// One encoded signal as handed to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMessage {
    pub key: String,
    pub payload: Bytes,
}

impl SignalMessage {
    pub fn new(key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
        }
    }
}

/// An addressable recipient: a connected session or a remote machine.
#[derive(Clone)]
pub struct Listener {
    pub id: UserId,
    pub paused: bool,
    pub last_disconnect: Option<Instant>,
    sink: Arc<dyn SignalSink>,
}

impl Listener {
    pub fn new(id: UserId, sink: Arc<dyn SignalSink>) -> Self {
        Self {
            id,
            paused: false,
            last_disconnect: None,
            sink,
        }
    }

    pub fn signal(&self, message: &SignalMessage) -> Result<(), SignalError> {
        self.sink.deliver(message)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("paused", &self.paused)
            .field("last_disconnect", &self.last_disconnect)
            .finish_non_exhaustive()
    }
}
